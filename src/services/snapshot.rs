use crate::{
    db::DbPool,
    entities::{product, product_variant, Product, ProductVariant},
    errors::ServiceError,
};
use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::instrument;
use utoipa::ToSchema;
use uuid::Uuid;

/// A line the customer selected for checkout: references only, the
/// price is resolved server-side.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LineSelection {
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub quantity: i32,
}

/// A priced line captured at the moment of checkout. Later catalog
/// price changes cannot affect it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub name: String,
    pub variant_label: Option<String>,
    pub quantity: i32,
    pub unit_price: Decimal,
}

impl CartLine {
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// Priced snapshot of the selected lines. The subtotal is computed once
/// here and re-used downstream, never re-derived.
#[derive(Debug, Clone, PartialEq)]
pub struct CartSnapshot {
    pub lines: Vec<CartLine>,
    pub subtotal: Decimal,
}

/// Resolves the authoritative unit price of each selected line: the
/// variant price when a variant is chosen, the base product price
/// otherwise.
#[derive(Clone)]
pub struct SnapshotService {
    db: Arc<DbPool>,
}

impl SnapshotService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    #[instrument(skip(self, selections), fields(line_count = selections.len()))]
    pub async fn resolve(&self, selections: &[LineSelection]) -> Result<CartSnapshot, ServiceError> {
        if selections.is_empty() {
            return Err(ServiceError::ValidationError(
                "Cannot check out an empty cart".to_string(),
            ));
        }

        let product_ids: Vec<Uuid> = selections.iter().map(|s| s.product_id).collect();
        let products: HashMap<Uuid, product::Model> = Product::find()
            .filter(product::Column::Id.is_in(product_ids))
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        let variant_ids: Vec<Uuid> = selections.iter().filter_map(|s| s.variant_id).collect();
        let variants: HashMap<Uuid, product_variant::Model> = if variant_ids.is_empty() {
            HashMap::new()
        } else {
            ProductVariant::find()
                .filter(product_variant::Column::Id.is_in(variant_ids))
                .all(&*self.db)
                .await?
                .into_iter()
                .map(|v| (v.id, v))
                .collect()
        };

        Self::assemble(selections, &products, &variants)
    }

    /// Pure assembly over pre-fetched catalog rows.
    fn assemble(
        selections: &[LineSelection],
        products: &HashMap<Uuid, product::Model>,
        variants: &HashMap<Uuid, product_variant::Model>,
    ) -> Result<CartSnapshot, ServiceError> {
        let mut lines = Vec::with_capacity(selections.len());

        for selection in selections {
            if selection.quantity < 1 {
                return Err(ServiceError::ValidationError(format!(
                    "Quantity must be at least 1 for product {}",
                    selection.product_id
                )));
            }

            let product = products
                .get(&selection.product_id)
                .filter(|p| p.is_active)
                .ok_or_else(|| {
                    ServiceError::InvalidSelection(format!(
                        "Product {} no longer exists",
                        selection.product_id
                    ))
                })?;

            let (unit_price, variant_label) = match selection.variant_id {
                Some(variant_id) => {
                    let variant = variants
                        .get(&variant_id)
                        .filter(|v| v.product_id == product.id)
                        .ok_or_else(|| {
                            ServiceError::InvalidSelection(format!(
                                "Variant {} of product {} no longer exists",
                                variant_id, selection.product_id
                            ))
                        })?;
                    (variant.price, Some(variant.label.clone()))
                }
                None => (product.base_price, None),
            };

            lines.push(CartLine {
                product_id: product.id,
                variant_id: selection.variant_id,
                name: product.name.clone(),
                variant_label,
                quantity: selection.quantity,
                unit_price,
            });
        }

        let subtotal = lines.iter().map(CartLine::line_total).sum();
        Ok(CartSnapshot { lines, subtotal })
    }
}
