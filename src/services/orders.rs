use crate::{
    db::DbPool,
    entities::{
        order::{self, Entity as OrderEntity, OrderStatus, PaymentMethod, PaymentStatus},
        order_item::{self, Entity as OrderItemEntity},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{address::ShippingAddress, coupons::CouponService, snapshot::CartLine},
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveEnum, ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use super::coupons::CouponDiscount;

/// Input to the order assembly: everything upstream already resolved.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub user_id: Uuid,
    pub lines: Vec<CartLine>,
    pub subtotal: Decimal,
    pub discount: Option<CouponDiscount>,
    pub delivery_fee: Decimal,
    pub shipping_address: ShippingAddress,
    pub payment_method: PaymentMethod,
    pub currency: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderWithItems {
    pub order: order::Model,
    pub items: Vec<order_item::Model>,
}

#[derive(Debug, Serialize)]
pub struct OrderPage {
    pub orders: Vec<order::Model>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

/// Order assembly and status transitions. `create_order` is the commit
/// point of a checkout: before it nothing is retained, after it the
/// purchase is real regardless of downstream failures.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DbPool>,
    event_sender: EventSender,
}

impl OrderService {
    pub fn new(db: Arc<DbPool>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    /// Persists one order with its line items in a single transaction.
    /// When a coupon is applied, its usage count is consumed inside the
    /// same transaction, so an exhausted coupon rolls the whole order
    /// back and no use is burned on a failed checkout.
    #[instrument(skip(self, input), fields(user_id = %input.user_id, line_count = input.lines.len()))]
    pub async fn create_order(&self, input: NewOrder) -> Result<OrderWithItems, ServiceError> {
        if input.lines.is_empty() {
            return Err(ServiceError::ValidationError(
                "An order needs at least one line item".to_string(),
            ));
        }
        if input.lines.iter().any(|l| l.quantity < 1) {
            return Err(ServiceError::ValidationError(
                "Line quantities must be positive".to_string(),
            ));
        }
        input.shipping_address.ensure_complete()?;

        let discount_amount = input
            .discount
            .as_ref()
            .map(|d| d.discount_amount)
            .unwrap_or(Decimal::ZERO);
        let total_amount = compute_total(input.subtotal, discount_amount, input.delivery_fee);

        let now = Utc::now();
        let order_id = Uuid::new_v4();
        let address_json = serde_json::to_value(&input.shipping_address)?;

        let txn = self.db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start transaction for order creation");
            ServiceError::CommitError(e.to_string())
        })?;

        let order_model = order::ActiveModel {
            id: Set(order_id),
            order_number: Set(generate_order_number(order_id)),
            user_id: Set(input.user_id),
            subtotal: Set(input.subtotal),
            discount_amount: Set(discount_amount),
            delivery_fee: Set(input.delivery_fee),
            total_amount: Set(total_amount),
            currency: Set(input.currency.clone()),
            coupon_code: Set(input.discount.as_ref().map(|d| d.code.clone())),
            payment_method: Set(input.payment_method),
            order_status: Set(OrderStatus::Pending),
            payment_status: Set(PaymentStatus::Pending),
            shipping_address: Set(address_json),
            created_at: Set(now),
            updated_at: Set(Some(now)),
            version: Set(1),
        }
        .insert(&txn)
        .await
        .map_err(|e| {
            error!(error = %e, order_id = %order_id, "Failed to insert order");
            ServiceError::CommitError(e.to_string())
        })?;

        let mut items = Vec::with_capacity(input.lines.len());
        for (position, line) in input.lines.iter().enumerate() {
            let item = order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(line.product_id),
                variant_id: Set(line.variant_id),
                name: Set(line.name.clone()),
                variant_label: Set(line.variant_label.clone()),
                quantity: Set(line.quantity),
                unit_price: Set(line.unit_price),
                total_price: Set(line.line_total()),
                position: Set(position as i32),
                created_at: Set(now),
            }
            .insert(&txn)
            .await
            .map_err(|e| {
                error!(error = %e, order_id = %order_id, "Failed to insert order item");
                ServiceError::CommitError(e.to_string())
            })?;
            items.push(item);
        }

        // Consume the coupon use atomically with the commit. A raced-out
        // cap check surfaces as UsageExceeded and rolls everything back.
        if let Some(discount) = &input.discount {
            CouponService::redeem_on(&txn, &discount.code).await?;
        }

        txn.commit().await.map_err(|e| {
            error!(error = %e, order_id = %order_id, "Failed to commit order transaction");
            ServiceError::CommitError(e.to_string())
        })?;

        info!(order_id = %order_id, total_amount = %total_amount, "Order created");

        if let Err(e) = self.event_sender.send(Event::OrderCreated(order_id)).await {
            warn!(error = %e, order_id = %order_id, "Failed to send order created event");
        }
        if let Some(discount) = &input.discount {
            let event = Event::CouponRedeemed {
                code: discount.code.clone(),
                order_id,
            };
            if let Err(e) = self.event_sender.send(event).await {
                warn!(error = %e, order_id = %order_id, "Failed to send coupon redeemed event");
            }
        }

        Ok(OrderWithItems {
            order: order_model,
            items,
        })
    }

    /// Retrieves an order by ID
    pub async fn get_order(&self, order_id: Uuid) -> Result<Option<order::Model>, ServiceError> {
        OrderEntity::find_by_id(order_id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::from)
    }

    /// Line items of an order in invoice display order.
    pub async fn get_order_items(
        &self,
        order_id: Uuid,
    ) -> Result<Vec<order_item::Model>, ServiceError> {
        OrderItemEntity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .order_by_asc(order_item::Column::Position)
            .all(&*self.db)
            .await
            .map_err(ServiceError::from)
    }

    /// Lists orders with pagination, optionally scoped to one user.
    #[instrument(skip(self))]
    pub async fn list_orders(
        &self,
        user_id: Option<Uuid>,
        page: u64,
        per_page: u64,
    ) -> Result<OrderPage, ServiceError> {
        let mut query = OrderEntity::find().order_by_desc(order::Column::CreatedAt);
        if let Some(user_id) = user_id {
            query = query.filter(order::Column::UserId.eq(user_id));
        }

        let paginator = query.paginate(&*self.db, per_page);
        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page.saturating_sub(1)).await?;

        Ok(OrderPage {
            orders,
            total,
            page,
            per_page,
        })
    }

    /// COD placement: the order moves to fulfillment immediately while
    /// payment stays pending until physical delivery.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn apply_cod_placement(&self, order_id: Uuid) -> Result<order::Model, ServiceError> {
        let txn = self.db.begin().await?;

        let order = OrderEntity::find_by_id(order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        if order.order_status != OrderStatus::Pending {
            txn.commit().await?;
            return Ok(order);
        }

        let old_status = order.order_status;
        let version = order.version;
        let mut update: order::ActiveModel = order.into();
        update.order_status = Set(OrderStatus::Processing);
        update.updated_at = Set(Some(Utc::now()));
        update.version = Set(version + 1);
        let updated = update.update(&txn).await?;
        txn.commit().await?;

        self.send_status_changed(order_id, old_status, OrderStatus::Processing)
            .await;

        Ok(updated)
    }

    /// Finalizes a successful card confirmation. Returns the updated
    /// order and whether this call performed the transition; a repeat
    /// confirmation of an already-paid order reports `false` so the
    /// caller does not reconcile twice.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn apply_payment_success(
        &self,
        order_id: Uuid,
    ) -> Result<(order::Model, bool), ServiceError> {
        let txn = self.db.begin().await?;

        let order = OrderEntity::find_by_id(order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        if order.payment_status == PaymentStatus::Paid {
            txn.commit().await?;
            info!(order_id = %order_id, "Order already paid, confirmation is a no-op");
            return Ok((order, false));
        }

        let old_status = order.order_status;
        let version = order.version;
        let mut update: order::ActiveModel = order.into();
        update.payment_status = Set(PaymentStatus::Paid);
        update.order_status = Set(OrderStatus::Processing);
        update.updated_at = Set(Some(Utc::now()));
        update.version = Set(version + 1);
        let updated = update.update(&txn).await?;
        txn.commit().await?;

        info!(order_id = %order_id, "Payment captured");
        if let Err(e) = self.event_sender.send(Event::PaymentCaptured(order_id)).await {
            warn!(error = %e, order_id = %order_id, "Failed to send payment captured event");
        }
        self.send_status_changed(order_id, old_status, OrderStatus::Processing)
            .await;

        Ok((updated, true))
    }

    /// Records a declined card confirmation. The order survives with a
    /// failed payment status so the same order id can be retried; a
    /// late decline arriving after a successful capture is ignored.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn apply_payment_failure(&self, order_id: Uuid) -> Result<order::Model, ServiceError> {
        let txn = self.db.begin().await?;

        let order = OrderEntity::find_by_id(order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        if order.payment_status == PaymentStatus::Paid {
            txn.commit().await?;
            warn!(order_id = %order_id, "Ignoring failure report for an already-paid order");
            return Ok(order);
        }

        let version = order.version;
        let mut update: order::ActiveModel = order.into();
        update.payment_status = Set(PaymentStatus::Failed);
        update.updated_at = Set(Some(Utc::now()));
        update.version = Set(version + 1);
        let updated = update.update(&txn).await?;
        txn.commit().await?;

        if let Err(e) = self.event_sender.send(Event::PaymentFailed(order_id)).await {
            warn!(error = %e, order_id = %order_id, "Failed to send payment failed event");
        }

        Ok(updated)
    }

    async fn send_status_changed(
        &self,
        order_id: Uuid,
        old_status: OrderStatus,
        new_status: OrderStatus,
    ) {
        let event = Event::OrderStatusChanged {
            order_id,
            old_status: old_status.to_value(),
            new_status: new_status.to_value(),
        };
        if let Err(e) = self.event_sender.send(event).await {
            warn!(error = %e, order_id = %order_id, "Failed to send status changed event");
        }
    }
}

/// `max(0, subtotal - discount) + delivery_fee`. Fixed at creation time.
pub fn compute_total(subtotal: Decimal, discount_amount: Decimal, delivery_fee: Decimal) -> Decimal {
    (subtotal - discount_amount).max(Decimal::ZERO) + delivery_fee
}

fn generate_order_number(order_id: Uuid) -> String {
    format!(
        "ORD-{}",
        order_id.simple().to_string()[..8].to_uppercase()
    )
}
