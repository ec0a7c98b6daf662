use crate::{
    entities::order::{self, PaymentMethod, PaymentStatus},
    errors::ServiceError,
    services::{
        address::ShippingAddress,
        carts::CartService,
        coupons::CouponService,
        delivery::DeliveryService,
        notifications::NotificationSink,
        orders::{NewOrder, OrderService, OrderWithItems},
        payments::{ConfirmationOutcome, PaymentProcessor},
        snapshot::{LineSelection, SnapshotService},
    },
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Checkout request after DTO validation: the user, what they selected,
/// where it ships, and how they pay.
#[derive(Debug, Clone)]
pub struct PlaceOrderInput {
    pub user_id: Uuid,
    pub lines: Vec<LineSelection>,
    pub shipping_address: ShippingAddress,
    pub payment_method: PaymentMethod,
    pub coupon_code: Option<String>,
}

/// Outcome of a placed checkout. `client_secret` is present only on the
/// card path, for the client-side confirmation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlacedOrder {
    pub order: order::Model,
    pub items: Vec<crate::entities::order_item::Model>,
    pub client_secret: Option<String>,
    pub delivery_degraded: bool,
}

/// Orchestrates one checkout attempt end to end: snapshot, coupon,
/// delivery fee, the order commit, and payment routing. Everything
/// before the commit aborts cleanly; everything after it reports back
/// to the existing order id.
#[derive(Clone)]
pub struct CheckoutService {
    snapshots: SnapshotService,
    coupons: CouponService,
    delivery: DeliveryService,
    orders: OrderService,
    carts: CartService,
    processor: Arc<dyn PaymentProcessor>,
    notifier: Arc<dyn NotificationSink>,
    currency: String,
}

impl CheckoutService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        snapshots: SnapshotService,
        coupons: CouponService,
        delivery: DeliveryService,
        orders: OrderService,
        carts: CartService,
        processor: Arc<dyn PaymentProcessor>,
        notifier: Arc<dyn NotificationSink>,
        currency: String,
    ) -> Self {
        Self {
            snapshots,
            coupons,
            delivery,
            orders,
            carts,
            processor,
            notifier,
            currency,
        }
    }

    /// Places an order. The order insert is the commit point: a failure
    /// before it leaves no record; a payment failure after it leaves a
    /// pending order the caller retries against.
    #[instrument(skip(self, input), fields(user_id = %input.user_id, method = ?input.payment_method))]
    pub async fn place_order(&self, input: PlaceOrderInput) -> Result<PlacedOrder, ServiceError> {
        input.shipping_address.ensure_complete()?;

        let snapshot = self.snapshots.resolve(&input.lines).await?;

        let discount = match &input.coupon_code {
            Some(code) => Some(self.coupons.validate(code, snapshot.subtotal).await?),
            None => None,
        };

        let quote = self.delivery.estimate_fee(&input.shipping_address).await;

        let OrderWithItems { order, items } = self
            .orders
            .create_order(NewOrder {
                user_id: input.user_id,
                subtotal: snapshot.subtotal,
                lines: snapshot.lines,
                discount,
                delivery_fee: quote.fee,
                shipping_address: input.shipping_address,
                payment_method: input.payment_method,
                currency: self.currency.clone(),
            })
            .await?;

        match input.payment_method {
            PaymentMethod::Cash => {
                let order = self.orders.apply_cod_placement(order.id).await?;
                self.reconcile_post_commit(&order).await;
                Ok(PlacedOrder {
                    order,
                    items,
                    client_secret: None,
                    delivery_degraded: quote.degraded,
                })
            }
            PaymentMethod::Card => {
                let intent = self
                    .processor
                    .create_intent(order.total_amount, &self.currency)
                    .await
                    .map_err(|e| ServiceError::PaymentInitiation {
                        order_id: order.id,
                        message: e.response_message(),
                    })?;

                Ok(PlacedOrder {
                    order,
                    items,
                    client_secret: Some(intent.client_secret),
                    delivery_degraded: quote.degraded,
                })
            }
        }
    }

    /// Requests a fresh client secret for an order whose settlement was
    /// never completed, so the caller retries payment on the same order
    /// instead of placing a duplicate.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn retry_card_payment(&self, order_id: Uuid) -> Result<String, ServiceError> {
        let order = self
            .orders
            .get_order(order_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        if order.payment_method != PaymentMethod::Card {
            return Err(ServiceError::InvalidOperation(format!(
                "Order {} is not a card order",
                order_id
            )));
        }
        if order.payment_status == PaymentStatus::Paid {
            return Err(ServiceError::InvalidStatus(format!(
                "Order {} is already paid",
                order_id
            )));
        }

        let intent = self
            .processor
            .create_intent(order.total_amount, &self.currency)
            .await
            .map_err(|e| ServiceError::PaymentInitiation {
                order_id,
                message: e.response_message(),
            })?;

        Ok(intent.client_secret)
    }

    /// Applies the client-reported confirmation outcome to a card order.
    /// Safe to call more than once: re-confirming a paid order is a
    /// no-op and does not clear the cart or notify again.
    #[instrument(skip(self), fields(order_id = %order_id, outcome = ?outcome))]
    pub async fn confirm_card_payment(
        &self,
        order_id: Uuid,
        outcome: ConfirmationOutcome,
        processor_message: Option<String>,
    ) -> Result<order::Model, ServiceError> {
        let order = self
            .orders
            .get_order(order_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        if order.payment_method != PaymentMethod::Card {
            return Err(ServiceError::InvalidOperation(format!(
                "Order {} is not a card order",
                order_id
            )));
        }

        match outcome {
            ConfirmationOutcome::Succeeded => {
                let (order, transitioned) = self.orders.apply_payment_success(order_id).await?;
                if transitioned {
                    self.reconcile_post_commit(&order).await;
                }
                Ok(order)
            }
            ConfirmationOutcome::Failed => {
                if order.payment_status == PaymentStatus::Paid {
                    warn!(order_id = %order_id, "Stale failure report for a paid order, ignoring");
                    return Ok(order);
                }
                let order = self.orders.apply_payment_failure(order_id).await?;
                Err(ServiceError::PaymentDeclined {
                    order_id: order.id,
                    message: processor_message
                        .unwrap_or_else(|| "card payment was declined".to_string()),
                })
            }
            ConfirmationOutcome::RequiresAction => {
                info!(order_id = %order_id, "Confirmation still requires client action");
                Ok(order)
            }
        }
    }

    /// Post-commit cleanup: clear the cart, notify. Both are best-effort
    /// with respect to the order; a failure here is a warning, never a
    /// rollback.
    async fn reconcile_post_commit(&self, order: &order::Model) {
        if let Err(e) = self.carts.clear_for_user(order.user_id).await {
            warn!(
                error = %e,
                order_id = %order.id,
                user_id = %order.user_id,
                "Failed to clear cart after confirmed payment"
            );
        }

        if let Err(e) = self.notifier.order_placed(order).await {
            warn!(
                error = %e,
                order_id = %order.id,
                "Failed to send order placed notification"
            );
        }
    }
}
