use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

/// Status-change events emitted by the checkout core for downstream
/// collaborators (admin tooling, fulfillment, analytics).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Order events
    OrderCreated(Uuid),
    OrderStatusChanged {
        order_id: Uuid,
        old_status: String,
        new_status: String,
    },

    // Payment events
    PaymentCaptured(Uuid),
    PaymentFailed(Uuid),

    // Cart events
    CartCleared(Uuid),

    // Coupon events
    CouponRedeemed {
        code: String,
        order_id: Uuid,
    },
}

/// Background consumer for the event channel. Consumers are best-effort;
/// a lost event never affects the order record itself.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::OrderCreated(order_id) => {
                info!(order_id = %order_id, "Order created");
            }
            Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            } => {
                info!(
                    order_id = %order_id,
                    old_status = %old_status,
                    new_status = %new_status,
                    "Order status changed"
                );
            }
            Event::PaymentCaptured(order_id) => {
                info!(order_id = %order_id, "Payment captured");
            }
            Event::PaymentFailed(order_id) => {
                warn!(order_id = %order_id, "Payment failed");
            }
            Event::CartCleared(cart_id) => {
                info!(cart_id = %cart_id, "Cart cleared");
            }
            Event::CouponRedeemed { code, order_id } => {
                info!(code = %code, order_id = %order_id, "Coupon redeemed");
            }
        }
    }

    info!("Event channel closed, stopping event processing loop");
}
