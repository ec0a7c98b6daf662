use crate::{
    db::DbPool,
    entities::{cart, cart_item, Cart, CartItem},
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set,
};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Cart access for the checkout core. The cart is owned by the user
/// session; this core only reads it and clears it after a confirmed
/// payment.
#[derive(Clone)]
pub struct CartService {
    db: Arc<DbPool>,
    event_sender: EventSender,
}

impl CartService {
    pub fn new(db: Arc<DbPool>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    /// The user's active cart, if any.
    pub async fn active_cart(&self, user_id: Uuid) -> Result<Option<cart::Model>, ServiceError> {
        Cart::find()
            .filter(cart::Column::UserId.eq(user_id))
            .filter(cart::Column::Status.eq(cart::CartStatus::Active))
            .one(&*self.db)
            .await
            .map_err(ServiceError::from)
    }

    /// Lines of the user's active cart in display order.
    pub async fn cart_lines(&self, user_id: Uuid) -> Result<Vec<cart_item::Model>, ServiceError> {
        let Some(cart) = self.active_cart(user_id).await? else {
            return Ok(Vec::new());
        };

        CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .order_by_asc(cart_item::Column::Position)
            .all(&*self.db)
            .await
            .map_err(ServiceError::from)
    }

    /// Removes every line from the user's active cart. Invoked exactly
    /// once per order, after payment is confirmed; an in-flight checkout
    /// tolerates concurrent cart edits because the order was priced from
    /// a snapshot, not from these rows.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn clear_for_user(&self, user_id: Uuid) -> Result<Option<Uuid>, ServiceError> {
        let Some(cart) = self.active_cart(user_id).await? else {
            info!("No active cart to clear");
            return Ok(None);
        };

        CartItem::delete_many()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .exec(&*self.db)
            .await?;

        let cart_id = cart.id;
        let mut cart_update: cart::ActiveModel = cart.into();
        cart_update.updated_at = Set(Utc::now());
        cart_update.update(&*self.db).await?;

        if let Err(e) = self.event_sender.send(Event::CartCleared(cart_id)).await {
            warn!(error = %e, cart_id = %cart_id, "Failed to send cart cleared event");
        }

        info!(cart_id = %cart_id, "Cart cleared");
        Ok(Some(cart_id))
    }
}
