use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use checkout_api::{
    config::AppConfig,
    db::{self, DbConfig, DbPool},
    entities::{
        self, cart, cart_item,
        coupon::{self, DiscountType},
        product, product_variant,
    },
    errors::ServiceError,
    events::{self, EventSender},
    handlers::AppServices,
    services::{
        address::{RateKey, ShippingAddress},
        delivery::DeliveryRateSource,
        notifications::NotificationSink,
        payments::{PaymentIntent, PaymentProcessor},
    },
};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ConnectionTrait, EntityTrait, Schema, Set};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Payment processor stub: succeeds with a canned client secret unless
/// told to fail.
pub struct StubProcessor {
    pub fail: AtomicBool,
    pub intents_created: AtomicUsize,
}

impl StubProcessor {
    pub fn new() -> Self {
        Self {
            fail: AtomicBool::new(false),
            intents_created: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl PaymentProcessor for StubProcessor {
    async fn create_intent(
        &self,
        amount: Decimal,
        _currency: &str,
    ) -> Result<PaymentIntent, ServiceError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ServiceError::ExternalServiceError(
                "processor unreachable".to_string(),
            ));
        }
        self.intents_created.fetch_add(1, Ordering::SeqCst);
        Ok(PaymentIntent {
            client_secret: format!("pi_test_secret_{}", amount),
        })
    }
}

/// Notification sink stub counting deliveries.
pub struct CountingNotifier {
    pub sent: AtomicUsize,
    pub fail: AtomicBool,
}

impl CountingNotifier {
    pub fn new() -> Self {
        Self {
            sent: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl NotificationSink for CountingNotifier {
    async fn order_placed(
        &self,
        _order: &entities::order::Model,
    ) -> Result<(), ServiceError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ServiceError::ExternalServiceError(
                "webhook down".to_string(),
            ));
        }
        self.sent.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Rate source stub counting lookups; never configured to succeed in
/// most tests so the default fee applies.
pub struct CountingRateSource {
    pub quotes: AtomicUsize,
    pub fee: Decimal,
}

impl CountingRateSource {
    pub fn returning(fee: Decimal) -> Self {
        Self {
            quotes: AtomicUsize::new(0),
            fee,
        }
    }
}

#[async_trait]
impl DeliveryRateSource for CountingRateSource {
    async fn quote(&self, _key: &RateKey) -> Result<Decimal, ServiceError> {
        self.quotes.fetch_add(1, Ordering::SeqCst);
        Ok(self.fee)
    }
}

/// Test harness around an in-memory SQLite database with the schema
/// created from the entities.
pub struct TestContext {
    pub db: Arc<DbPool>,
    pub services: AppServices,
    pub processor: Arc<StubProcessor>,
    pub notifier: Arc<CountingNotifier>,
    pub rate_source: Arc<CountingRateSource>,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestContext {
    pub async fn new() -> Self {
        let db_cfg = DbConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            min_connections: 1,
            ..Default::default()
        };
        let pool = db::establish_connection_with_config(&db_cfg)
            .await
            .expect("failed to create test database");

        create_schema(&pool).await;

        let db = Arc::new(pool);
        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = EventSender::new(event_tx);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let cfg = AppConfig::new("sqlite::memory:", "127.0.0.1", 18080, "test");
        let processor = Arc::new(StubProcessor::new());
        let notifier = Arc::new(CountingNotifier::new());
        let rate_source = Arc::new(CountingRateSource::returning(Decimal::new(30_000, 0)));

        let services = AppServices::with_collaborators(
            db.clone(),
            event_sender,
            &cfg,
            Some(rate_source.clone() as Arc<dyn DeliveryRateSource>),
            processor.clone() as Arc<dyn PaymentProcessor>,
            notifier.clone() as Arc<dyn NotificationSink>,
        );

        Self {
            db,
            services,
            processor,
            notifier,
            rate_source,
            _event_task: event_task,
        }
    }

    pub async fn seed_product(&self, name: &str, base_price: Decimal) -> product::Model {
        let now = Utc::now();
        product::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.to_string()),
            base_price: Set(base_price),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await
        .expect("failed to seed product")
    }

    pub async fn seed_variant(
        &self,
        product_id: Uuid,
        label: &str,
        price: Decimal,
    ) -> product_variant::Model {
        let now = Utc::now();
        product_variant::ActiveModel {
            id: Set(Uuid::new_v4()),
            product_id: Set(product_id),
            label: Set(label.to_string()),
            price: Set(price),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await
        .expect("failed to seed variant")
    }

    pub async fn seed_coupon(
        &self,
        code: &str,
        discount_type: DiscountType,
        value: Decimal,
        min_purchase: Decimal,
        max_uses: i32,
        expires_in: Duration,
    ) -> coupon::Model {
        let now = Utc::now();
        coupon::ActiveModel {
            id: Set(Uuid::new_v4()),
            code: Set(code.to_string()),
            discount_type: Set(discount_type),
            discount_value: Set(value),
            min_purchase_amount: Set(min_purchase),
            max_uses: Set(max_uses),
            used_count: Set(0),
            expires_at: Set(now + expires_in),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await
        .expect("failed to seed coupon")
    }

    /// Creates an active cart for the user with one line per product.
    pub async fn seed_cart(&self, user_id: Uuid, products: &[&product::Model]) -> cart::Model {
        let now = Utc::now();
        let cart = cart::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            status: Set(cart::CartStatus::Active),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await
        .expect("failed to seed cart");

        for (position, product) in products.iter().enumerate() {
            cart_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                cart_id: Set(cart.id),
                product_id: Set(product.id),
                variant_id: Set(None),
                quantity: Set(1),
                display_price: Set(product.base_price),
                position: Set(position as i32),
                added_at: Set(now),
            }
            .insert(&*self.db)
            .await
            .expect("failed to seed cart item");
        }

        cart
    }

    pub async fn cart_item_count(&self, cart_id: Uuid) -> usize {
        entities::CartItem::find()
            .all(&*self.db)
            .await
            .expect("failed to list cart items")
            .into_iter()
            .filter(|i| i.cart_id == cart_id)
            .count()
    }

    pub async fn order_count(&self) -> u64 {
        use sea_orm::PaginatorTrait;
        entities::Order::find()
            .count(&*self.db)
            .await
            .expect("failed to count orders")
    }

    pub async fn coupon_used_count(&self, code: &str) -> i32 {
        use sea_orm::{ColumnTrait, QueryFilter};
        entities::Coupon::find()
            .filter(coupon::Column::Code.eq(code))
            .one(&*self.db)
            .await
            .expect("failed to load coupon")
            .expect("coupon missing")
            .used_count
    }
}

pub fn shipping_address() -> ShippingAddress {
    ShippingAddress {
        street: "12 Nguyễn Huệ".to_string(),
        city: "Hồ Chí Minh".to_string(),
        state: "Quận 1".to_string(),
        country: "Việt Nam".to_string(),
        zip_code: "700000".to_string(),
    }
}

async fn create_schema(db: &DbPool) {
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);

    let statements = [
        schema.create_table_from_entity(entities::Product),
        schema.create_table_from_entity(entities::ProductVariant),
        schema.create_table_from_entity(entities::Coupon),
        schema.create_table_from_entity(entities::Cart),
        schema.create_table_from_entity(entities::CartItem),
        schema.create_table_from_entity(entities::Order),
        schema.create_table_from_entity(entities::OrderItem),
    ];

    for statement in statements {
        db.execute(backend.build(&statement))
            .await
            .expect("failed to create table");
    }
}
