pub mod checkout;
pub mod common;
pub mod orders;

use crate::{
    config::AppConfig,
    db::DbPool,
    errors::ServiceError,
    events::EventSender,
    services::{
        carts::CartService,
        checkout::CheckoutService,
        coupons::CouponService,
        delivery::{DeliveryRateSource, DeliveryService, HttpDeliveryRateSource},
        notifications::{NotificationSink, WebhookNotificationSink},
        orders::OrderService,
        payments::{HttpPaymentProcessor, PaymentProcessor},
        snapshot::SnapshotService,
    },
};
use std::sync::Arc;
use std::time::Duration;

/// Services shared by the HTTP handlers.
#[derive(Clone)]
pub struct AppServices {
    pub checkout: Arc<CheckoutService>,
    pub orders: Arc<OrderService>,
}

impl AppServices {
    /// Wires the full service graph against the HTTP-backed
    /// collaborators described by the configuration.
    pub fn new(
        db: Arc<DbPool>,
        event_sender: EventSender,
        config: &AppConfig,
    ) -> Result<Self, ServiceError> {
        let rate_source: Option<Arc<dyn DeliveryRateSource>> =
            match &config.delivery.rate_endpoint {
                Some(endpoint) => Some(Arc::new(HttpDeliveryRateSource::new(
                    endpoint.clone(),
                    Duration::from_secs(config.delivery.timeout_secs),
                )?)),
                None => None,
            };

        let processor: Arc<dyn PaymentProcessor> = Arc::new(HttpPaymentProcessor::new(
            config.payment.endpoint.clone(),
            config.payment.api_key.clone(),
            Duration::from_secs(config.payment.timeout_secs),
        )?);

        let notifier: Arc<dyn NotificationSink> = Arc::new(WebhookNotificationSink::new(
            config.notification_webhook_url.clone(),
            Duration::from_secs(config.delivery.timeout_secs),
        )?);

        Ok(Self::with_collaborators(
            db,
            event_sender,
            config,
            rate_source,
            processor,
            notifier,
        ))
    }

    /// Same wiring with the remote collaborators injected; tests pass
    /// mocks here.
    pub fn with_collaborators(
        db: Arc<DbPool>,
        event_sender: EventSender,
        config: &AppConfig,
        rate_source: Option<Arc<dyn DeliveryRateSource>>,
        processor: Arc<dyn PaymentProcessor>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        let orders = Arc::new(OrderService::new(db.clone(), event_sender.clone()));
        let checkout = Arc::new(CheckoutService::new(
            SnapshotService::new(db.clone()),
            CouponService::new(db.clone()),
            DeliveryService::new(rate_source, config.delivery.default_fee),
            OrderService::new(db.clone(), event_sender.clone()),
            CartService::new(db, event_sender),
            processor,
            notifier,
            config.currency.clone(),
        ));

        Self { checkout, orders }
    }
}
