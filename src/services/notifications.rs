use crate::{entities::order, errors::ServiceError};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, instrument};

/// Fire-and-forget sink for order-placed notifications. Delivery is
/// best-effort: the reconciler logs failures and moves on.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn order_placed(&self, order: &order::Model) -> Result<(), ServiceError>;
}

/// Posts the order to a configured webhook. Without an endpoint the
/// sink is a no-op, which keeps local development quiet.
pub struct WebhookNotificationSink {
    client: reqwest::Client,
    endpoint: Option<String>,
}

impl WebhookNotificationSink {
    pub fn new(endpoint: Option<String>, timeout: Duration) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ServiceError::InternalError(format!("HTTP client build failed: {}", e)))?;
        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl NotificationSink for WebhookNotificationSink {
    #[instrument(skip(self, order), fields(order_id = %order.id))]
    async fn order_placed(&self, order: &order::Model) -> Result<(), ServiceError> {
        let Some(endpoint) = &self.endpoint else {
            debug!("No notification webhook configured, skipping");
            return Ok(());
        };

        let response = self
            .client
            .post(endpoint)
            .json(order)
            .send()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(format!("notification: {}", e)))?;

        if !response.status().is_success() {
            return Err(ServiceError::ExternalServiceError(format!(
                "notification webhook returned {}",
                response.status()
            )));
        }

        Ok(())
    }
}
