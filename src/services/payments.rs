use crate::errors::ServiceError;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};
use utoipa::ToSchema;

/// Confirmation outcome reported back by the client after the payment
/// SDK finishes the card flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationOutcome {
    Succeeded,
    Failed,
    RequiresAction,
}

/// Client secret handed to the storefront for the out-of-band card
/// confirmation. This service never sees card data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub client_secret: String,
}

/// Third-party payment processor. Only intent creation happens
/// server-side; the charge itself is confirmed by the client SDK.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    async fn create_intent(
        &self,
        amount: Decimal,
        currency: &str,
    ) -> Result<PaymentIntent, ServiceError>;
}

/// HTTP-backed processor client.
pub struct HttpPaymentProcessor {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

#[derive(Debug, Serialize)]
struct CreateIntentBody<'a> {
    amount: Decimal,
    currency: &'a str,
}

#[derive(Debug, Deserialize)]
struct IntentResponseBody {
    client_secret: String,
}

#[derive(Debug, Deserialize)]
struct ProcessorErrorBody {
    error: ProcessorErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ProcessorErrorDetail {
    message: String,
}

impl HttpPaymentProcessor {
    pub fn new(
        endpoint: String,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ServiceError::InternalError(format!("HTTP client build failed: {}", e)))?;
        Ok(Self {
            client,
            endpoint,
            api_key,
        })
    }
}

#[async_trait]
impl PaymentProcessor for HttpPaymentProcessor {
    #[instrument(skip(self), fields(amount = %amount, currency = %currency))]
    async fn create_intent(
        &self,
        amount: Decimal,
        currency: &str,
    ) -> Result<PaymentIntent, ServiceError> {
        let url = format!("{}/payment_intents", self.endpoint.trim_end_matches('/'));
        let mut request = self
            .client
            .post(&url)
            .json(&CreateIntentBody { amount, currency });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(format!("payment processor: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let message = match response.json::<ProcessorErrorBody>().await {
                Ok(body) => body.error.message,
                Err(_) => format!("payment processor returned {}", status),
            };
            return Err(ServiceError::ExternalServiceError(message));
        }

        let body: IntentResponseBody = response.json().await.map_err(|e| {
            ServiceError::ExternalServiceError(format!("payment processor body: {}", e))
        })?;

        debug!("Payment intent created");
        Ok(PaymentIntent {
            client_secret: body.client_secret,
        })
    }
}
