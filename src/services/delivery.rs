use crate::{errors::ServiceError, services::address::{RateKey, ShippingAddress}};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Remote source of shipping rates, keyed by normalized locality.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeliveryRateSource: Send + Sync {
    async fn quote(&self, key: &RateKey) -> Result<Decimal, ServiceError>;
}

/// HTTP-backed rate source.
pub struct HttpDeliveryRateSource {
    client: reqwest::Client,
    endpoint: String,
}

#[derive(Debug, Deserialize)]
struct RateQuoteBody {
    fee: Decimal,
}

impl HttpDeliveryRateSource {
    pub fn new(endpoint: String, timeout: Duration) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ServiceError::InternalError(format!("HTTP client build failed: {}", e)))?;
        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl DeliveryRateSource for HttpDeliveryRateSource {
    async fn quote(&self, key: &RateKey) -> Result<Decimal, ServiceError> {
        let url = format!("{}/quotes", self.endpoint.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .json(key)
            .send()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(format!("rate source: {}", e)))?;

        if !response.status().is_success() {
            return Err(ServiceError::ExternalServiceError(format!(
                "rate source returned {}",
                response.status()
            )));
        }

        let body: RateQuoteBody = response
            .json()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(format!("rate source body: {}", e)))?;

        Ok(body.fee)
    }
}

/// Shipping fee with a flag recording whether the remote lookup
/// succeeded or the configured default was substituted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryQuote {
    pub fee: Decimal,
    pub degraded: bool,
}

/// Best-effort fee estimation. Shipping cost is not safety-critical to
/// the transaction, so a failed lookup degrades to the default fee and
/// never aborts checkout.
#[derive(Clone)]
pub struct DeliveryService {
    source: Option<Arc<dyn DeliveryRateSource>>,
    default_fee: Decimal,
}

impl DeliveryService {
    pub fn new(source: Option<Arc<dyn DeliveryRateSource>>, default_fee: Decimal) -> Self {
        Self {
            source,
            default_fee,
        }
    }

    #[instrument(skip(self, address), fields(city = %address.city))]
    pub async fn estimate_fee(&self, address: &ShippingAddress) -> DeliveryQuote {
        let key = address.rate_key();

        let Some(source) = &self.source else {
            debug!("No rate source configured, using default fee");
            return DeliveryQuote {
                fee: self.default_fee,
                degraded: true,
            };
        };

        match source.quote(&key).await {
            Ok(fee) => DeliveryQuote {
                fee,
                degraded: false,
            },
            Err(e) => {
                warn!(
                    error = %e,
                    city = %key.city,
                    default_fee = %self.default_fee,
                    "Delivery rate lookup failed, falling back to default fee"
                );
                DeliveryQuote {
                    fee: self.default_fee,
                    degraded: true,
                }
            }
        }
    }
}
