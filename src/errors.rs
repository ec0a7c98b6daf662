use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;
use uuid::Uuid;

/// Standard error body returned by every endpoint.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "error": "Unprocessable Entity",
    "message": "Coupon error: coupon SUMMER10 has expired",
    "order_id": null,
    "timestamp": "2025-11-03T10:30:00.000Z"
}))]
pub struct ErrorResponse {
    /// HTTP status category (e.g., "Not Found", "Bad Request")
    pub error: String,
    /// Human-readable error description
    pub message: String,
    /// Present on post-commit payment errors so the caller can retry
    /// against the existing order instead of placing a duplicate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<Uuid>,
    /// ISO 8601 timestamp when the error occurred
    pub timestamp: String,
}

/// Coupon validation failures. Recoverable: the caller may retry the
/// checkout without the code.
#[derive(Debug, Clone, PartialEq, thiserror::Error, Serialize)]
pub enum CouponError {
    #[error("coupon {0} not found")]
    NotFound(String),

    #[error("coupon {0} has expired")]
    Expired(String),

    #[error("coupon {0} has reached its usage limit")]
    UsageExceeded(String),

    #[error("subtotal {subtotal} is below the minimum {min_purchase} required by coupon {code}")]
    MinimumNotMet {
        code: String,
        subtotal: Decimal,
        min_purchase: Decimal,
    },
}

#[derive(Debug, thiserror::Error, Serialize)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(
        #[from]
        #[serde(skip)]
        sea_orm::error::DbErr,
    ),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Incomplete address: missing {0}")]
    IncompleteAddress(&'static str),

    #[error("Invalid selection: {0}")]
    InvalidSelection(String),

    #[error("Coupon error: {0}")]
    Coupon(#[from] CouponError),

    #[error("Order commit failed: {0}")]
    CommitError(String),

    /// The order exists but the processor could not be reached to start
    /// the card settlement. Retry payment against `order_id`.
    #[error("Payment initiation failed for order {order_id}: {message}")]
    PaymentInitiation { order_id: Uuid, message: String },

    /// The processor reported a non-successful confirmation. The order
    /// stays persisted; retry payment against `order_id`.
    #[error("Payment declined for order {order_id}: {message}")]
    PaymentDeclined { order_id: Uuid, message: String },

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Invalid status: {0}")]
    InvalidStatus(String),

    #[error("External service error: {0}")]
    ExternalServiceError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Other error: {0}")]
    Other(
        #[from]
        #[serde(skip)]
        anyhow::Error,
    ),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::SerializationError(err.to_string())
    }
}

impl ServiceError {
    /// Returns the HTTP status code for this error.
    /// Single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::ValidationError(_)
            | Self::IncompleteAddress(_)
            | Self::InvalidSelection(_)
            | Self::InvalidOperation(_)
            | Self::InvalidStatus(_) => StatusCode::BAD_REQUEST,
            Self::Coupon(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::PaymentDeclined { .. } => StatusCode::PAYMENT_REQUIRED,
            Self::PaymentInitiation { .. } | Self::ExternalServiceError(_) => {
                StatusCode::BAD_GATEWAY
            }
            Self::DatabaseError(_)
            | Self::CommitError(_)
            | Self::SerializationError(_)
            | Self::InternalError(_)
            | Self::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the message suitable for HTTP responses. Internal errors
    /// return generic messages to avoid leaking implementation detail.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) => "Database error".to_string(),
            Self::SerializationError(_) | Self::InternalError(_) | Self::Other(_) => {
                "Internal server error".to_string()
            }
            Self::CommitError(_) => "Order could not be committed; retry the checkout".to_string(),
            _ => self.to_string(),
        }
    }

    /// The order id a post-commit payment error points back at.
    pub fn order_id(&self) -> Option<Uuid> {
        match self {
            Self::PaymentInitiation { order_id, .. } | Self::PaymentDeclined { order_id, .. } => {
                Some(*order_id)
            }
            _ => None,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let err = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message: self.response_message(),
            order_id: self.order_id(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(err)).into_response()
    }
}
