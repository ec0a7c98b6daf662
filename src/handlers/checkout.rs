use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    entities::order::PaymentMethod,
    errors::ServiceError,
    handlers::{
        common::{created_response, validate_input},
        orders::{OrderItemResponse, OrderResponse},
    },
    services::{
        address::ShippingAddress,
        checkout::{PlaceOrderInput, PlacedOrder},
        payments::ConfirmationOutcome,
        snapshot::LineSelection,
    },
    AppState,
};

/// Creates the router for checkout endpoints
pub fn checkout_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(place_order))
        .route("/orders/{order_id}/confirm", post(confirm_card_payment))
        .route(
            "/orders/{order_id}/retry-payment",
            post(retry_card_payment),
        )
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CheckoutRequest {
    pub user_id: Uuid,
    #[validate(length(min = 1, message = "At least one item is required"))]
    pub items: Vec<LineSelection>,
    pub shipping_address: ShippingAddress,
    pub payment_method: PaymentMethod,
    pub coupon_code: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CheckoutResponse {
    pub order: OrderResponse,
    pub items: Vec<OrderItemResponse>,
    /// Present on card orders: the storefront completes the charge with
    /// this secret and reports the outcome back.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    /// True when the delivery fee fell back to the configured default.
    pub delivery_degraded: bool,
}

impl From<PlacedOrder> for CheckoutResponse {
    fn from(placed: PlacedOrder) -> Self {
        Self {
            order: OrderResponse::from(placed.order),
            items: placed
                .items
                .into_iter()
                .map(OrderItemResponse::from)
                .collect(),
            client_secret: placed.client_secret,
            delivery_degraded: placed.delivery_degraded,
        }
    }
}

/// Place an order from the selected cart lines
#[utoipa::path(
    post,
    path = "/api/v1/checkout",
    request_body = CheckoutRequest,
    responses(
        (status = 201, description = "Order placed", body = CheckoutResponse),
        (status = 400, description = "Validation failed", body = crate::errors::ErrorResponse),
        (status = 422, description = "Coupon rejected", body = crate::errors::ErrorResponse),
        (status = 502, description = "Payment initiation failed, order persisted", body = crate::errors::ErrorResponse),
    )
)]
pub async fn place_order(
    State(state): State<AppState>,
    Json(payload): Json<CheckoutRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;

    let placed = state
        .services
        .checkout
        .place_order(PlaceOrderInput {
            user_id: payload.user_id,
            lines: payload.items,
            shipping_address: payload.shipping_address,
            payment_method: payload.payment_method,
            coupon_code: payload.coupon_code,
        })
        .await?;

    Ok(created_response(CheckoutResponse::from(placed)))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RetryPaymentResponse {
    pub order_id: Uuid,
    pub client_secret: String,
}

/// Request a fresh client secret for an unpaid card order
#[utoipa::path(
    post,
    path = "/api/v1/checkout/orders/{order_id}/retry-payment",
    params(("order_id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "New client secret issued", body = RetryPaymentResponse),
        (status = 400, description = "Order is not retryable", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 502, description = "Processor unreachable", body = crate::errors::ErrorResponse),
    )
)]
pub async fn retry_card_payment(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<RetryPaymentResponse>, ServiceError> {
    let client_secret = state
        .services
        .checkout
        .retry_card_payment(order_id)
        .await?;

    Ok(Json(RetryPaymentResponse {
        order_id,
        client_secret,
    }))
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ConfirmPaymentRequest {
    pub outcome: ConfirmationOutcome,
    /// Processor message accompanying a failed outcome
    pub message: Option<String>,
}

/// Report the client-side card confirmation outcome
#[utoipa::path(
    post,
    path = "/api/v1/checkout/orders/{order_id}/confirm",
    params(("order_id" = Uuid, Path, description = "Order id")),
    request_body = ConfirmPaymentRequest,
    responses(
        (status = 200, description = "Order finalized", body = OrderResponse),
        (status = 402, description = "Payment declined, order persisted", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    )
)]
pub async fn confirm_card_payment(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    Json(payload): Json<ConfirmPaymentRequest>,
) -> Result<Json<OrderResponse>, ServiceError> {
    validate_input(&payload)?;

    let order = state
        .services
        .checkout
        .confirm_card_payment(order_id, payload.outcome, payload.message)
        .await?;

    Ok(Json(OrderResponse::from(order)))
}
