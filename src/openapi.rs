use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::handlers;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Checkout API",
        description = "Checkout and order orchestration for the storefront: \
            cart-to-order conversion, discount codes, delivery fees, and \
            cash-on-delivery or card settlement."
    ),
    paths(
        handlers::checkout::place_order,
        handlers::checkout::confirm_card_payment,
        handlers::checkout::retry_card_payment,
        handlers::orders::get_order,
        handlers::orders::get_order_items,
        handlers::orders::list_orders,
    ),
    components(schemas(
        handlers::checkout::CheckoutRequest,
        handlers::checkout::CheckoutResponse,
        handlers::checkout::ConfirmPaymentRequest,
        handlers::checkout::RetryPaymentResponse,
        handlers::orders::OrderResponse,
        handlers::orders::OrderItemResponse,
        crate::errors::ErrorResponse,
        crate::services::address::ShippingAddress,
        crate::services::snapshot::LineSelection,
        crate::services::payments::ConfirmationOutcome,
        crate::entities::order::OrderStatus,
        crate::entities::order::PaymentStatus,
        crate::entities::order::PaymentMethod,
    )),
    tags(
        (name = "checkout", description = "Cart-to-order conversion and settlement"),
        (name = "orders", description = "Order read surface")
    )
)]
pub struct ApiDoc;

/// Swagger UI router serving the generated document.
pub fn swagger_routes() -> SwaggerUi {
    SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi())
}
