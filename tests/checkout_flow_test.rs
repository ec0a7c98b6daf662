//! Integration tests for the checkout flow against an in-memory SQLite
//! database: order assembly, coupon redemption, payment routing, and
//! post-commit reconciliation.

mod common;

use std::sync::atomic::Ordering;

use assert_matches::assert_matches;
use chrono::Duration;
use checkout_api::{
    entities::{
        coupon::DiscountType,
        order::{OrderStatus, PaymentMethod, PaymentStatus},
    },
    errors::{CouponError, ServiceError},
    services::{checkout::PlaceOrderInput, payments::ConfirmationOutcome, snapshot::LineSelection},
};
use common::{shipping_address, TestContext};
use rust_decimal_macros::dec;
use uuid::Uuid;

fn checkout_input(
    user_id: Uuid,
    lines: Vec<LineSelection>,
    payment_method: PaymentMethod,
    coupon_code: Option<&str>,
) -> PlaceOrderInput {
    PlaceOrderInput {
        user_id,
        lines,
        shipping_address: shipping_address(),
        payment_method,
        coupon_code: coupon_code.map(String::from),
    }
}

fn one_line(product_id: Uuid, quantity: i32) -> Vec<LineSelection> {
    vec![LineSelection {
        product_id,
        variant_id: None,
        quantity,
    }]
}

// ==================== COD path ====================

#[tokio::test]
async fn cod_checkout_with_percentage_coupon() {
    let ctx = TestContext::new().await;
    let user_id = Uuid::new_v4();

    let product = ctx.seed_product("Bàn phím cơ", dec!(500000)).await;
    let cart = ctx.seed_cart(user_id, &[&product]).await;
    ctx.seed_coupon(
        "GIAM10",
        DiscountType::Percentage,
        dec!(10),
        dec!(0),
        100,
        Duration::days(7),
    )
    .await;

    let placed = ctx
        .services
        .checkout
        .place_order(checkout_input(
            user_id,
            one_line(product.id, 2),
            PaymentMethod::Cash,
            Some("GIAM10"),
        ))
        .await
        .expect("checkout should succeed");

    // 1,000,000 subtotal - 10% + 30,000 delivery
    assert_eq!(placed.order.subtotal, dec!(1000000));
    assert_eq!(placed.order.discount_amount, dec!(100000));
    assert_eq!(placed.order.delivery_fee, dec!(30000));
    assert_eq!(placed.order.total_amount, dec!(930000));
    assert_eq!(placed.order.order_status, OrderStatus::Processing);
    assert_eq!(placed.order.payment_status, PaymentStatus::Pending);
    assert!(placed.client_secret.is_none());

    // Reconciler ran: cart cleared, one notification
    assert_eq!(ctx.cart_item_count(cart.id).await, 0);
    assert_eq!(ctx.notifier.sent.load(Ordering::SeqCst), 1);

    // Coupon use consumed exactly once, at commit
    assert_eq!(ctx.coupon_used_count("GIAM10").await, 1);
}

#[tokio::test]
async fn totals_recompute_to_the_persisted_value() {
    let ctx = TestContext::new().await;
    let user_id = Uuid::new_v4();

    let product = ctx.seed_product("Ly giữ nhiệt", dec!(120000)).await;
    ctx.seed_coupon(
        "TRU50K",
        DiscountType::FixedAmount,
        dec!(50000),
        dec!(0),
        10,
        Duration::days(1),
    )
    .await;

    let placed = ctx
        .services
        .checkout
        .place_order(checkout_input(
            user_id,
            one_line(product.id, 3),
            PaymentMethod::Cash,
            Some("TRU50K"),
        ))
        .await
        .unwrap();

    let order = ctx
        .services
        .orders
        .get_order(placed.order.id)
        .await
        .unwrap()
        .expect("order should be persisted");

    // Recomputed independently from the persisted parts
    let expected =
        (order.subtotal - order.discount_amount).max(dec!(0)) + order.delivery_fee;
    assert_eq!(order.total_amount, expected);
    assert!(order.total_amount >= order.delivery_fee);
}

// ==================== Card path ====================

#[tokio::test]
async fn card_checkout_returns_a_client_secret_and_defers_reconciliation() {
    let ctx = TestContext::new().await;
    let user_id = Uuid::new_v4();

    let product = ctx.seed_product("Tai nghe", dec!(800000)).await;
    let cart = ctx.seed_cart(user_id, &[&product]).await;

    let placed = ctx
        .services
        .checkout
        .place_order(checkout_input(
            user_id,
            one_line(product.id, 1),
            PaymentMethod::Card,
            None,
        ))
        .await
        .unwrap();

    assert!(placed.client_secret.is_some());
    assert_eq!(placed.order.order_status, OrderStatus::Pending);
    assert_eq!(placed.order.payment_status, PaymentStatus::Pending);

    // Nothing reconciled before the client confirms
    assert_eq!(ctx.cart_item_count(cart.id).await, 1);
    assert_eq!(ctx.notifier.sent.load(Ordering::SeqCst), 0);

    let confirmed = ctx
        .services
        .checkout
        .confirm_card_payment(placed.order.id, ConfirmationOutcome::Succeeded, None)
        .await
        .unwrap();

    assert_eq!(confirmed.payment_status, PaymentStatus::Paid);
    assert_eq!(confirmed.order_status, OrderStatus::Processing);
    assert_eq!(ctx.cart_item_count(cart.id).await, 0);
    assert_eq!(ctx.notifier.sent.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn declined_card_keeps_the_order_and_the_cart() {
    let ctx = TestContext::new().await;
    let user_id = Uuid::new_v4();

    let product = ctx.seed_product("Loa bluetooth", dec!(950000)).await;
    let cart = ctx.seed_cart(user_id, &[&product]).await;

    let placed = ctx
        .services
        .checkout
        .place_order(checkout_input(
            user_id,
            one_line(product.id, 1),
            PaymentMethod::Card,
            None,
        ))
        .await
        .unwrap();

    let err = ctx
        .services
        .checkout
        .confirm_card_payment(
            placed.order.id,
            ConfirmationOutcome::Failed,
            Some("insufficient funds".to_string()),
        )
        .await
        .unwrap_err();

    assert_matches!(
        err,
        ServiceError::PaymentDeclined { order_id, .. } if order_id == placed.order.id
    );

    let order = ctx
        .services
        .orders
        .get_order(placed.order.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.payment_status, PaymentStatus::Failed);
    assert_eq!(order.order_status, OrderStatus::Pending);

    // Cart untouched, no notification
    assert_eq!(ctx.cart_item_count(cart.id).await, 1);
    assert_eq!(ctx.notifier.sent.load(Ordering::SeqCst), 0);

    // A later successful confirmation settles the same order, no
    // duplicate is created.
    let settled = ctx
        .services
        .checkout
        .confirm_card_payment(placed.order.id, ConfirmationOutcome::Succeeded, None)
        .await
        .unwrap();
    assert_eq!(settled.id, placed.order.id);
    assert_eq!(settled.payment_status, PaymentStatus::Paid);
    assert_eq!(ctx.order_count().await, 1);
}

#[tokio::test]
async fn duplicate_confirmation_is_a_noop() {
    let ctx = TestContext::new().await;
    let user_id = Uuid::new_v4();

    let product = ctx.seed_product("Sạc dự phòng", dec!(450000)).await;
    let cart = ctx.seed_cart(user_id, &[&product]).await;

    let placed = ctx
        .services
        .checkout
        .place_order(checkout_input(
            user_id,
            one_line(product.id, 1),
            PaymentMethod::Card,
            None,
        ))
        .await
        .unwrap();

    let first = ctx
        .services
        .checkout
        .confirm_card_payment(placed.order.id, ConfirmationOutcome::Succeeded, None)
        .await
        .unwrap();
    let second = ctx
        .services
        .checkout
        .confirm_card_payment(placed.order.id, ConfirmationOutcome::Succeeded, None)
        .await
        .unwrap();

    // Same state back, no second transition
    assert_eq!(second.payment_status, PaymentStatus::Paid);
    assert_eq!(second.version, first.version);

    // Exactly one cart clear and one notification
    assert_eq!(ctx.cart_item_count(cart.id).await, 0);
    assert_eq!(ctx.notifier.sent.load(Ordering::SeqCst), 1);

    // A stale failure report after settlement is ignored too
    let ignored = ctx
        .services
        .checkout
        .confirm_card_payment(placed.order.id, ConfirmationOutcome::Failed, None)
        .await
        .unwrap();
    assert_eq!(ignored.payment_status, PaymentStatus::Paid);
}

#[tokio::test]
async fn processor_outage_leaves_a_retryable_order() {
    let ctx = TestContext::new().await;
    let user_id = Uuid::new_v4();

    let product = ctx.seed_product("Màn hình", dec!(3200000)).await;
    ctx.processor.fail.store(true, Ordering::SeqCst);

    let err = ctx
        .services
        .checkout
        .place_order(checkout_input(
            user_id,
            one_line(product.id, 1),
            PaymentMethod::Card,
            None,
        ))
        .await
        .unwrap_err();

    let order_id = match err {
        ServiceError::PaymentInitiation { order_id, .. } => order_id,
        other => panic!("expected PaymentInitiation, got {:?}", other),
    };

    // The commit point was passed: the order survives, payment pending
    let order = ctx
        .services
        .orders
        .get_order(order_id)
        .await
        .unwrap()
        .expect("order should be persisted despite the outage");
    assert_eq!(order.payment_status, PaymentStatus::Pending);
    assert_eq!(ctx.order_count().await, 1);

    // Retry against the same order id once the processor recovers
    ctx.processor.fail.store(false, Ordering::SeqCst);
    let secret = ctx
        .services
        .checkout
        .retry_card_payment(order_id)
        .await
        .unwrap();
    assert!(!secret.is_empty());
    assert_eq!(ctx.order_count().await, 1);
}

// ==================== Pre-commit failures ====================

#[tokio::test]
async fn expired_coupon_aborts_before_any_write() {
    let ctx = TestContext::new().await;
    let user_id = Uuid::new_v4();

    let product = ctx.seed_product("Ổ cứng", dec!(1500000)).await;
    ctx.seed_coupon(
        "HETHAN",
        DiscountType::Percentage,
        dec!(20),
        dec!(0),
        10,
        Duration::days(-1),
    )
    .await;

    let err = ctx
        .services
        .checkout
        .place_order(checkout_input(
            user_id,
            one_line(product.id, 1),
            PaymentMethod::Cash,
            Some("HETHAN"),
        ))
        .await
        .unwrap_err();

    assert_matches!(err, ServiceError::Coupon(CouponError::Expired(_)));
    assert_eq!(ctx.order_count().await, 0);
    assert_eq!(ctx.notifier.sent.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn missing_zip_code_fails_before_the_fee_lookup() {
    let ctx = TestContext::new().await;
    let user_id = Uuid::new_v4();

    let product = ctx.seed_product("Chuột", dec!(250000)).await;

    let mut input = checkout_input(user_id, one_line(product.id, 1), PaymentMethod::Cash, None);
    input.shipping_address.zip_code = String::new();

    let err = ctx.services.checkout.place_order(input).await.unwrap_err();

    assert_matches!(err, ServiceError::IncompleteAddress("zip_code"));
    assert_eq!(ctx.order_count().await, 0);
    // The delivery-rate source was never consulted
    assert_eq!(ctx.rate_source.quotes.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unknown_product_is_rejected_with_no_order() {
    let ctx = TestContext::new().await;

    let err = ctx
        .services
        .checkout
        .place_order(checkout_input(
            Uuid::new_v4(),
            one_line(Uuid::new_v4(), 1),
            PaymentMethod::Cash,
            None,
        ))
        .await
        .unwrap_err();

    assert_matches!(err, ServiceError::InvalidSelection(_));
    assert_eq!(ctx.order_count().await, 0);
}

// ==================== Coupon usage cap ====================

#[tokio::test]
async fn concurrent_checkouts_cannot_exceed_the_coupon_cap() {
    let ctx = TestContext::new().await;

    let product = ctx.seed_product("Ghế công thái học", dec!(2000000)).await;
    ctx.seed_coupon(
        "CAP2",
        DiscountType::FixedAmount,
        dec!(200000),
        dec!(0),
        2,
        Duration::days(1),
    )
    .await;

    let attempt = |user_id: Uuid| {
        let checkout = ctx.services.checkout.clone();
        let lines = one_line(product.id, 1);
        async move {
            checkout
                .place_order(checkout_input(
                    user_id,
                    lines,
                    PaymentMethod::Cash,
                    Some("CAP2"),
                ))
                .await
        }
    };

    let (a, b, c) = tokio::join!(
        attempt(Uuid::new_v4()),
        attempt(Uuid::new_v4()),
        attempt(Uuid::new_v4())
    );

    let results = [a, b, c];
    let succeeded = results.iter().filter(|r| r.is_ok()).count();
    let exceeded = results
        .iter()
        .filter(|r| {
            matches!(
                r,
                Err(ServiceError::Coupon(CouponError::UsageExceeded(_)))
            )
        })
        .count();

    assert_eq!(succeeded, 2, "exactly max_uses checkouts may redeem");
    assert_eq!(exceeded, 1, "the raced-out checkout sees UsageExceeded");
    assert_eq!(ctx.coupon_used_count("CAP2").await, 2);
    // The losing attempt rolled back: only the winners' orders exist
    assert_eq!(ctx.order_count().await, 2);
}

// ==================== Snapshot semantics ====================

#[tokio::test]
async fn order_totals_survive_catalog_price_changes() {
    use checkout_api::entities::product;
    use sea_orm::{ActiveModelTrait, Set};

    let ctx = TestContext::new().await;
    let user_id = Uuid::new_v4();

    let seeded = ctx.seed_product("Bình nước", dec!(90000)).await;
    let placed = ctx
        .services
        .checkout
        .place_order(checkout_input(
            user_id,
            one_line(seeded.id, 2),
            PaymentMethod::Cash,
            None,
        ))
        .await
        .unwrap();

    // Catalog price changes after the order was placed
    let mut update: product::ActiveModel = seeded.into();
    update.base_price = Set(dec!(250000));
    update.update(&*ctx.db).await.unwrap();

    let order = ctx
        .services
        .orders
        .get_order(placed.order.id)
        .await
        .unwrap()
        .unwrap();
    let items = ctx
        .services
        .orders
        .get_order_items(placed.order.id)
        .await
        .unwrap();

    assert_eq!(order.subtotal, dec!(180000));
    assert_eq!(order.total_amount, placed.order.total_amount);
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].unit_price, dec!(90000));
    assert_eq!(items[0].total_price, dec!(180000));
}

#[tokio::test]
async fn variant_price_is_captured_on_the_invoice_line() {
    let ctx = TestContext::new().await;
    let user_id = Uuid::new_v4();

    let product = ctx.seed_product("Áo khoác", dec!(400000)).await;
    let variant = ctx.seed_variant(product.id, "Size XL", dec!(450000)).await;

    let placed = ctx
        .services
        .checkout
        .place_order(checkout_input(
            user_id,
            vec![LineSelection {
                product_id: product.id,
                variant_id: Some(variant.id),
                quantity: 1,
            }],
            PaymentMethod::Cash,
            None,
        ))
        .await
        .unwrap();

    let items = ctx
        .services
        .orders
        .get_order_items(placed.order.id)
        .await
        .unwrap();
    assert_eq!(items[0].unit_price, dec!(450000));
    assert_eq!(items[0].variant_label.as_deref(), Some("Size XL"));
    assert_eq!(items[0].name, "Áo khoác");
}

// ==================== Reconciler resilience ====================

#[tokio::test]
async fn notification_failure_does_not_fail_the_checkout() {
    let ctx = TestContext::new().await;
    let user_id = Uuid::new_v4();

    let product = ctx.seed_product("Đèn bàn", dec!(300000)).await;
    let cart = ctx.seed_cart(user_id, &[&product]).await;
    ctx.notifier.fail.store(true, Ordering::SeqCst);

    let placed = ctx
        .services
        .checkout
        .place_order(checkout_input(
            user_id,
            one_line(product.id, 1),
            PaymentMethod::Cash,
            None,
        ))
        .await
        .expect("checkout must succeed even when the notification sink is down");

    assert_eq!(placed.order.order_status, OrderStatus::Processing);
    // The cart clear still happened; only the notification was lost
    assert_eq!(ctx.cart_item_count(cart.id).await, 0);
}
