mod common;

use assert_matches::assert_matches;
use common::{drain_events, TestApp};
use rust_decimal_macros::dec;
use sea_orm::EntityTrait;
use storefront_api::{
    entities::{commerce::{Coupon, DiscountType}, CatalogReference, OrderStatus, PaymentStatus},
    errors::ServiceError,
    events::Event,
    services::{
        commerce::{CartOwner, CheckoutInput},
        orders::{CreateOrderInput, OrderItemInput},
    },
};
use uuid::Uuid;

fn checkout_input() -> CheckoutInput {
    CheckoutInput {
        email: "buyer@example.com".into(),
        shipping_cost: dec!(10),
        tax_amount: dec!(8),
        ..Default::default()
    }
}

#[tokio::test]
async fn checkout_turns_cart_into_order() {
    let app = TestApp::new().await;
    let services = &app.state.services;
    let product = app.seed_product("DESK", dec!(100)).await;
    let reference = CatalogReference::Product(product.id);
    app.seed_stock(reference, 10).await;

    let user = Uuid::new_v4();
    let cart = services.cart.get_or_create(CartOwner::User(user)).await.unwrap();
    services.cart.add_line(cart.id, reference, 2).await.unwrap();

    let details = services
        .checkout
        .checkout_from_cart(cart.id, checkout_input())
        .await
        .unwrap();

    let order = &details.order;
    assert_eq!(order.user_id, Some(user));
    assert!(!order.is_guest_checkout);
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.payment_status, PaymentStatus::Pending);
    assert_eq!(order.subtotal, dec!(200));
    assert_eq!(order.total, dec!(218));
    assert!(order.order_number.starts_with("ORD-"));

    assert_eq!(details.items.len(), 1);
    let line = &details.items[0];
    assert_eq!(line.product_name, "Product DESK");
    assert_eq!(line.sku, "DESK");
    assert_eq!(line.price, dec!(100));
    assert_eq!(line.quantity, 2);
    assert_eq!(line.total_price, dec!(200));

    assert_eq!(details.status_history.len(), 1);
    assert_eq!(details.status_history[0].status, OrderStatus::Pending);

    let view = services.cart.get_cart_view(cart.id).await.unwrap();
    assert!(view.is_empty);

    let stock = services.inventory.get(reference).await.unwrap();
    assert_eq!(stock.record.quantity, 8);
}

#[tokio::test]
async fn checkout_applies_coupon_and_counts_redemption() {
    let app = TestApp::new().await;
    let services = &app.state.services;
    let product = app.seed_product("CHAIR", dec!(100)).await;
    let coupon = app
        .seed_coupon("SAVE10", DiscountType::Percentage, dec!(10), dec!(50), 0)
        .await;

    let cart = services
        .cart
        .get_or_create(CartOwner::User(Uuid::new_v4()))
        .await
        .unwrap();
    services
        .cart
        .add_line(cart.id, CatalogReference::Product(product.id), 2)
        .await
        .unwrap();

    let details = services
        .checkout
        .checkout_from_cart(
            cart.id,
            CheckoutInput {
                coupon_code: Some("SAVE10".into()),
                discount_amount: dec!(99),
                ..checkout_input()
            },
        )
        .await
        .unwrap();

    assert_eq!(details.order.discount_amount, dec!(20));
    assert_eq!(details.order.coupon_code.as_deref(), Some("SAVE10"));
    assert_eq!(details.order.total, dec!(198));

    let stored = Coupon::find_by_id(coupon.id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.times_used, 1);
}

#[tokio::test]
async fn failed_checkout_leaves_cart_untouched() {
    let app = TestApp::new().await;
    let services = &app.state.services;
    let product = app.seed_product("RUG", dec!(30)).await;
    app.seed_coupon("BIGSPEND", DiscountType::Fixed, dec!(15), dec!(500), 0)
        .await;

    let cart = services
        .cart
        .get_or_create(CartOwner::User(Uuid::new_v4()))
        .await
        .unwrap();
    services
        .cart
        .add_line(cart.id, CatalogReference::Product(product.id), 1)
        .await
        .unwrap();

    let result = services
        .checkout
        .checkout_from_cart(
            cart.id,
            CheckoutInput {
                coupon_code: Some("BIGSPEND".into()),
                ..checkout_input()
            },
        )
        .await;
    assert_matches!(result, Err(ServiceError::MinimumNotMet(_)));

    let view = services.cart.get_cart_view(cart.id).await.unwrap();
    assert_eq!(view.total_items, 1);
    assert_eq!(view.cart.version, cart.version);
}

#[tokio::test]
async fn empty_cart_cannot_be_checked_out() {
    let app = TestApp::new().await;
    let services = &app.state.services;
    let cart = services
        .cart
        .get_or_create(CartOwner::Session("empty".into()))
        .await
        .unwrap();

    assert_matches!(
        services
            .checkout
            .checkout_from_cart(cart.id, checkout_input())
            .await,
        Err(ServiceError::ValidationError(_))
    );
    assert_matches!(
        services
            .checkout
            .checkout_from_cart(Uuid::new_v4(), checkout_input())
            .await,
        Err(ServiceError::NotFound(_))
    );
}

#[tokio::test]
async fn guest_checkout_keeps_saved_lines() {
    let app = TestApp::new().await;
    let services = &app.state.services;
    let active = app.seed_product("KETTLE", dec!(40)).await;
    let saved = app.seed_product("TOASTER", dec!(55)).await;

    let cart = services
        .cart
        .get_or_create(CartOwner::Session("guest".into()))
        .await
        .unwrap();
    services
        .cart
        .add_line(cart.id, CatalogReference::Product(active.id), 1)
        .await
        .unwrap();
    let saved_line = services
        .cart
        .add_line(cart.id, CatalogReference::Product(saved.id), 1)
        .await
        .unwrap();
    services
        .cart
        .save_for_later(cart.id, saved_line.id)
        .await
        .unwrap();

    let details = services
        .checkout
        .checkout_from_cart(cart.id, CheckoutInput {
            email: "guest@example.com".into(),
            ..Default::default()
        })
        .await
        .unwrap();

    assert!(details.order.is_guest_checkout);
    assert_eq!(details.order.user_id, None);
    assert_eq!(details.order.total, dec!(40));
    assert_eq!(details.items.len(), 1);

    let view = services.cart.get_cart_view(cart.id).await.unwrap();
    assert!(view.is_empty);
    assert_eq!(view.saved_items.len(), 1);
}

#[tokio::test]
async fn second_checkout_of_same_cart_finds_it_empty() {
    let app = TestApp::new().await;
    let services = &app.state.services;
    let product = app.seed_product("PLANT", dec!(25)).await;
    let cart = services
        .cart
        .get_or_create(CartOwner::User(Uuid::new_v4()))
        .await
        .unwrap();
    services
        .cart
        .add_line(cart.id, CatalogReference::Product(product.id), 1)
        .await
        .unwrap();

    services
        .checkout
        .checkout_from_cart(cart.id, checkout_input())
        .await
        .unwrap();
    assert_matches!(
        services
            .checkout
            .checkout_from_cart(cart.id, checkout_input())
            .await,
        Err(ServiceError::ValidationError(_))
    );
}

#[tokio::test]
async fn place_order_snapshots_catalog_and_takes_stock() {
    let (app, mut events) = TestApp::capturing_events().await;
    let services = &app.state.services;
    let product = app.seed_product("BIKE", dec!(500)).await;
    let variant = app.seed_variant(&product, "BIKE-RED", dec!(520)).await;
    let reference = CatalogReference::Variant(variant.id);
    app.seed_stock(reference, 1).await;
    drain_events(&mut events);

    let details = services
        .checkout
        .place_order(CreateOrderInput {
            user_id: None,
            email: "rider@example.com".into(),
            shipping_address_id: None,
            billing_address_id: None,
            shipping_method: Some("ground".into()),
            shipping_cost: dec!(0),
            tax_amount: dec!(0),
            discount_amount: dec!(20),
            coupon_code: None,
            notes: None,
            payment_method: None,
            items: vec![OrderItemInput::for_reference(reference, 3, dec!(510))],
        })
        .await
        .unwrap();

    assert_eq!(details.order.subtotal, dec!(1530));
    assert_eq!(details.order.total, dec!(1510));
    assert_eq!(details.items[0].variant_name.as_deref(), Some("Variant BIKE-RED"));
    assert_eq!(details.items[0].product_name, "Product BIKE");
    assert_eq!(details.items[0].price, dec!(510));

    // Stock floors at zero.
    let stock = services.inventory.get(reference).await.unwrap();
    assert_eq!(stock.record.quantity, 0);
    assert!(!stock.is_in_stock);

    let names: Vec<&str> = drain_events(&mut events).iter().map(Event::name).collect::<Vec<_>>();
    assert!(names.contains(&"order_created"));
    assert!(names.contains(&"inventory_decremented"));
}

#[tokio::test]
async fn place_order_rejects_unknown_references_without_side_effects() {
    let app = TestApp::new().await;
    let services = &app.state.services;
    let product = app.seed_product("OK", dec!(10)).await;
    let reference = CatalogReference::Product(product.id);
    app.seed_stock(reference, 5).await;

    let result = services
        .checkout
        .place_order(CreateOrderInput {
            user_id: Some(Uuid::new_v4()),
            email: "x@example.com".into(),
            shipping_address_id: None,
            billing_address_id: None,
            shipping_method: None,
            shipping_cost: dec!(0),
            tax_amount: dec!(0),
            discount_amount: dec!(0),
            coupon_code: None,
            notes: None,
            payment_method: None,
            items: vec![
                OrderItemInput::for_reference(reference, 1, dec!(10)),
                OrderItemInput::for_reference(CatalogReference::Product(Uuid::new_v4()), 1, dec!(10)),
            ],
        })
        .await;
    assert_matches!(result, Err(ServiceError::InvalidReference(_)));

    let stock = services.inventory.get(reference).await.unwrap();
    assert_eq!(stock.record.quantity, 5);
}

#[tokio::test]
async fn deleted_catalog_entry_blocks_checkout_until_removed() {
    use storefront_api::entities::product::Entity as Product;

    let app = TestApp::new().await;
    let services = &app.state.services;
    let kept = app.seed_product("LAMP", dec!(40)).await;
    let retired = app.seed_product("RETIRED", dec!(15)).await;

    let cart = services
        .cart
        .get_or_create(CartOwner::User(Uuid::new_v4()))
        .await
        .unwrap();
    services
        .cart
        .add_line(cart.id, CatalogReference::Product(kept.id), 1)
        .await
        .unwrap();
    let dead = services
        .cart
        .add_line(cart.id, CatalogReference::Product(retired.id), 2)
        .await
        .unwrap();

    Product::delete_by_id(retired.id)
        .exec(&*app.state.db)
        .await
        .unwrap();

    let view = services.cart.get_cart_view(cart.id).await.unwrap();
    let dead_line = view.items.iter().find(|l| l.id == dead.id).unwrap();
    assert!(!dead_line.available);
    assert_eq!(dead_line.unit_price, dec!(0));
    assert_eq!(view.subtotal, dec!(40));

    let err = services
        .checkout
        .checkout_from_cart(cart.id, checkout_input())
        .await
        .unwrap_err();
    assert_matches!(&err, ServiceError::InvalidReference(msg) if msg.contains(&dead.id.to_string()));

    let untouched = services.cart.get_cart_view(cart.id).await.unwrap();
    assert_eq!(untouched.items.len(), 2);
    assert_eq!(untouched.cart.version, cart.version);

    services.cart.remove_line(cart.id, dead.id).await.unwrap();
    let details = services
        .checkout
        .checkout_from_cart(cart.id, checkout_input())
        .await
        .unwrap();
    assert_eq!(details.items.len(), 1);
    assert_eq!(details.order.subtotal, dec!(40));
}
