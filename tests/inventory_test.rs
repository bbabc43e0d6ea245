mod common;

use assert_matches::assert_matches;
use common::{drain_events, TestApp};
use rust_decimal_macros::dec;
use storefront_api::{entities::CatalogReference, errors::ServiceError, events::Event};
use uuid::Uuid;

#[tokio::test]
async fn set_stock_creates_then_overwrites() {
    let app = TestApp::new().await;
    let inventory = &app.state.services.inventory;
    let reference = CatalogReference::Product(Uuid::new_v4());

    let created = inventory.set_stock(reference, 12, None).await.unwrap();
    assert_eq!(created.record.quantity, 12);
    assert_eq!(created.record.low_stock_threshold, 5);
    assert!(!created.is_low_stock);

    let updated = inventory.set_stock(reference, 3, None).await.unwrap();
    assert_eq!(updated.record.id, created.record.id);
    assert_eq!(updated.record.quantity, 3);
    assert_eq!(updated.record.low_stock_threshold, 5);
    assert!(updated.is_low_stock);
    assert!(updated.is_in_stock);

    let retuned = inventory.set_stock(reference, 3, Some(2)).await.unwrap();
    assert_eq!(retuned.record.low_stock_threshold, 2);
    assert!(!retuned.is_low_stock);
}

#[tokio::test]
async fn decrement_floors_at_zero() {
    let app = TestApp::new().await;
    let inventory = &app.state.services.inventory;
    let reference = CatalogReference::Variant(Uuid::new_v4());
    inventory.set_stock(reference, 4, None).await.unwrap();

    inventory.decrement(reference, 3).await.unwrap();
    assert_eq!(inventory.get(reference).await.unwrap().record.quantity, 1);

    inventory.decrement(reference, 10).await.unwrap();
    let stock = inventory.get(reference).await.unwrap();
    assert_eq!(stock.record.quantity, 0);
    assert!(!stock.is_in_stock);
}

#[tokio::test]
async fn untracked_references_are_ignored() {
    let (app, mut events) = TestApp::capturing_events().await;
    let inventory = &app.state.services.inventory;
    let reference = CatalogReference::Product(Uuid::new_v4());

    inventory.decrement(reference, 2).await.unwrap();
    assert!(drain_events(&mut events).is_empty());
    assert_matches!(inventory.get(reference).await, Err(ServiceError::NotFound(_)));
}

#[tokio::test]
async fn product_and_variant_stock_are_separate() {
    let app = TestApp::new().await;
    let inventory = &app.state.services.inventory;
    let id = Uuid::new_v4();

    inventory
        .set_stock(CatalogReference::Product(id), 7, None)
        .await
        .unwrap();
    inventory
        .set_stock(CatalogReference::Variant(id), 9, None)
        .await
        .unwrap();
    inventory.decrement(CatalogReference::Variant(id), 1).await.unwrap();

    assert_eq!(
        inventory
            .get(CatalogReference::Product(id))
            .await
            .unwrap()
            .record
            .quantity,
        7
    );
    assert_eq!(
        inventory
            .get(CatalogReference::Variant(id))
            .await
            .unwrap()
            .record
            .quantity,
        8
    );
}

#[tokio::test]
async fn negative_values_are_rejected() {
    let app = TestApp::new().await;
    let inventory = &app.state.services.inventory;
    let reference = CatalogReference::Product(Uuid::new_v4());

    assert_matches!(
        inventory.set_stock(reference, -1, None).await,
        Err(ServiceError::ValidationError(_))
    );
    assert_matches!(
        inventory.set_stock(reference, 1, Some(-5)).await,
        Err(ServiceError::ValidationError(_))
    );
    assert_matches!(
        inventory.decrement(reference, -1).await,
        Err(ServiceError::ValidationError(_))
    );
}

#[tokio::test]
async fn low_stock_report_lists_emptiest_first() {
    let (app, mut events) = TestApp::capturing_events().await;
    let inventory = &app.state.services.inventory;
    let nearly_out = CatalogReference::Product(Uuid::new_v4());
    let empty = CatalogReference::Product(Uuid::new_v4());
    let plenty = CatalogReference::Product(Uuid::new_v4());

    inventory.set_stock(nearly_out, 2, None).await.unwrap();
    inventory.set_stock(empty, 0, None).await.unwrap();
    inventory.set_stock(plenty, 50, None).await.unwrap();

    let report = inventory.low_stock().await.unwrap();
    let refs: Vec<CatalogReference> = report.iter().map(|s| s.record.reference()).collect();
    assert_eq!(refs, vec![empty, nearly_out]);

    let published = drain_events(&mut events);
    assert_eq!(published.len(), 3);
    assert!(published
        .iter()
        .all(|e| matches!(e, Event::StockUpdated { .. })));
}

#[tokio::test]
async fn checkout_only_takes_tracked_stock() {
    let app = TestApp::new().await;
    let services = &app.state.services;
    let tracked = app.seed_product("TRACKED", dec!(10)).await;
    let untracked = app.seed_product("UNTRACKED", dec!(10)).await;
    app.seed_stock(CatalogReference::Product(tracked.id), 3).await;

    let cart = services
        .cart
        .get_or_create(storefront_api::services::commerce::CartOwner::User(Uuid::new_v4()))
        .await
        .unwrap();
    services
        .cart
        .add_line(cart.id, CatalogReference::Product(tracked.id), 1)
        .await
        .unwrap();
    services
        .cart
        .add_line(cart.id, CatalogReference::Product(untracked.id), 1)
        .await
        .unwrap();

    services
        .checkout
        .checkout_from_cart(
            cart.id,
            storefront_api::services::commerce::CheckoutInput {
                email: "stock@example.com".into(),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(
        services
            .inventory
            .get(CatalogReference::Product(tracked.id))
            .await
            .unwrap()
            .record
            .quantity,
        2
    );
    assert_matches!(
        services
            .inventory
            .get(CatalogReference::Product(untracked.id))
            .await,
        Err(ServiceError::NotFound(_))
    );
}
