mod common;

use assert_matches::assert_matches;
use common::TestApp;
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, IntoActiveModel, Set};
use storefront_api::{
    entities::CatalogReference,
    errors::ServiceError,
    services::commerce::{cart_service::MAX_LINE_QUANTITY, CartOwner},
};
use uuid::Uuid;

#[tokio::test]
async fn get_or_create_is_idempotent_per_owner() {
    let app = TestApp::new().await;
    let carts = &app.state.services.cart;
    let user = Uuid::new_v4();

    let first = carts.get_or_create(CartOwner::User(user)).await.unwrap();
    let second = carts.get_or_create(CartOwner::User(user)).await.unwrap();
    assert_eq!(first.id, second.id);
    assert_eq!(first.user_id, Some(user));

    let session = carts
        .get_or_create(CartOwner::Session("sess-1".into()))
        .await
        .unwrap();
    assert_ne!(session.id, first.id);
    assert_eq!(session.session_id.as_deref(), Some("sess-1"));
}

#[tokio::test]
async fn adding_the_same_reference_sums_into_one_line() {
    let app = TestApp::new().await;
    let carts = &app.state.services.cart;
    let product = app.seed_product("TEE-1", dec!(25)).await;
    let reference = CatalogReference::Product(product.id);

    let cart = carts.get_or_create(CartOwner::User(Uuid::new_v4())).await.unwrap();
    let first = carts.add_line(cart.id, reference, 2).await.unwrap();
    let second = carts.add_line(cart.id, reference, 3).await.unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(second.quantity, 5);

    let view = carts.get_cart_view(cart.id).await.unwrap();
    assert_eq!(view.items.len(), 1);
    assert_eq!(view.total_items, 5);
    assert_eq!(view.subtotal, dec!(125));
    assert!(!view.is_empty);
}

#[tokio::test]
async fn product_and_variant_lines_are_distinct() {
    let app = TestApp::new().await;
    let carts = &app.state.services.cart;
    let product = app.seed_product("HOODIE", dec!(40)).await;
    let variant = app.seed_variant(&product, "HOODIE-L", dec!(45)).await;

    let cart = carts.get_or_create(CartOwner::Session("s".into())).await.unwrap();
    carts
        .add_line(cart.id, CatalogReference::Product(product.id), 1)
        .await
        .unwrap();
    carts
        .add_line(cart.id, CatalogReference::Variant(variant.id), 2)
        .await
        .unwrap();

    let view = carts.get_cart_view(cart.id).await.unwrap();
    assert_eq!(view.items.len(), 2);
    assert_eq!(view.subtotal, dec!(130));

    let variant_line = view
        .items
        .iter()
        .find(|l| l.reference == CatalogReference::Variant(variant.id))
        .unwrap();
    assert_eq!(variant_line.name.as_deref(), Some("Product HOODIE"));
    assert_eq!(variant_line.variant_name.as_deref(), Some("Variant HOODIE-L"));
}

#[tokio::test]
async fn add_line_rejects_bad_input() {
    let app = TestApp::new().await;
    let carts = &app.state.services.cart;
    let product = app.seed_product("MUG", dec!(12)).await;
    let cart = carts.get_or_create(CartOwner::User(Uuid::new_v4())).await.unwrap();

    assert_matches!(
        carts
            .add_line(cart.id, CatalogReference::Product(product.id), 0)
            .await,
        Err(ServiceError::ValidationError(_))
    );
    assert_matches!(
        carts
            .add_line(cart.id, CatalogReference::Product(Uuid::new_v4()), 1)
            .await,
        Err(ServiceError::InvalidReference(_))
    );
    assert_matches!(
        carts
            .add_line(Uuid::new_v4(), CatalogReference::Product(product.id), 1)
            .await,
        Err(ServiceError::NotFound(_))
    );

    let mut inactive = product.into_active_model();
    inactive.is_active = Set(false);
    let inactive = inactive.update(&*app.state.db).await.unwrap();
    assert_matches!(
        carts
            .add_line(cart.id, CatalogReference::Product(inactive.id), 1)
            .await,
        Err(ServiceError::InvalidReference(_))
    );
}

#[tokio::test]
async fn update_and_remove_lines() {
    let app = TestApp::new().await;
    let carts = &app.state.services.cart;
    let product = app.seed_product("CAP", dec!(15)).await;
    let cart = carts.get_or_create(CartOwner::User(Uuid::new_v4())).await.unwrap();
    let line = carts
        .add_line(cart.id, CatalogReference::Product(product.id), 1)
        .await
        .unwrap();

    let updated = carts.update_quantity(cart.id, line.id, 4).await.unwrap();
    assert_eq!(updated.quantity, 4);
    assert_matches!(
        carts.update_quantity(cart.id, line.id, -1).await,
        Err(ServiceError::ValidationError(_))
    );

    let other_cart = carts.get_or_create(CartOwner::User(Uuid::new_v4())).await.unwrap();
    assert_matches!(
        carts.remove_line(other_cart.id, line.id).await,
        Err(ServiceError::NotFound(_))
    );

    carts.remove_line(cart.id, line.id).await.unwrap();
    let view = carts.get_cart_view(cart.id).await.unwrap();
    assert!(view.is_empty);
    assert_eq!(view.subtotal, dec!(0));
}

#[tokio::test]
async fn saved_lines_are_excluded_from_totals() {
    let app = TestApp::new().await;
    let carts = &app.state.services.cart;
    let book = app.seed_product("BOOK", dec!(20)).await;
    let pen = app.seed_product("PEN", dec!(2)).await;
    let cart = carts.get_or_create(CartOwner::User(Uuid::new_v4())).await.unwrap();

    let book_line = carts
        .add_line(cart.id, CatalogReference::Product(book.id), 1)
        .await
        .unwrap();
    carts
        .add_line(cart.id, CatalogReference::Product(pen.id), 3)
        .await
        .unwrap();

    let saved = carts.save_for_later(cart.id, book_line.id).await.unwrap();
    assert!(saved.saved_for_later);

    let view = carts.get_cart_view(cart.id).await.unwrap();
    assert_eq!(view.items.len(), 1);
    assert_eq!(view.saved_items.len(), 1);
    assert_eq!(view.total_items, 3);
    assert_eq!(view.subtotal, dec!(6));

    let saved_lines = carts.saved_lines(cart.id).await.unwrap();
    assert_eq!(saved_lines.len(), 1);
    assert_eq!(saved_lines[0].reference, CatalogReference::Product(book.id));

    // Saving an already-saved line is not an active line any more.
    assert_matches!(
        carts.save_for_later(cart.id, book_line.id).await,
        Err(ServiceError::NotFound(_))
    );

    let moved = carts.move_to_cart(cart.id, book_line.id).await.unwrap();
    assert!(!moved.saved_for_later);
    let view = carts.get_cart_view(cart.id).await.unwrap();
    assert_eq!(view.subtotal, dec!(26));
}

#[tokio::test]
async fn moving_onto_an_existing_line_combines_quantities() {
    let app = TestApp::new().await;
    let carts = &app.state.services.cart;
    let product = app.seed_product("SOCKS", dec!(5)).await;
    let reference = CatalogReference::Product(product.id);
    let cart = carts.get_or_create(CartOwner::User(Uuid::new_v4())).await.unwrap();

    let first = carts.add_line(cart.id, reference, 2).await.unwrap();
    carts.save_for_later(cart.id, first.id).await.unwrap();
    carts.add_line(cart.id, reference, 3).await.unwrap();

    let moved = carts.move_to_cart(cart.id, first.id).await.unwrap();
    assert_eq!(moved.quantity, 5);

    let view = carts.get_cart_view(cart.id).await.unwrap();
    assert_eq!(view.items.len(), 1);
    assert!(view.saved_items.is_empty());
    assert_eq!(view.total_items, 5);
}

#[tokio::test]
async fn clear_keeps_saved_lines() {
    let app = TestApp::new().await;
    let carts = &app.state.services.cart;
    let a = app.seed_product("A", dec!(1)).await;
    let b = app.seed_product("B", dec!(1)).await;
    let cart = carts.get_or_create(CartOwner::User(Uuid::new_v4())).await.unwrap();

    carts
        .add_line(cart.id, CatalogReference::Product(a.id), 1)
        .await
        .unwrap();
    let b_line = carts
        .add_line(cart.id, CatalogReference::Product(b.id), 1)
        .await
        .unwrap();
    carts.save_for_later(cart.id, b_line.id).await.unwrap();

    assert_eq!(carts.clear(cart.id).await.unwrap(), 1);

    let view = carts.get_cart_view(cart.id).await.unwrap();
    assert!(view.is_empty);
    assert_eq!(view.saved_items.len(), 1);
}

#[tokio::test]
async fn merge_folds_session_cart_into_user_cart() {
    let app = TestApp::new().await;
    let carts = &app.state.services.cart;
    let shirt = app.seed_product("SHIRT", dec!(30)).await;
    let belt = app.seed_product("BELT", dec!(18)).await;

    let user_cart = carts.get_or_create(CartOwner::User(Uuid::new_v4())).await.unwrap();
    carts
        .add_line(user_cart.id, CatalogReference::Product(shirt.id), 1)
        .await
        .unwrap();

    let guest_cart = carts
        .get_or_create(CartOwner::Session("guest-42".into()))
        .await
        .unwrap();
    carts
        .add_line(guest_cart.id, CatalogReference::Product(shirt.id), 2)
        .await
        .unwrap();
    carts
        .add_line(guest_cart.id, CatalogReference::Product(belt.id), 1)
        .await
        .unwrap();

    let merged = carts.merge(user_cart.id, Some(guest_cart.id)).await.unwrap();
    assert_eq!(merged, 2);

    let view = carts.get_cart_view(user_cart.id).await.unwrap();
    assert_eq!(view.items.len(), 2);
    assert_eq!(view.total_items, 4);
    assert_eq!(view.subtotal, dec!(108));

    assert_matches!(
        carts.get_cart_view(guest_cart.id).await,
        Err(ServiceError::NotFound(_))
    );

    // Nothing left to merge.
    assert_eq!(carts.merge(user_cart.id, Some(guest_cart.id)).await.unwrap(), 0);
    assert_eq!(carts.merge(user_cart.id, None).await.unwrap(), 0);
    assert_eq!(carts.merge(user_cart.id, Some(user_cart.id)).await.unwrap(), 0);
}

#[tokio::test]
async fn resolve_merges_session_cart_on_login() {
    let app = TestApp::new().await;
    let carts = &app.state.services.cart;
    let product = app.seed_product("LAMP", dec!(60)).await;

    let anonymous = carts.resolve(None, Some("sess-login".into())).await.unwrap();
    carts
        .add_line(anonymous.id, CatalogReference::Product(product.id), 1)
        .await
        .unwrap();

    let user = Uuid::new_v4();
    let cart = carts
        .resolve(Some(user), Some("sess-login".into()))
        .await
        .unwrap();
    assert_eq!(cart.user_id, Some(user));

    let view = carts.get_cart_view(cart.id).await.unwrap();
    assert_eq!(view.total_items, 1);

    assert_matches!(
        carts.resolve(None, None).await,
        Err(ServiceError::ValidationError(_))
    );
}

#[tokio::test]
async fn lines_are_priced_at_the_live_catalog_price() {
    let app = TestApp::new().await;
    let carts = &app.state.services.cart;
    let product = app.seed_product("VASE", dec!(50)).await;
    let cart = carts.get_or_create(CartOwner::User(Uuid::new_v4())).await.unwrap();
    carts
        .add_line(cart.id, CatalogReference::Product(product.id), 2)
        .await
        .unwrap();

    let mut on_sale = product.into_active_model();
    on_sale.sale_price = Set(Some(dec!(40)));
    on_sale.is_on_sale = Set(true);
    on_sale.update(&*app.state.db).await.unwrap();

    let view = carts.get_cart_view(cart.id).await.unwrap();
    assert_eq!(view.items[0].unit_price, dec!(40));
    assert_eq!(view.subtotal, dec!(80));
}

#[tokio::test]
async fn adding_past_the_line_limit_is_rejected() {
    let app = TestApp::new().await;
    let carts = &app.state.services.cart;
    let product = app.seed_product("BULK-1", dec!(1)).await;
    let reference = CatalogReference::Product(product.id);
    let cart = carts.get_or_create(CartOwner::User(Uuid::new_v4())).await.unwrap();

    assert_matches!(
        carts.add_line(cart.id, reference, i32::MAX).await,
        Err(ServiceError::ValidationError(_))
    );

    carts.add_line(cart.id, reference, MAX_LINE_QUANTITY).await.unwrap();
    assert_matches!(
        carts.add_line(cart.id, reference, 1).await,
        Err(ServiceError::ValidationError(_))
    );

    let view = carts.get_cart_view(cart.id).await.unwrap();
    assert_eq!(view.items.len(), 1);
    assert_eq!(view.items[0].quantity, MAX_LINE_QUANTITY);
}

#[tokio::test]
async fn merging_past_the_line_limit_leaves_both_carts_untouched() {
    let app = TestApp::new().await;
    let carts = &app.state.services.cart;
    let product = app.seed_product("BULK-2", dec!(1)).await;
    let reference = CatalogReference::Product(product.id);

    let user_cart = carts.get_or_create(CartOwner::User(Uuid::new_v4())).await.unwrap();
    let session_cart = carts
        .get_or_create(CartOwner::Session("bulk-session".into()))
        .await
        .unwrap();
    carts.add_line(user_cart.id, reference, MAX_LINE_QUANTITY).await.unwrap();
    carts.add_line(session_cart.id, reference, 1).await.unwrap();

    assert_matches!(
        carts.merge(user_cart.id, Some(session_cart.id)).await,
        Err(ServiceError::ValidationError(_))
    );

    let user_view = carts.get_cart_view(user_cart.id).await.unwrap();
    assert_eq!(user_view.items[0].quantity, MAX_LINE_QUANTITY);
    let session_view = carts.get_cart_view(session_cart.id).await.unwrap();
    assert_eq!(session_view.items[0].quantity, 1);
}

#[tokio::test]
async fn moving_past_the_line_limit_is_rejected() {
    let app = TestApp::new().await;
    let carts = &app.state.services.cart;
    let product = app.seed_product("BULK-3", dec!(1)).await;
    let reference = CatalogReference::Product(product.id);
    let cart = carts.get_or_create(CartOwner::User(Uuid::new_v4())).await.unwrap();

    let saved = carts.add_line(cart.id, reference, 1).await.unwrap();
    carts.save_for_later(cart.id, saved.id).await.unwrap();
    let active = carts.add_line(cart.id, reference, MAX_LINE_QUANTITY).await.unwrap();

    assert_matches!(
        carts.move_to_cart(cart.id, saved.id).await,
        Err(ServiceError::ValidationError(_))
    );
    assert_matches!(
        carts.save_for_later(cart.id, active.id).await,
        Err(ServiceError::ValidationError(_))
    );

    let view = carts.get_cart_view(cart.id).await.unwrap();
    assert_eq!(view.items[0].quantity, MAX_LINE_QUANTITY);
    assert_eq!(view.saved_items[0].quantity, 1);
}
