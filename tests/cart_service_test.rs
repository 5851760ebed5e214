mod common;

use assert_matches::assert_matches;
use common::TestApp;
use rust_decimal_macros::dec;
use storefront_api::{
    entities::{Color, Size},
    errors::ServiceError,
    services::carts::AddCartItemInput,
};
use uuid::Uuid;

fn add(product_id: Uuid, sku: &str, quantity: i32) -> AddCartItemInput {
    AddCartItemInput {
        product_id,
        variant_sku: sku.to_string(),
        quantity,
    }
}

#[tokio::test]
async fn test_cart_is_created_on_first_access() {
    let app = TestApp::new().await;
    let user = app.customer().await;

    let first = app.state.services.carts.get_cart(user.id).await.unwrap();
    let second = app.state.services.carts.get_cart(user.id).await.unwrap();

    assert_eq!(first.cart.id, second.cart.id);
    assert_eq!(first.cart.user_id, user.id);
    assert!(first.cart.items.0.is_empty());
    assert_eq!(first.item_count, 0);
}

#[tokio::test]
async fn test_adding_same_variant_merges_and_keeps_first_price() {
    let app = TestApp::new().await;
    let user = app.customer().await;
    let product = app
        .seed_product("Classic Tee", dec!(50.00), &[(Size::M, Color::Black, 10)])
        .await;
    let sku = product.variants[0].sku.clone();
    let carts = &app.state.services.carts;

    carts
        .add_item(user.id, add(product.product.id, &sku, 2))
        .await
        .unwrap();
    app.state
        .services
        .catalog
        .update_variant(
            product.product.id,
            &sku,
            storefront_api::services::catalog::UpdateVariantInput {
                price: Some(dec!(55.00)),
                stock: None,
            },
        )
        .await
        .unwrap();
    let view = carts
        .add_item(user.id, add(product.product.id, &sku, 1))
        .await
        .unwrap();

    assert_eq!(view.cart.items.0.len(), 1);
    let line = &view.cart.items.0[0];
    assert_eq!(line.quantity, 3);
    assert_eq!(line.price_at_add, dec!(50.00));
    assert_eq!(line.product_name, "Classic Tee");
    assert_eq!(line.variant_size, Size::M);
    assert!(line.product_image.is_some());
    assert_eq!(view.subtotal, dec!(150.00));
    assert_eq!(view.item_count, 3);
}

#[tokio::test]
async fn test_add_rejects_quantity_beyond_stock() {
    let app = TestApp::new().await;
    let user = app.customer().await;
    let product = app
        .seed_product("Classic Tee", dec!(50.00), &[(Size::M, Color::Black, 3)])
        .await;
    let sku = product.variants[0].sku.clone();
    let carts = &app.state.services.carts;

    carts
        .add_item(user.id, add(product.product.id, &sku, 2))
        .await
        .unwrap();

    // 2 already held + 2 more exceeds 3
    let err = carts
        .add_item(user.id, add(product.product.id, &sku, 2))
        .await
        .unwrap_err();
    assert_matches!(
        err,
        ServiceError::InsufficientStock(ref lines) if lines[0].available == 3 && lines[0].requested == 4
    );

    let view = carts.get_cart(user.id).await.unwrap();
    assert_eq!(view.cart.items.0[0].quantity, 2);
}

#[tokio::test]
async fn test_add_rejects_quantity_overflow() {
    let app = TestApp::new().await;
    let user = app.customer().await;
    let product = app
        .seed_product("Classic Tee", dec!(50.00), &[(Size::M, Color::Black, 3)])
        .await;
    let sku = product.variants[0].sku.clone();
    let carts = &app.state.services.carts;

    carts
        .add_item(user.id, add(product.product.id, &sku, 1))
        .await
        .unwrap();
    assert_matches!(
        carts
            .add_item(user.id, add(product.product.id, &sku, i32::MAX))
            .await,
        Err(ServiceError::ValidationError(_))
    );

    let view = carts.get_cart(user.id).await.unwrap();
    assert_eq!(view.cart.items.0[0].quantity, 1);
}

#[tokio::test]
async fn test_add_rejects_unknown_or_inactive_products() {
    let app = TestApp::new().await;
    let user = app.customer().await;
    let product = app
        .seed_product("Classic Tee", dec!(50.00), &[(Size::M, Color::Black, 3)])
        .await;
    let sku = product.variants[0].sku.clone();
    let carts = &app.state.services.carts;

    assert_matches!(
        carts.add_item(user.id, add(Uuid::new_v4(), &sku, 1)).await,
        Err(ServiceError::NotFound(_))
    );
    assert_matches!(
        carts
            .add_item(user.id, add(product.product.id, "CLTE-XS-RED-0000", 1))
            .await,
        Err(ServiceError::NotFound(_))
    );
    assert_matches!(
        carts.add_item(user.id, add(product.product.id, &sku, 0)).await,
        Err(ServiceError::ValidationError(_))
    );

    app.state
        .services
        .catalog
        .deactivate(product.product.id)
        .await
        .unwrap();
    assert_matches!(
        carts.add_item(user.id, add(product.product.id, &sku, 1)).await,
        Err(ServiceError::InvalidOperation(_))
    );
}

#[tokio::test]
async fn test_update_and_remove_by_index() {
    let app = TestApp::new().await;
    let user = app.customer().await;
    let product = app
        .seed_product(
            "Classic Tee",
            dec!(50.00),
            &[(Size::M, Color::Black, 5), (Size::G, Color::White, 5)],
        )
        .await;
    let carts = &app.state.services.carts;
    for variant in &product.variants {
        carts
            .add_item(user.id, add(product.product.id, &variant.sku, 1))
            .await
            .unwrap();
    }

    let view = carts.update_item(user.id, 1, 4).await.unwrap();
    assert_eq!(view.cart.items.0[1].quantity, 4);
    assert_eq!(view.item_count, 5);

    assert_matches!(
        carts.update_item(user.id, 1, 6).await,
        Err(ServiceError::InsufficientStock(_))
    );
    assert_matches!(
        carts.update_item(user.id, 0, 0).await,
        Err(ServiceError::ValidationError(_))
    );
    assert_matches!(
        carts.update_item(user.id, 7, 1).await,
        Err(ServiceError::NotFound(_))
    );

    let view = carts.remove_item(user.id, 0).await.unwrap();
    assert_eq!(view.cart.items.0.len(), 1);
    assert_eq!(view.cart.items.0[0].variant_sku, product.variants[1].sku);
    assert_matches!(
        carts.remove_item(user.id, 1).await,
        Err(ServiceError::NotFound(_))
    );

    let view = carts.clear(user.id).await.unwrap();
    assert!(view.cart.items.0.is_empty());
    assert_eq!(view.subtotal, dec!(0));
}

#[tokio::test]
async fn test_validate_reports_lines_that_lost_stock() {
    let app = TestApp::new().await;
    let user = app.customer().await;
    let product = app
        .seed_product(
            "Classic Tee",
            dec!(50.00),
            &[(Size::M, Color::Black, 5), (Size::G, Color::White, 5)],
        )
        .await;
    let carts = &app.state.services.carts;
    for variant in &product.variants {
        carts
            .add_item(user.id, add(product.product.id, &variant.sku, 2))
            .await
            .unwrap();
    }

    let report = carts.validate(user.id).await.unwrap();
    assert!(report.valid);
    assert!(report.issues.is_empty());

    let short_sku = product.variants[1].sku.clone();
    app.state
        .services
        .catalog
        .set_variant_stock(product.product.id, &short_sku, 1)
        .await
        .unwrap();

    let report = carts.validate(user.id).await.unwrap();
    assert!(!report.valid);
    assert_eq!(report.issues.len(), 1);
    assert_eq!(report.issues[0].sku, short_sku);
    assert_eq!(report.issues[0].available, 1);
    assert_eq!(report.issues[0].requested, 2);
}
