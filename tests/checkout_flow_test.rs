//! Registered checkout: cart to order, totals, stock reservation and the
//! all-or-nothing transaction around numbering, insert and decrements.

mod common;

use assert_matches::assert_matches;
use chrono::{Datelike, Utc};
use common::TestApp;
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, Set};
use storefront_api::{
    entities::{cart, CartLine, CartLines, Color, OrderStatus, PaymentMethod, PaymentStatus, Size},
    errors::ServiceError,
    services::{carts::AddCartItemInput, orders::CreateOrderInput},
};
use uuid::Uuid;

fn checkout(address_id: Uuid, shipping: Option<rust_decimal::Decimal>) -> CreateOrderInput {
    CreateOrderInput {
        address_id,
        payment_method: PaymentMethod::Pix,
        shipping_cost: shipping,
        notes: None,
    }
}

#[tokio::test]
async fn test_checkout_from_cart() {
    let app = TestApp::new().await;
    let user = app.customer().await;
    let address = app.seed_address(user.id).await;
    let product = app
        .seed_product("Classic Tee", dec!(50.00), &[(Size::M, Color::Black, 5)])
        .await;
    let sku = product.variants[0].sku.clone();

    app.state
        .services
        .carts
        .add_item(
            user.id,
            AddCartItemInput {
                product_id: product.product.id,
                variant_sku: sku.clone(),
                quantity: 2,
            },
        )
        .await
        .unwrap();

    let order = app
        .state
        .services
        .orders
        .create_order(user.id, checkout(address.id, Some(dec!(10.00))))
        .await
        .unwrap();

    assert_eq!(order.subtotal, dec!(100.00));
    assert_eq!(order.shipping_cost, dec!(10.00));
    assert_eq!(order.total, dec!(110.00));
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.payment_status, PaymentStatus::Pending);
    assert_eq!(order.user_id, Some(user.id));
    assert_eq!(
        order.order_number,
        format!("ORD-{}-00001", Utc::now().year())
    );

    assert_eq!(order.items.0.len(), 1);
    let item = &order.items.0[0];
    assert_eq!(item.variant_sku, sku);
    assert_eq!(item.quantity, 2);
    assert_eq!(item.price, dec!(50.00));
    assert_eq!(item.subtotal, dec!(100.00));
    assert_eq!(item.product_name, "Classic Tee");

    assert_eq!(order.shipping_address.email, user.email);
    assert_eq!(order.shipping_address.full_name, "Ana Souza");

    let cart = app.state.services.carts.get_cart(user.id).await.unwrap();
    assert!(cart.cart.items.0.is_empty());
    assert_eq!(cart.subtotal, dec!(0));

    assert_eq!(app.stock_of(product.product.id, &sku).await, 3);
}

#[tokio::test]
async fn test_shipping_cost_defaults_to_configured_value() {
    let app = TestApp::new().await;
    let user = app.customer().await;
    let address = app.seed_address(user.id).await;
    let product = app
        .seed_product("Basic Hoodie", dec!(80.00), &[(Size::G, Color::Gray, 3)])
        .await;

    app.state
        .services
        .carts
        .add_item(
            user.id,
            AddCartItemInput {
                product_id: product.product.id,
                variant_sku: product.variants[0].sku.clone(),
                quantity: 1,
            },
        )
        .await
        .unwrap();

    let order = app
        .state
        .services
        .orders
        .create_order(user.id, checkout(address.id, None))
        .await
        .unwrap();

    assert_eq!(order.shipping_cost, dec!(0));
    assert_eq!(order.total, dec!(80.00));
}

#[tokio::test]
async fn test_empty_cart_is_rejected() {
    let app = TestApp::new().await;
    let user = app.customer().await;
    let address = app.seed_address(user.id).await;

    let missing = app
        .state
        .services
        .orders
        .create_order(user.id, checkout(address.id, None))
        .await;
    assert_matches!(missing, Err(ServiceError::EmptyCart));

    // An existing but empty cart behaves the same
    app.state.services.carts.get_cart(user.id).await.unwrap();
    let empty = app
        .state
        .services
        .orders
        .create_order(user.id, checkout(address.id, None))
        .await;
    assert_matches!(empty, Err(ServiceError::EmptyCart));
    assert_eq!(app.order_count().await, 0);
}

#[tokio::test]
async fn test_negative_shipping_cost_is_rejected() {
    let app = TestApp::new().await;
    let user = app.customer().await;
    let address = app.seed_address(user.id).await;

    let result = app
        .state
        .services
        .orders
        .create_order(user.id, checkout(address.id, Some(dec!(-1))))
        .await;
    assert_matches!(result, Err(ServiceError::ValidationError(_)));
}

#[tokio::test]
async fn test_every_short_line_is_reported_before_any_write() {
    let app = TestApp::new().await;
    let user = app.customer().await;
    let address = app.seed_address(user.id).await;
    let tee = app
        .seed_product("Classic Tee", dec!(50.00), &[(Size::M, Color::Black, 2)])
        .await;
    let cap = app
        .seed_product("Dad Cap", dec!(30.00), &[(Size::S, Color::Navy, 1)])
        .await;
    let tee_sku = tee.variants[0].sku.clone();
    let cap_sku = cap.variants[0].sku.clone();

    for (product_id, sku, quantity) in [
        (tee.product.id, tee_sku.clone(), 2),
        (cap.product.id, cap_sku.clone(), 1),
    ] {
        app.state
            .services
            .carts
            .add_item(
                user.id,
                AddCartItemInput {
                    product_id,
                    variant_sku: sku,
                    quantity,
                },
            )
            .await
            .unwrap();
    }

    // Stock drops after the items were added
    let catalog = &app.state.services.catalog;
    catalog
        .set_variant_stock(tee.product.id, &tee_sku, 1)
        .await
        .unwrap();
    catalog
        .set_variant_stock(cap.product.id, &cap_sku, 0)
        .await
        .unwrap();

    let err = app
        .state
        .services
        .orders
        .create_order(user.id, checkout(address.id, None))
        .await
        .unwrap_err();

    let ServiceError::InsufficientStock(lines) = &err else {
        panic!("expected InsufficientStock, got {err:?}");
    };
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0].sku, tee_sku);
    assert_eq!((lines[0].available, lines[0].requested), (1, 2));
    assert_eq!(lines[1].sku, cap_sku);
    assert_eq!((lines[1].available, lines[1].requested), (0, 1));
    assert!(err.to_string().contains(&tee_sku));
    assert!(err.to_string().contains(&cap_sku));

    assert_eq!(app.order_count().await, 0);
    let cart = app.state.services.carts.get_cart(user.id).await.unwrap();
    assert_eq!(cart.cart.items.0.len(), 2);
}

#[tokio::test]
async fn test_foreign_address_is_not_found() {
    let app = TestApp::new().await;
    let owner = app.customer().await;
    let other = app.customer().await;
    let foreign_address = app.seed_address(other.id).await;
    let product = app
        .seed_product("Classic Tee", dec!(50.00), &[(Size::M, Color::White, 4)])
        .await;
    let sku = product.variants[0].sku.clone();

    app.state
        .services
        .carts
        .add_item(
            owner.id,
            AddCartItemInput {
                product_id: product.product.id,
                variant_sku: sku.clone(),
                quantity: 1,
            },
        )
        .await
        .unwrap();

    let result = app
        .state
        .services
        .orders
        .create_order(owner.id, checkout(foreign_address.id, None))
        .await;
    assert_matches!(result, Err(ServiceError::NotFound(_)));
    assert_eq!(app.stock_of(product.product.id, &sku).await, 4);
    assert_eq!(app.order_count().await, 0);
}

/// Two lines on the same variant each fit the stock on their own but not
/// together, so the pre-check passes and the second reservation inside the
/// transaction is refused, which is what a lost race looks like.
#[tokio::test]
async fn test_failed_reservation_rolls_back_whole_checkout() {
    let app = TestApp::new().await;
    let user = app.customer().await;
    let address = app.seed_address(user.id).await;
    let product = app
        .seed_product("Classic Tee", dec!(50.00), &[(Size::M, Color::Black, 3)])
        .await;
    let variant = product.variants[0].clone();

    let line = CartLine {
        product_id: product.product.id,
        variant_sku: variant.sku.clone(),
        quantity: 2,
        price_at_add: variant.price,
        product_name: product.product.name.clone(),
        product_image: None,
        variant_size: variant.size,
        variant_color: variant.color,
    };
    let cart_model = app.state.services.carts.get_cart(user.id).await.unwrap().cart;
    let mut active: cart::ActiveModel = cart_model.into();
    active.items = Set(CartLines(vec![line.clone(), line]));
    active.update(&*app.state.db).await.unwrap();

    let err = app
        .state
        .services
        .orders
        .create_order(user.id, checkout(address.id, Some(dec!(10))))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InsufficientStock(ref lines) if lines.len() == 1 && lines[0].available == 1);

    assert_eq!(app.order_count().await, 0);
    assert_eq!(app.stock_of(product.product.id, &variant.sku).await, 3);
    let cart = app.state.services.carts.get_cart(user.id).await.unwrap();
    assert_eq!(cart.cart.items.0.len(), 2);

    // The rolled back attempt did not consume an order number
    app.state.services.carts.clear(user.id).await.unwrap();
    app.state
        .services
        .carts
        .add_item(
            user.id,
            AddCartItemInput {
                product_id: product.product.id,
                variant_sku: variant.sku.clone(),
                quantity: 1,
            },
        )
        .await
        .unwrap();
    let order = app
        .state
        .services
        .orders
        .create_order(user.id, checkout(address.id, None))
        .await
        .unwrap();
    assert!(order.order_number.ends_with("-00001"));
}

#[tokio::test]
async fn test_checkout_never_clears_lines_added_after_reading_cart() {
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
    let add = |sku: &str| AddCartItemInput {
        product_id: product.product.id,
        variant_sku: sku.to_string(),
        quantity: 1,
    };

    carts.add_item(user.id, add(&product.variants[0].sku)).await.unwrap();
    let read_by_checkout = carts.get_cart(user.id).await.unwrap().cart;
    carts.add_item(user.id, add(&product.variants[1].sku)).await.unwrap();

    assert_matches!(
        storefront_api::services::carts::clear_if_unchanged(&*app.state.db, &read_by_checkout)
            .await,
        Err(ServiceError::Conflict(_))
    );
    let current = carts.get_cart(user.id).await.unwrap().cart;
    assert_eq!(current.items.0.len(), 2);

    storefront_api::services::carts::clear_if_unchanged(&*app.state.db, &current)
        .await
        .unwrap();
    assert!(carts.get_cart(user.id).await.unwrap().cart.items.0.is_empty());
}
