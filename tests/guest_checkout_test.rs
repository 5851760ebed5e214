mod common;

use assert_matches::assert_matches;
use common::TestApp;
use rust_decimal_macros::dec;
use storefront_api::{
    entities::{Color, OrderStatus, PaymentMethod, PaymentStatus, Size},
    errors::ServiceError,
    services::{
        catalog::NewVariantInput,
        orders::{CreateGuestOrderInput, GuestOrderItemInput, GuestShippingAddress},
    },
};
use uuid::Uuid;

fn shipping_address() -> GuestShippingAddress {
    GuestShippingAddress {
        full_name: "Bruno Lima".to_string(),
        street: "Av. Paulista, 1000".to_string(),
        city: "São Paulo".to_string(),
        state: "SP".to_string(),
        zip_code: "01310-100".to_string(),
        country: "BR".to_string(),
        phone: "+55 11 98888-7777".to_string(),
    }
}

fn guest_order(items: Vec<GuestOrderItemInput>) -> CreateGuestOrderInput {
    CreateGuestOrderInput {
        email: "Guest.Buyer@Example.com".to_string(),
        items,
        shipping_address: shipping_address(),
        payment_method: PaymentMethod::CreditCard,
        shipping_cost: Some(dec!(15.00)),
        notes: Some("leave at the door".to_string()),
    }
}

fn line(product_id: Uuid, sku: &str, quantity: i32) -> GuestOrderItemInput {
    GuestOrderItemInput {
        product_id,
        variant_sku: sku.to_string(),
        quantity,
    }
}

#[tokio::test]
async fn test_guest_checkout_creates_unowned_order() {
    let app = TestApp::new().await;
    let product = app
        .seed_product("Oversized Tee", dec!(50.00), &[(Size::G, Color::White, 6)])
        .await;
    let sku = product.variants[0].sku.clone();

    let order = app
        .state
        .services
        .orders
        .create_guest_order(guest_order(vec![line(product.product.id, &sku, 2)]))
        .await
        .unwrap();

    assert!(order.is_guest());
    assert_eq!(order.user_id, None);
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.payment_status, PaymentStatus::Pending);
    assert_eq!(order.payment_method, PaymentMethod::CreditCard);
    assert_eq!(order.subtotal, dec!(100.00));
    assert_eq!(order.total, dec!(115.00));
    assert_eq!(order.notes.as_deref(), Some("leave at the door"));
    assert_eq!(order.shipping_address.email, "guest.buyer@example.com");
    assert_eq!(order.shipping_address.full_name, "Bruno Lima");
    assert_eq!(order.shipping_address.zip_code, "01310-100");

    assert_eq!(app.stock_of(product.product.id, &sku).await, 4);
}

#[tokio::test]
async fn test_guest_items_are_priced_at_base_price() {
    let app = TestApp::new().await;
    let product = app
        .seed_product("Premium Polo", dec!(50.00), &[(Size::M, Color::Navy, 5)])
        .await;
    let premium = app
        .state
        .services
        .catalog
        .add_variant(
            product.product.id,
            NewVariantInput {
                size: Size::Xxl,
                color: Color::Red,
                stock: 5,
                price: Some(dec!(65.00)),
            },
        )
        .await
        .unwrap();
    assert_eq!(premium.price, dec!(65.00));

    let order = app
        .state
        .services
        .orders
        .create_guest_order(guest_order(vec![line(product.product.id, &premium.sku, 1)]))
        .await
        .unwrap();

    assert_eq!(order.items.0[0].price, dec!(50.00));
    assert_eq!(order.items.0[0].variant_size, Size::Xxl);
    assert_eq!(order.items.0[0].variant_color, Color::Red);
    assert_eq!(order.subtotal, dec!(50.00));
}

#[tokio::test]
async fn test_duplicate_guest_lines_are_merged() {
    let app = TestApp::new().await;
    let product = app
        .seed_product("Cargo Shorts", dec!(40.00), &[(Size::S, Color::Gray, 5)])
        .await;
    let sku = product.variants[0].sku.clone();

    let order = app
        .state
        .services
        .orders
        .create_guest_order(guest_order(vec![
            line(product.product.id, &sku, 1),
            line(product.product.id, &sku, 2),
        ]))
        .await
        .unwrap();

    assert_eq!(order.items.0.len(), 1);
    assert_eq!(order.items.0[0].quantity, 3);
    assert_eq!(order.subtotal, dec!(120.00));
    assert_eq!(app.stock_of(product.product.id, &sku).await, 2);
}

#[tokio::test]
async fn test_merged_guest_quantity_overflow_is_rejected() {
    let app = TestApp::new().await;
    let product = app
        .seed_product("Cargo Shorts", dec!(40.00), &[(Size::S, Color::Gray, 5)])
        .await;
    let sku = product.variants[0].sku.clone();

    assert_matches!(
        app.state
            .services
            .orders
            .create_guest_order(guest_order(vec![
                line(product.product.id, &sku, i32::MAX),
                line(product.product.id, &sku, i32::MAX),
            ]))
            .await,
        Err(ServiceError::ValidationError(_))
    );
    assert_eq!(app.order_count().await, 0);
    assert_eq!(app.stock_of(product.product.id, &sku).await, 5);
}

#[tokio::test]
async fn test_out_of_stock_guest_order_is_rejected_without_writes() {
    let app = TestApp::new().await;
    let sold_out = app
        .seed_product("Limited Jacket", dec!(200.00), &[(Size::M, Color::Black, 0)])
        .await;
    let in_stock = app
        .seed_product("Wool Beanie", dec!(25.00), &[(Size::S, Color::Red, 10)])
        .await;
    let sold_out_sku = sold_out.variants[0].sku.clone();
    let beanie_sku = in_stock.variants[0].sku.clone();

    let err = app
        .state
        .services
        .orders
        .create_guest_order(guest_order(vec![
            line(in_stock.product.id, &beanie_sku, 1),
            line(sold_out.product.id, &sold_out_sku, 1),
        ]))
        .await
        .unwrap_err();

    let ServiceError::InsufficientStock(lines) = &err else {
        panic!("expected InsufficientStock, got {err:?}");
    };
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].sku, sold_out_sku);
    assert_eq!(lines[0].name, "Limited Jacket");
    assert_eq!(lines[0].available, 0);
    assert_eq!(lines[0].requested, 1);

    assert_eq!(app.order_count().await, 0);
    assert_eq!(app.stock_of(in_stock.product.id, &beanie_sku).await, 10);
}

#[tokio::test]
async fn test_unknown_product_or_variant_is_not_found() {
    let app = TestApp::new().await;
    let product = app
        .seed_product("Denim Jacket", dec!(150.00), &[(Size::M, Color::Blue, 3)])
        .await;

    let missing_product = app
        .state
        .services
        .orders
        .create_guest_order(guest_order(vec![line(Uuid::new_v4(), "NOPE-M-BLK-0000", 1)]))
        .await;
    assert_matches!(missing_product, Err(ServiceError::NotFound(_)));

    let missing_variant = app
        .state
        .services
        .orders
        .create_guest_order(guest_order(vec![line(
            product.product.id,
            "DEJA-XS-WHT-0000",
            1,
        )]))
        .await;
    assert_matches!(missing_variant, Err(ServiceError::NotFound(_)));
    assert_eq!(app.order_count().await, 0);
}

#[tokio::test]
async fn test_malformed_guest_input_is_rejected() {
    let app = TestApp::new().await;
    let product = app
        .seed_product("Linen Shirt", dec!(90.00), &[(Size::M, Color::White, 3)])
        .await;
    let sku = product.variants[0].sku.clone();

    let no_items = app
        .state
        .services
        .orders
        .create_guest_order(guest_order(vec![]))
        .await;
    assert_matches!(no_items, Err(ServiceError::ValidationError(_)));

    let mut bad_email = guest_order(vec![line(product.product.id, &sku, 1)]);
    bad_email.email = "not-an-email".to_string();
    assert_matches!(
        app.state.services.orders.create_guest_order(bad_email).await,
        Err(ServiceError::ValidationError(_))
    );

    let zero_quantity = guest_order(vec![line(product.product.id, &sku, 0)]);
    assert_matches!(
        app.state
            .services
            .orders
            .create_guest_order(zero_quantity)
            .await,
        Err(ServiceError::ValidationError(_))
    );

    let mut no_street = guest_order(vec![line(product.product.id, &sku, 1)]);
    no_street.shipping_address.street = String::new();
    assert_matches!(
        app.state.services.orders.create_guest_order(no_street).await,
        Err(ServiceError::ValidationError(_))
    );

    assert_eq!(app.order_count().await, 0);
    assert_eq!(app.stock_of(product.product.id, &sku).await, 3);
}

#[tokio::test]
async fn test_guest_and_registered_orders_share_one_sequence() {
    let app = TestApp::new().await;
    let product = app
        .seed_product("Canvas Tote", dec!(35.00), &[(Size::M, Color::Gray, 10)])
        .await;
    let sku = product.variants[0].sku.clone();

    let first = app
        .state
        .services
        .orders
        .create_guest_order(guest_order(vec![line(product.product.id, &sku, 1)]))
        .await
        .unwrap();
    let second = app
        .state
        .services
        .orders
        .create_guest_order(guest_order(vec![line(product.product.id, &sku, 1)]))
        .await
        .unwrap();

    assert!(first.order_number.ends_with("-00001"));
    assert!(second.order_number.ends_with("-00002"));
}
