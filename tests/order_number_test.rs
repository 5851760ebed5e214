mod common;

use std::collections::HashSet;

use chrono::{Datelike, Utc};
use common::TestApp;
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, Set, TransactionTrait};
use storefront_api::{
    entities::{
        order, Color, OrderItems, OrderStatus, PaymentMethod, PaymentStatus,
        ShippingAddressSnapshot, Size,
    },
    services::orders::{
        numbering::next_order_number, CreateGuestOrderInput, GuestOrderItemInput,
        GuestShippingAddress,
    },
};
use uuid::Uuid;

fn guest_input(product_id: Uuid, sku: &str) -> CreateGuestOrderInput {
    CreateGuestOrderInput {
        email: "numbers@example.com".to_string(),
        items: vec![GuestOrderItemInput {
            product_id,
            variant_sku: sku.to_string(),
            quantity: 1,
        }],
        shipping_address: GuestShippingAddress {
            full_name: "Eva Nunes".to_string(),
            street: "Rua XV, 15".to_string(),
            city: "Curitiba".to_string(),
            state: "PR".to_string(),
            zip_code: "80020-000".to_string(),
            country: "BR".to_string(),
            phone: "+55 41 94444-3333".to_string(),
        },
        payment_method: PaymentMethod::Pix,
        shipping_cost: None,
        notes: None,
    }
}

#[tokio::test]
async fn test_numbers_increase_strictly_within_a_year() {
    let app = TestApp::new().await;
    let product = app
        .seed_product("Classic Tee", dec!(50.00), &[(Size::M, Color::Black, 20)])
        .await;
    let sku = product.variants[0].sku.clone();
    let year = Utc::now().year();

    let mut numbers = Vec::new();
    for _ in 0..3 {
        let order = app
            .state
            .services
            .orders
            .create_guest_order(guest_input(product.product.id, &sku))
            .await
            .unwrap();
        numbers.push(order.order_number);
    }

    assert_eq!(
        numbers,
        vec![
            format!("ORD-{year}-00001"),
            format!("ORD-{year}-00002"),
            format!("ORD-{year}-00003"),
        ]
    );
}

#[tokio::test]
async fn test_concurrent_checkouts_get_distinct_numbers() {
    let app = TestApp::new().await;
    let product = app
        .seed_product("Classic Tee", dec!(50.00), &[(Size::M, Color::Black, 20)])
        .await;
    let sku = product.variants[0].sku.clone();

    // Seed the counter so every task takes the increment path
    app.state
        .services
        .orders
        .create_guest_order(guest_input(product.product.id, &sku))
        .await
        .unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let orders = app.state.services.orders.clone();
            let input = guest_input(product.product.id, &sku);
            tokio::spawn(async move { orders.create_guest_order(input).await })
        })
        .collect();

    let mut numbers = HashSet::new();
    for handle in handles {
        let order = handle.await.unwrap().unwrap();
        assert!(numbers.insert(order.order_number));
    }
    assert_eq!(numbers.len(), 8);
    assert_eq!(app.order_count().await, 9);
    assert_eq!(app.stock_of(product.product.id, &sku).await, 11);
}

#[tokio::test]
async fn test_counter_bootstraps_from_existing_orders() {
    let app = TestApp::new().await;
    let year = Utc::now().year();
    let now = Utc::now();

    order::ActiveModel {
        id: Set(Uuid::new_v4()),
        order_number: Set(format!("ORD-{year}-00041")),
        user_id: Set(None),
        items: Set(OrderItems::default()),
        shipping_address: Set(ShippingAddressSnapshot {
            full_name: "Legacy Buyer".to_string(),
            email: "legacy@example.com".to_string(),
            street: "Old Street 1".to_string(),
            city: "Recife".to_string(),
            state: "PE".to_string(),
            zip_code: "50000-000".to_string(),
            country: "BR".to_string(),
            phone: "+55 81 90000-0000".to_string(),
        }),
        subtotal: Set(dec!(0)),
        shipping_cost: Set(dec!(0)),
        total: Set(dec!(0)),
        status: Set(OrderStatus::Delivered),
        payment_method: Set(PaymentMethod::Pix),
        payment_status: Set(PaymentStatus::Paid),
        notes: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(&*app.state.db)
    .await
    .unwrap();

    let product = app
        .seed_product("Classic Tee", dec!(50.00), &[(Size::M, Color::Black, 5)])
        .await;
    let order = app
        .state
        .services
        .orders
        .create_guest_order(guest_input(product.product.id, &product.variants[0].sku))
        .await
        .unwrap();

    assert_eq!(order.order_number, format!("ORD-{year}-00042"));
}

#[tokio::test]
async fn test_sequence_restarts_each_year() {
    let app = TestApp::new().await;
    let db = &*app.state.db;

    let txn = db.begin().await.unwrap();
    assert_eq!(next_order_number(&txn, 2030).await.unwrap(), "ORD-2030-00001");
    assert_eq!(next_order_number(&txn, 2030).await.unwrap(), "ORD-2030-00002");
    assert_eq!(next_order_number(&txn, 2031).await.unwrap(), "ORD-2031-00001");
    txn.commit().await.unwrap();

    // Committed counters persist
    assert_eq!(next_order_number(db, 2030).await.unwrap(), "ORD-2030-00003");
}

#[tokio::test]
async fn test_rolled_back_allocation_is_reused() {
    let app = TestApp::new().await;
    let db = &*app.state.db;

    let txn = db.begin().await.unwrap();
    assert_eq!(next_order_number(&txn, 2029).await.unwrap(), "ORD-2029-00001");
    txn.rollback().await.unwrap();

    assert_eq!(next_order_number(db, 2029).await.unwrap(), "ORD-2029-00001");
}
