//! Account registration and claiming guest orders.

mod common;

use assert_matches::assert_matches;
use common::{TestApp, TEST_PASSWORD};
use rust_decimal_macros::dec;
use sea_orm::{EntityTrait, PaginatorTrait};
use storefront_api::{
    entities::{Color, OrderModel, PaymentMethod, Role, Size, User},
    errors::ServiceError,
    services::{
        accounts::LoginInput,
        orders::{CreateGuestOrderInput, GuestOrderItemInput, GuestShippingAddress},
        registration::RegisterInput,
        Caller,
    },
};
use uuid::Uuid;

fn register_input(email: &str, linked_guest_order_id: Option<Uuid>) -> RegisterInput {
    RegisterInput {
        email: email.to_string(),
        password: TEST_PASSWORD.to_string(),
        first_name: "Diana".to_string(),
        last_name: "Prado".to_string(),
        phone: Some("+55 21 95555-4444".to_string()),
        linked_guest_order_id,
    }
}

async fn guest_order(app: &TestApp) -> OrderModel {
    let product = app
        .seed_product("Running Shorts", dec!(45.00), &[(Size::M, Color::Blue, 5)])
        .await;
    app.state
        .services
        .orders
        .create_guest_order(CreateGuestOrderInput {
            email: "diana@example.com".to_string(),
            items: vec![GuestOrderItemInput {
                product_id: product.product.id,
                variant_sku: product.variants[0].sku.clone(),
                quantity: 1,
            }],
            shipping_address: GuestShippingAddress {
                full_name: "Diana Prado".to_string(),
                street: "Rua do Catete, 12".to_string(),
                city: "Rio de Janeiro".to_string(),
                state: "RJ".to_string(),
                zip_code: "22220-000".to_string(),
                country: "BR".to_string(),
                phone: "+55 21 95555-4444".to_string(),
            },
            payment_method: PaymentMethod::Pix,
            shipping_cost: None,
            notes: None,
        })
        .await
        .expect("guest order")
}

async fn user_count(app: &TestApp) -> u64 {
    User::find().count(&*app.state.db).await.unwrap()
}

#[tokio::test]
async fn test_register_without_guest_order() {
    let app = TestApp::new().await;

    let registration = app
        .state
        .services
        .registration
        .register(register_input("New.User@Example.com", None))
        .await
        .unwrap();

    assert_eq!(registration.user.email, "new.user@example.com");
    assert_eq!(registration.user.role, Role::User);
    assert_eq!(registration.linked_order_id, None);
    assert_ne!(registration.user.password_hash, TEST_PASSWORD);

    let addresses = app
        .state
        .services
        .addresses
        .list(registration.user.id)
        .await
        .unwrap();
    assert!(addresses.is_empty());

    let session = app
        .state
        .services
        .accounts
        .login(LoginInput {
            email: "new.user@example.com".to_string(),
            password: TEST_PASSWORD.to_string(),
        })
        .await
        .unwrap();
    assert_eq!(session.user.id, registration.user.id);
    assert_eq!(session.token.token_type, "Bearer");
}

#[tokio::test]
async fn test_registration_claims_guest_order_and_copies_address() {
    let app = TestApp::new().await;
    let order = guest_order(&app).await;

    let registration = app
        .state
        .services
        .registration
        .register(register_input("diana@example.com", Some(order.id)))
        .await
        .unwrap();
    let user_id = registration.user.id;
    assert_eq!(registration.linked_order_id, Some(order.id));

    let linked = app
        .state
        .services
        .orders
        .get_order(order.id, Caller::new(user_id, Role::User))
        .await
        .unwrap();
    assert_eq!(linked.user_id, Some(user_id));

    let address = app
        .state
        .services
        .addresses
        .get_default(user_id)
        .await
        .unwrap();
    assert!(address.is_default);
    assert_eq!(address.full_name, "Diana Prado");
    assert_eq!(address.street, "Rua do Catete, 12");
    assert_eq!(address.city, "Rio de Janeiro");
    assert_eq!(address.zip_code, "22220-000");
}

#[tokio::test]
async fn test_order_already_owned_blocks_registration() {
    let app = TestApp::new().await;
    let order = guest_order(&app).await;

    app.state
        .services
        .registration
        .register(register_input("first@example.com", Some(order.id)))
        .await
        .unwrap();
    let before = user_count(&app).await;

    let second = app
        .state
        .services
        .registration
        .register(register_input("second@example.com", Some(order.id)))
        .await;
    assert_matches!(second, Err(ServiceError::AlreadyLinked(id)) if id == order.id);

    // No account was left behind
    assert_eq!(user_count(&app).await, before);
    let orphan = app
        .state
        .services
        .accounts
        .login(LoginInput {
            email: "second@example.com".to_string(),
            password: TEST_PASSWORD.to_string(),
        })
        .await;
    assert_matches!(orphan, Err(ServiceError::Unauthorized(_)));
}

#[tokio::test]
async fn test_unknown_guest_order_blocks_registration() {
    let app = TestApp::new().await;

    let result = app
        .state
        .services
        .registration
        .register(register_input("ghost@example.com", Some(Uuid::new_v4())))
        .await;
    assert_matches!(result, Err(ServiceError::NotFound(_)));
    assert_eq!(user_count(&app).await, 0);
}

#[tokio::test]
async fn test_duplicate_email_is_conflict() {
    let app = TestApp::new().await;
    let existing = app.customer().await;

    let result = app
        .state
        .services
        .registration
        .register(register_input(&existing.email.to_uppercase(), None))
        .await;
    assert_matches!(result, Err(ServiceError::Conflict(_)));
}

#[tokio::test]
async fn test_weak_password_is_rejected() {
    let app = TestApp::new().await;
    let mut input = register_input("weak@example.com", None);
    input.password = "short".to_string();

    assert_matches!(
        app.state.services.registration.register(input).await,
        Err(ServiceError::ValidationError(_))
    );
}

#[tokio::test]
async fn test_link_guest_order_is_idempotent_for_same_user() {
    let app = TestApp::new().await;
    let order = guest_order(&app).await;
    let owner = app.customer().await;
    let other = app.customer().await;
    let orders = &app.state.services.orders;

    let snapshot = orders.link_guest_order(order.id, owner.id).await.unwrap();
    assert_eq!(snapshot.full_name, "Diana Prado");
    assert_eq!(snapshot.email, "diana@example.com");

    let again = orders.link_guest_order(order.id, owner.id).await.unwrap();
    assert_eq!(again, snapshot);

    assert_matches!(
        orders.link_guest_order(order.id, other.id).await,
        Err(ServiceError::AlreadyLinked(_))
    );
    assert_matches!(
        orders.link_guest_order(Uuid::new_v4(), owner.id).await,
        Err(ServiceError::NotFound(_))
    );

    let linked = orders
        .get_order(order.id, Caller::new(owner.id, Role::User))
        .await
        .unwrap();
    assert_eq!(linked.user_id, Some(owner.id));
}

#[tokio::test]
async fn test_repeated_link_publishes_one_event() {
    let app = TestApp::new().await;
    let order = guest_order(&app).await;
    let owner = app.customer().await;

    let (tx, mut rx) = tokio::sync::mpsc::channel(8);
    let orders = storefront_api::services::orders::OrderService::new(
        app.state.db.clone(),
        std::sync::Arc::new(storefront_api::events::EventSender::new(tx)),
        app.state.config.clone(),
    );

    orders.link_guest_order(order.id, owner.id).await.unwrap();
    orders.link_guest_order(order.id, owner.id).await.unwrap();
    drop(orders);

    let mut linked = Vec::new();
    while let Some(event) = rx.recv().await {
        linked.push(event);
    }
    assert_eq!(
        linked,
        vec![storefront_api::events::Event::GuestOrderLinked {
            order_id: order.id,
            user_id: owner.id,
        }]
    );
}

#[tokio::test]
async fn test_link_guest_order_over_http() {
    let app = TestApp::new().await;
    let order = guest_order(&app).await;
    let owner = app.customer().await;
    let other = app.customer().await;
    let uri = format!("/api/v1/orders/{}/link", order.id);

    let claimed = app
        .request(
            axum::http::Method::PATCH,
            &uri,
            None,
            Some(&app.token_for(&owner)),
        )
        .await;
    assert_eq!(claimed.status(), axum::http::StatusCode::OK);
    assert_eq!(
        common::response_json(claimed).await["data"]["user_id"],
        owner.id.to_string()
    );

    let stolen = app
        .request(
            axum::http::Method::PATCH,
            &uri,
            None,
            Some(&app.token_for(&other)),
        )
        .await;
    assert_eq!(stolen.status(), axum::http::StatusCode::CONFLICT);
}
