#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{self, Body},
    http::{Method, Request},
    response::Response,
    Router,
};
use rust_decimal::Decimal;
use sea_orm::{EntityTrait, PaginatorTrait};
use serde_json::Value;
use storefront_api::{
    auth,
    config::AppConfig,
    db,
    entities::{AddressModel, Color, Order, Role, Size, UserModel},
    events::{self, EventSender},
    services::{
        accounts::{self, NewUser},
        addresses::AddressInput,
        catalog::{CatalogService, CreateProductInput, NewVariantInput, ProductDetail},
    },
    AppState,
};
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

pub const TEST_SECRET: &str = "test_secret_key_for_testing_purposes_only_32chars";
pub const TEST_PASSWORD: &str = "correct-horse-battery";

/// Application state and router backed by a fresh in-memory SQLite database.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        let cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            TEST_SECRET.to_string(),
            3600,
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        Self::with_config(cfg).await
    }

    pub async fn with_config(cfg: AppConfig) -> Self {
        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let (event_tx, event_rx) = mpsc::channel(256);
        let event_task = tokio::spawn(events::process_events(event_rx));
        let state = AppState::new(
            Arc::new(pool),
            Arc::new(cfg),
            Arc::new(EventSender::new(event_tx)),
        );
        let router = storefront_api::app_router(state.clone());

        Self {
            router,
            state,
            _event_task: event_task,
        }
    }

    pub async fn create_user(&self, email: &str, role: Role) -> UserModel {
        let password_hash = auth::hash_password(TEST_PASSWORD).expect("hash test password");
        accounts::insert_user(
            &*self.state.db,
            Uuid::new_v4(),
            NewUser {
                email: email.to_string(),
                password_hash,
                first_name: "Test".to_string(),
                last_name: "User".to_string(),
                phone: None,
                role,
            },
        )
        .await
        .expect("seed user")
    }

    pub async fn customer(&self) -> UserModel {
        self.create_user(&format!("customer-{}@example.com", Uuid::new_v4()), Role::User)
            .await
    }

    pub async fn admin(&self) -> UserModel {
        self.create_user(&format!("admin-{}@example.com", Uuid::new_v4()), Role::Admin)
            .await
    }

    pub fn token_for(&self, user: &UserModel) -> String {
        self.state
            .tokens
            .issue(user)
            .expect("issue test token")
            .access_token
    }

    /// Creates an active product. Each variant is `(size, color, stock)`.
    pub async fn seed_product(
        &self,
        name: &str,
        base_price: Decimal,
        variants: &[(Size, Color, i32)],
    ) -> ProductDetail {
        self.state
            .services
            .catalog
            .create_product(CreateProductInput {
                code: format!("P-{}", Uuid::new_v4().simple()),
                name: name.to_string(),
                description: None,
                base_price,
                images: vec![format!("https://cdn.example.com/{}.jpg", name.replace(' ', "-"))],
                category: Some("shirts".to_string()),
                tags: vec![],
                variants: variants
                    .iter()
                    .map(|(size, color, stock)| NewVariantInput {
                        size: *size,
                        color: *color,
                        stock: *stock,
                        price: None,
                    })
                    .collect(),
            })
            .await
            .expect("seed product")
    }

    pub async fn seed_address(&self, user_id: Uuid) -> AddressModel {
        self.state
            .services
            .addresses
            .create(user_id, address_input("Ana Souza"))
            .await
            .expect("seed address")
    }

    pub async fn stock_of(&self, product_id: Uuid, sku: &str) -> i32 {
        CatalogService::find_variant(&*self.state.db, product_id, sku)
            .await
            .expect("load variant")
            .expect("variant exists")
            .stock
    }

    pub async fn order_count(&self) -> u64 {
        Order::find()
            .count(&*self.state.db)
            .await
            .expect("count orders")
    }

    /// Send a request against the router with an optional bearer token.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);

        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {}", tok));
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

pub fn address_input(full_name: &str) -> AddressInput {
    AddressInput {
        full_name: full_name.to_string(),
        street: "Rua das Flores, 100".to_string(),
        city: "São Paulo".to_string(),
        state: "SP".to_string(),
        zip_code: "01000-000".to_string(),
        country: "BR".to_string(),
        phone: "+55 11 99999-0000".to_string(),
        is_default: false,
    }
}

pub async fn response_json(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}
