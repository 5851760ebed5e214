pub mod addresses;
pub mod auth;
pub mod carts;
pub mod common;
pub mod health;
pub mod orders;
pub mod products;

use crate::{
    auth::TokenService,
    config::AppConfig,
    db::DbPool,
    events::EventSender,
    services::{
        accounts::AccountService, addresses::AddressService, carts::CartService,
        catalog::CatalogService, orders::OrderService, registration::RegistrationService,
    },
};
use std::sync::Arc;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub catalog: Arc<CatalogService>,
    pub carts: Arc<CartService>,
    pub addresses: Arc<AddressService>,
    pub orders: Arc<OrderService>,
    pub registration: Arc<RegistrationService>,
    pub accounts: Arc<AccountService>,
}

impl AppServices {
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        config: Arc<AppConfig>,
        tokens: Arc<TokenService>,
    ) -> Self {
        Self {
            catalog: Arc::new(CatalogService::new(db_pool.clone(), event_sender.clone())),
            carts: Arc::new(CartService::new(db_pool.clone())),
            addresses: Arc::new(AddressService::new(db_pool.clone())),
            orders: Arc::new(OrderService::new(
                db_pool.clone(),
                event_sender.clone(),
                config,
            )),
            registration: Arc::new(RegistrationService::new(db_pool.clone(), event_sender)),
            accounts: Arc::new(AccountService::new(db_pool, tokens)),
        }
    }
}
