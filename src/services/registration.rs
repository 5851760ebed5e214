use crate::{
    auth,
    entities::{Role, UserModel},
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        accounts::{self, NewUser},
        addresses::{AddressInput, AddressService},
        orders::OrderService,
    },
};
use sea_orm::{DatabaseConnection, TransactionTrait};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Account creation, optionally claiming a guest order.
///
/// The whole registration is one transaction: the email check, the link
/// precondition, the user insert, the order link and the default address
/// created from the order's shipping snapshot either all commit or none do.
/// A failed link therefore never leaves an account behind.
#[derive(Clone)]
pub struct RegistrationService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl RegistrationService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    #[instrument(skip(self, input), fields(email = %input.email, linked_order = ?input.linked_guest_order_id))]
    pub async fn register(&self, input: RegisterInput) -> Result<Registration, ServiceError> {
        input.validate()?;
        let password_hash = auth::hash_password(&input.password)?;
        let user_id = Uuid::new_v4();

        let txn = self.db.begin().await?;

        if accounts::find_by_email(&txn, &input.email).await?.is_some() {
            return Err(ServiceError::Conflict(
                "Email already registered".to_string(),
            ));
        }
        if let Some(order_id) = input.linked_guest_order_id {
            OrderService::ensure_linkable(&txn, order_id, user_id).await?;
        }

        let user = accounts::insert_user(
            &txn,
            user_id,
            NewUser {
                email: input.email.clone(),
                password_hash,
                first_name: input.first_name.clone(),
                last_name: input.last_name.clone(),
                phone: input.phone.clone(),
                role: Role::User,
            },
        )
        .await?;

        let linked_order_id = match input.linked_guest_order_id {
            Some(order_id) => {
                let snapshot = OrderService::link_with(&txn, order_id, user_id)
                    .await?
                    .snapshot;
                AddressService::create_with(
                    &txn,
                    user_id,
                    AddressInput {
                        full_name: snapshot.full_name,
                        street: snapshot.street,
                        city: snapshot.city,
                        state: snapshot.state,
                        zip_code: snapshot.zip_code,
                        country: snapshot.country,
                        phone: snapshot.phone,
                        is_default: true,
                    },
                )
                .await?;
                Some(order_id)
            }
            None => None,
        };

        txn.commit().await?;

        info!(%user_id, "Registered user");
        self.event_sender
            .send_or_log(Event::UserRegistered(user_id))
            .await;
        if let Some(order_id) = linked_order_id {
            self.event_sender
                .send_or_log(Event::GuestOrderLinked { order_id, user_id })
                .await;
        }

        Ok(Registration {
            user,
            linked_order_id,
        })
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
pub struct RegisterInput {
    #[validate(email(message = "A valid email is required"))]
    pub email: String,
    #[validate(length(min = 8, max = 128, message = "Password must be between 8 and 128 characters"))]
    pub password: String,
    #[validate(length(min = 1, max = 100, message = "First name is required"))]
    pub first_name: String,
    #[validate(length(min = 1, max = 100, message = "Last name is required"))]
    pub last_name: String,
    pub phone: Option<String>,
    pub linked_guest_order_id: Option<Uuid>,
}

#[derive(Debug, Clone)]
pub struct Registration {
    pub user: UserModel,
    pub linked_order_id: Option<Uuid>,
}
