use crate::{
    entities::{address, Address, AddressModel},
    errors::ServiceError,
    models::AddressBook,
};
use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, ModelTrait, QueryFilter, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Address service. The [`AddressBook`] aggregate decides which address
/// holds the default flag; this service only applies its decisions.
#[derive(Clone)]
pub struct AddressService {
    db: Arc<DatabaseConnection>,
}

impl AddressService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[instrument(skip(self, input))]
    pub async fn create(
        &self,
        user_id: Uuid,
        input: AddressInput,
    ) -> Result<AddressModel, ServiceError> {
        input.validate()?;
        let txn = self.db.begin().await?;
        let created = Self::create_with(&txn, user_id, input).await?;
        txn.commit().await?;
        info!(%user_id, address_id = %created.id, "Created address");
        Ok(created)
    }

    /// Inserts an address on an existing connection or transaction. The
    /// first address of a user always becomes the default.
    pub async fn create_with<C: ConnectionTrait>(
        conn: &C,
        user_id: Uuid,
        input: AddressInput,
    ) -> Result<AddressModel, ServiceError> {
        let book = load_book(conn, user_id).await?;
        let is_default = book.new_address_is_default(input.is_default);

        let id = Uuid::new_v4();
        let now = Utc::now();
        let created = address::ActiveModel {
            id: Set(id),
            user_id: Set(user_id),
            full_name: Set(input.full_name),
            street: Set(input.street),
            city: Set(input.city),
            state: Set(input.state),
            zip_code: Set(input.zip_code),
            country: Set(input.country),
            phone: Set(input.phone),
            is_default: Set(is_default),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(conn)
        .await?;

        if is_default {
            clear_defaults(conn, book.defaults_to_clear(id)).await?;
        }
        Ok(created)
    }

    /// Default first, then newest.
    #[instrument(skip(self))]
    pub async fn list(&self, user_id: Uuid) -> Result<Vec<AddressModel>, ServiceError> {
        Ok(load_book(&*self.db, user_id).await?.into_sorted())
    }

    #[instrument(skip(self))]
    pub async fn get(&self, id: Uuid, user_id: Uuid) -> Result<AddressModel, ServiceError> {
        find_owned(&*self.db, id, user_id).await
    }

    #[instrument(skip(self))]
    pub async fn get_default(&self, user_id: Uuid) -> Result<AddressModel, ServiceError> {
        load_book(&*self.db, user_id)
            .await?
            .default_address()
            .cloned()
            .ok_or_else(|| ServiceError::NotFound("No default address".to_string()))
    }

    #[instrument(skip(self, input))]
    pub async fn update(
        &self,
        id: Uuid,
        user_id: Uuid,
        input: UpdateAddressInput,
    ) -> Result<AddressModel, ServiceError> {
        input.validate()?;
        let txn = self.db.begin().await?;
        let book = load_book(&txn, user_id).await?;
        let current = book.get(id)?.clone();
        let make_default = input.is_default == Some(true) && !current.is_default;

        let mut active: address::ActiveModel = current.into();
        if let Some(full_name) = input.full_name {
            active.full_name = Set(full_name);
        }
        if let Some(street) = input.street {
            active.street = Set(street);
        }
        if let Some(city) = input.city {
            active.city = Set(city);
        }
        if let Some(state) = input.state {
            active.state = Set(state);
        }
        if let Some(zip_code) = input.zip_code {
            active.zip_code = Set(zip_code);
        }
        if let Some(country) = input.country {
            active.country = Set(country);
        }
        if let Some(phone) = input.phone {
            active.phone = Set(phone);
        }
        if make_default {
            active.is_default = Set(true);
        }
        active.updated_at = Set(Utc::now());
        let updated = active.update(&txn).await?;

        if make_default {
            clear_defaults(&txn, book.defaults_to_clear(id)).await?;
        }
        txn.commit().await?;
        Ok(updated)
    }

    /// Deletes an address. The last address cannot be deleted, and deleting
    /// the default promotes the newest remaining address.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: Uuid, user_id: Uuid) -> Result<(), ServiceError> {
        let txn = self.db.begin().await?;
        let book = load_book(&txn, user_id).await?;
        let plan = book.plan_delete(id)?;

        book.get(plan.remove)?.clone().delete(&txn).await?;
        if let Some(promote) = plan.promote {
            Address::update_many()
                .col_expr(address::Column::IsDefault, Expr::value(true))
                .col_expr(address::Column::UpdatedAt, Expr::value(Utc::now()))
                .filter(address::Column::Id.eq(promote))
                .exec(&txn)
                .await?;
        }
        txn.commit().await?;

        info!(%user_id, address_id = %id, promoted = ?plan.promote, "Deleted address");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn set_default(&self, id: Uuid, user_id: Uuid) -> Result<AddressModel, ServiceError> {
        let txn = self.db.begin().await?;
        let book = load_book(&txn, user_id).await?;
        let target = book.get(id)?.clone();

        clear_defaults(&txn, book.defaults_to_clear(id)).await?;
        let updated = if target.is_default {
            target
        } else {
            let mut active: address::ActiveModel = target.into();
            active.is_default = Set(true);
            active.updated_at = Set(Utc::now());
            active.update(&txn).await?
        };
        txn.commit().await?;
        Ok(updated)
    }
}

async fn load_book<C: ConnectionTrait>(conn: &C, user_id: Uuid) -> Result<AddressBook, ServiceError> {
    let entries = Address::find()
        .filter(address::Column::UserId.eq(user_id))
        .all(conn)
        .await?;
    Ok(AddressBook::new(entries))
}

/// Looks an address up by id, scoped to its owner.
pub(crate) async fn find_owned<C: ConnectionTrait>(
    conn: &C,
    id: Uuid,
    user_id: Uuid,
) -> Result<AddressModel, ServiceError> {
    Address::find_by_id(id)
        .filter(address::Column::UserId.eq(user_id))
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Address {} not found", id)))
}

async fn clear_defaults<C: ConnectionTrait>(conn: &C, ids: Vec<Uuid>) -> Result<(), ServiceError> {
    if ids.is_empty() {
        return Ok(());
    }
    Address::update_many()
        .col_expr(address::Column::IsDefault, Expr::value(false))
        .col_expr(address::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(address::Column::Id.is_in(ids))
        .exec(conn)
        .await?;
    Ok(())
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
pub struct AddressInput {
    #[validate(length(min = 1, max = 255, message = "Full name is required"))]
    pub full_name: String,
    #[validate(length(min = 1, max = 255, message = "Street is required"))]
    pub street: String,
    #[validate(length(min = 1, max = 100, message = "City is required"))]
    pub city: String,
    #[validate(length(min = 1, max = 100, message = "State is required"))]
    pub state: String,
    #[validate(length(min = 1, max = 20, message = "Zip code is required"))]
    pub zip_code: String,
    #[validate(length(min = 1, max = 100, message = "Country is required"))]
    pub country: String,
    #[validate(length(min = 1, max = 32, message = "Phone is required"))]
    pub phone: String,
    #[serde(default)]
    pub is_default: bool,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate, ToSchema)]
pub struct UpdateAddressInput {
    #[validate(length(min = 1, max = 255))]
    pub full_name: Option<String>,
    #[validate(length(min = 1, max = 255))]
    pub street: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub city: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub state: Option<String>,
    #[validate(length(min = 1, max = 20))]
    pub zip_code: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub country: Option<String>,
    #[validate(length(min = 1, max = 32))]
    pub phone: Option<String>,
    pub is_default: Option<bool>,
}
