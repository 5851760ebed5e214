use crate::{
    auth::{self, AccessToken, AuthError, TokenService},
    entities::{user, Role, User, UserModel, UserStatus},
    errors::ServiceError,
};
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Account service: login, profile lookup and user creation.
#[derive(Clone)]
pub struct AccountService {
    db: Arc<DatabaseConnection>,
    tokens: Arc<TokenService>,
}

impl AccountService {
    pub fn new(db: Arc<DatabaseConnection>, tokens: Arc<TokenService>) -> Self {
        Self { db, tokens }
    }

    /// Verifies credentials and issues an access token. Unknown emails and
    /// wrong passwords produce the same error.
    #[instrument(skip(self, input), fields(email = %input.email))]
    pub async fn login(&self, input: LoginInput) -> Result<AuthSession, ServiceError> {
        input.validate()?;
        let email = normalize_email(&input.email);

        let user = find_by_email(&*self.db, &email)
            .await?
            .filter(|u| auth::verify_password(&input.password, &u.password_hash))
            .ok_or_else(|| {
                warn!("login rejected");
                ServiceError::from(AuthError::InvalidCredentials)
            })?;

        if !user.is_active() {
            return Err(ServiceError::Forbidden("Account is inactive".to_string()));
        }

        info!(user_id = %user.id, "User logged in");
        self.session_for(&user)
    }

    #[instrument(skip(self))]
    pub async fn me(&self, user_id: Uuid) -> Result<UserProfile, ServiceError> {
        User::find_by_id(user_id)
            .one(&*self.db)
            .await?
            .map(UserProfile::from)
            .ok_or_else(|| ServiceError::NotFound(format!("User {} not found", user_id)))
    }

    pub fn session_for(&self, user: &UserModel) -> Result<AuthSession, ServiceError> {
        let token = self.tokens.issue(user)?;
        Ok(AuthSession {
            token,
            user: UserProfile::from(user.clone()),
        })
    }
}

pub async fn find_by_email<C: ConnectionTrait>(
    conn: &C,
    email: &str,
) -> Result<Option<UserModel>, ServiceError> {
    Ok(User::find()
        .filter(user::Column::Email.eq(normalize_email(email)))
        .one(conn)
        .await?)
}

/// Inserts a user row with an already-hashed password. Duplicate emails
/// surface as `Conflict`.
pub async fn insert_user<C: ConnectionTrait>(
    conn: &C,
    id: Uuid,
    new_user: NewUser,
) -> Result<UserModel, ServiceError> {
    let now = Utc::now();
    user::ActiveModel {
        id: Set(id),
        email: Set(normalize_email(&new_user.email)),
        password_hash: Set(new_user.password_hash),
        first_name: Set(new_user.first_name),
        last_name: Set(new_user.last_name),
        phone: Set(new_user.phone),
        role: Set(new_user.role),
        status: Set(UserStatus::Active),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(conn)
    .await
    .map_err(|e| ServiceError::from_db_unique(e, "Email already registered"))
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub role: Role,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
pub struct LoginInput {
    #[validate(email(message = "A valid email is required"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

/// Public view of an account
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserProfile {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub role: Role,
    pub status: UserStatus,
    pub created_at: DateTime<Utc>,
}

impl From<UserModel> for UserProfile {
    fn from(user: UserModel) -> Self {
        Self {
            id: user.id,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            phone: user.phone,
            role: user.role,
            status: user.status,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuthSession {
    #[serde(flatten)]
    pub token: AccessToken,
    pub user: UserProfile,
}
