use crate::{
    auth::AuthUser,
    errors::ServiceError,
    handlers::common::{created_response, success_response},
    services::{
        accounts::{AuthSession, LoginInput, UserProfile},
        registration::RegisterInput,
    },
    ApiResponse, AppState,
};
use axum::{
    extract::State,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/me", get(me))
}

/// Session issued on registration, with the claimed guest order if any
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RegisterResponse {
    #[serde(flatten)]
    pub session: AuthSession,
    pub linked_order_id: Option<Uuid>,
}

/// Register a new account
///
/// When `linked_guest_order_id` is present the guest order is attached to the
/// new account and its shipping address becomes the default address. If the
/// order cannot be linked no account is created.
#[utoipa::path(
    post,
    path = "/api/v1/auth/register",
    tag = "auth",
    request_body = RegisterInput,
    responses(
        (status = 201, description = "Account created", body = ApiResponse<RegisterResponse>),
        (status = 400, description = "Invalid input", body = crate::errors::ErrorResponse),
        (status = 404, description = "Guest order not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Email taken or order already linked", body = crate::errors::ErrorResponse),
    )
)]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let registration = state.services.registration.register(payload).await?;
    let session = state.services.accounts.session_for(&registration.user)?;

    Ok(created_response(RegisterResponse {
        session,
        linked_order_id: registration.linked_order_id,
    }))
}

/// Exchange credentials for an access token
#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    tag = "auth",
    request_body = LoginInput,
    responses(
        (status = 200, description = "Authenticated", body = ApiResponse<AuthSession>),
        (status = 401, description = "Invalid credentials", body = crate::errors::ErrorResponse),
        (status = 403, description = "Account inactive", body = crate::errors::ErrorResponse),
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let session = state.services.accounts.login(payload).await?;
    Ok(success_response(session))
}

/// Current account
#[utoipa::path(
    get,
    path = "/api/v1/auth/me",
    tag = "auth",
    responses(
        (status = 200, description = "Current account", body = ApiResponse<UserProfile>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn me(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> Result<Json<ApiResponse<UserProfile>>, ServiceError> {
    let profile = state.services.accounts.me(auth_user.user_id).await?;
    Ok(Json(ApiResponse::success(profile)))
}
