use crate::{
    auth::AuthUser,
    entities::AddressModel,
    errors::ServiceError,
    handlers::common::{created_response, no_content_response},
    services::addresses::{AddressInput, UpdateAddressInput},
    ApiResponse, AppState,
};
use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::{get, patch},
    Json, Router,
};
use uuid::Uuid;

pub fn address_routes() -> Router<AppState> {
    Router::new()
        .route("/addresses", get(list_addresses).post(create_address))
        .route("/addresses/default", get(get_default_address))
        .route(
            "/addresses/:id",
            get(get_address).patch(update_address).delete(delete_address),
        )
        .route("/addresses/:id/set-default", patch(set_default_address))
}

/// List the caller's addresses, default first
#[utoipa::path(
    get,
    path = "/api/v1/addresses",
    tag = "addresses",
    responses(
        (status = 200, description = "Addresses", body = ApiResponse<Vec<AddressModel>>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn list_addresses(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> Result<Json<ApiResponse<Vec<AddressModel>>>, ServiceError> {
    let addresses = state.services.addresses.list(auth_user.user_id).await?;
    Ok(Json(ApiResponse::success(addresses)))
}

#[utoipa::path(
    get,
    path = "/api/v1/addresses/default",
    tag = "addresses",
    responses(
        (status = 200, description = "Default address", body = ApiResponse<AddressModel>),
        (status = 404, description = "No address saved yet", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn get_default_address(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> Result<Json<ApiResponse<AddressModel>>, ServiceError> {
    let address = state
        .services
        .addresses
        .get_default(auth_user.user_id)
        .await?;
    Ok(Json(ApiResponse::success(address)))
}

/// Create an address; the first one is always the default
#[utoipa::path(
    post,
    path = "/api/v1/addresses",
    tag = "addresses",
    request_body = AddressInput,
    responses(
        (status = 201, description = "Address created", body = ApiResponse<AddressModel>),
        (status = 400, description = "Invalid input", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn create_address(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(payload): Json<AddressInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let address = state
        .services
        .addresses
        .create(auth_user.user_id, payload)
        .await?;
    Ok(created_response(address))
}

#[utoipa::path(
    get,
    path = "/api/v1/addresses/{id}",
    tag = "addresses",
    params(("id" = Uuid, Path, description = "Address ID")),
    responses(
        (status = 200, description = "Address found", body = ApiResponse<AddressModel>),
        (status = 404, description = "Address not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn get_address(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<AddressModel>>, ServiceError> {
    let address = state.services.addresses.get(id, auth_user.user_id).await?;
    Ok(Json(ApiResponse::success(address)))
}

#[utoipa::path(
    patch,
    path = "/api/v1/addresses/{id}",
    tag = "addresses",
    params(("id" = Uuid, Path, description = "Address ID")),
    request_body = UpdateAddressInput,
    responses(
        (status = 200, description = "Address updated", body = ApiResponse<AddressModel>),
        (status = 404, description = "Address not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn update_address(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateAddressInput>,
) -> Result<Json<ApiResponse<AddressModel>>, ServiceError> {
    let address = state
        .services
        .addresses
        .update(id, auth_user.user_id, payload)
        .await?;
    Ok(Json(ApiResponse::success(address)))
}

/// Delete an address; the last remaining address cannot be deleted
#[utoipa::path(
    delete,
    path = "/api/v1/addresses/{id}",
    tag = "addresses",
    params(("id" = Uuid, Path, description = "Address ID")),
    responses(
        (status = 204, description = "Address deleted"),
        (status = 400, description = "Last address", body = crate::errors::ErrorResponse),
        (status = 404, description = "Address not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn delete_address(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    state
        .services
        .addresses
        .delete(id, auth_user.user_id)
        .await?;
    Ok(no_content_response())
}

#[utoipa::path(
    patch,
    path = "/api/v1/addresses/{id}/set-default",
    tag = "addresses",
    params(("id" = Uuid, Path, description = "Address ID")),
    responses(
        (status = 200, description = "Default address changed", body = ApiResponse<AddressModel>),
        (status = 404, description = "Address not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn set_default_address(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<AddressModel>>, ServiceError> {
    let address = state
        .services
        .addresses
        .set_default(id, auth_user.user_id)
        .await?;
    Ok(Json(ApiResponse::success(address)))
}
