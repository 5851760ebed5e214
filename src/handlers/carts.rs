use crate::{
    auth::AuthUser,
    errors::ServiceError,
    services::carts::{AddCartItemInput, CartValidation, CartView, UpdateCartItemInput},
    ApiResponse, AppState,
};
use axum::{
    extract::{Path, State},
    routing::{get, patch, post},
    Json, Router,
};
use validator::Validate;

pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/cart", get(get_cart).delete(clear_cart))
        .route("/cart/items", post(add_item))
        .route("/cart/items/:index", patch(update_item).delete(remove_item))
        .route("/cart/validate", get(validate_cart))
}

/// Get the caller's cart, creating an empty one on first access
#[utoipa::path(
    get,
    path = "/api/v1/cart",
    tag = "cart",
    responses(
        (status = 200, description = "Cart with totals", body = ApiResponse<CartView>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn get_cart(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> Result<Json<ApiResponse<CartView>>, ServiceError> {
    let cart = state.services.carts.get_cart(auth_user.user_id).await?;
    Ok(Json(ApiResponse::success(cart)))
}

/// Add a variant to the cart, merging with an existing line
#[utoipa::path(
    post,
    path = "/api/v1/cart/items",
    tag = "cart",
    request_body = AddCartItemInput,
    responses(
        (status = 200, description = "Updated cart", body = ApiResponse<CartView>),
        (status = 400, description = "Invalid input or inactive product", body = crate::errors::ErrorResponse),
        (status = 404, description = "Product or variant not found", body = crate::errors::ErrorResponse),
        (status = 422, description = "Insufficient stock", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn add_item(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(payload): Json<AddCartItemInput>,
) -> Result<Json<ApiResponse<CartView>>, ServiceError> {
    let cart = state
        .services
        .carts
        .add_item(auth_user.user_id, payload)
        .await?;
    Ok(Json(ApiResponse::success(cart)))
}

#[utoipa::path(
    patch,
    path = "/api/v1/cart/items/{index}",
    tag = "cart",
    params(("index" = usize, Path, description = "Zero-based line index")),
    request_body = UpdateCartItemInput,
    responses(
        (status = 200, description = "Updated cart", body = ApiResponse<CartView>),
        (status = 404, description = "Line not found", body = crate::errors::ErrorResponse),
        (status = 422, description = "Insufficient stock", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn update_item(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(index): Path<usize>,
    Json(payload): Json<UpdateCartItemInput>,
) -> Result<Json<ApiResponse<CartView>>, ServiceError> {
    payload.validate()?;
    let cart = state
        .services
        .carts
        .update_item(auth_user.user_id, index, payload.quantity)
        .await?;
    Ok(Json(ApiResponse::success(cart)))
}

#[utoipa::path(
    delete,
    path = "/api/v1/cart/items/{index}",
    tag = "cart",
    params(("index" = usize, Path, description = "Zero-based line index")),
    responses(
        (status = 200, description = "Updated cart", body = ApiResponse<CartView>),
        (status = 404, description = "Line not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn remove_item(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(index): Path<usize>,
) -> Result<Json<ApiResponse<CartView>>, ServiceError> {
    let cart = state
        .services
        .carts
        .remove_item(auth_user.user_id, index)
        .await?;
    Ok(Json(ApiResponse::success(cart)))
}

#[utoipa::path(
    delete,
    path = "/api/v1/cart",
    tag = "cart",
    responses(
        (status = 200, description = "Emptied cart", body = ApiResponse<CartView>),
    ),
    security(("Bearer" = []))
)]
pub async fn clear_cart(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> Result<Json<ApiResponse<CartView>>, ServiceError> {
    let cart = state.services.carts.clear(auth_user.user_id).await?;
    Ok(Json(ApiResponse::success(cart)))
}

/// Check every cart line against current stock
#[utoipa::path(
    get,
    path = "/api/v1/cart/validate",
    tag = "cart",
    responses(
        (status = 200, description = "Validation result", body = ApiResponse<CartValidation>),
    ),
    security(("Bearer" = []))
)]
pub async fn validate_cart(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> Result<Json<ApiResponse<CartValidation>>, ServiceError> {
    let result = state.services.carts.validate(auth_user.user_id).await?;
    Ok(Json(ApiResponse::success(result)))
}
