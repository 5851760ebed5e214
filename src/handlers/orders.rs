use crate::{
    auth::AuthUser,
    entities::OrderModel,
    errors::ServiceError,
    handlers::common::created_response,
    services::orders::{
        CreateGuestOrderInput, CreateOrderInput, OrderFilter, UpdateOrderStatusInput,
        UpdatePaymentStatusInput,
    },
    ApiResponse, AppState, PaginatedResponse,
};
use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::{get, patch, post},
    Json, Router,
};
use uuid::Uuid;

/// Guest checkout needs no account
pub fn guest_order_routes() -> Router<AppState> {
    Router::new().route("/orders/guest", post(create_guest_order))
}

pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/orders", get(list_orders).post(create_order))
        .route("/orders/:id", get(get_order))
        .route("/orders/:id/cancel", patch(cancel_order))
        .route("/orders/:id/link", patch(link_guest_order))
        .route("/orders/:id/status", patch(update_order_status))
        .route("/orders/:id/payment-status", patch(update_payment_status))
}

/// List orders
///
/// Customers only ever see their own orders; administrators see every order
/// and may filter guest orders with `is_guest`.
#[utoipa::path(
    get,
    path = "/api/v1/orders",
    summary = "List orders",
    tag = "orders",
    params(OrderFilter),
    responses(
        (status = 200, description = "Orders, newest first", body = ApiResponse<PaginatedResponse<OrderModel>>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn list_orders(
    State(state): State<AppState>,
    Query(filter): Query<OrderFilter>,
    auth_user: AuthUser,
) -> Result<Json<ApiResponse<PaginatedResponse<OrderModel>>>, ServiceError> {
    let page = state
        .services
        .orders
        .list_orders(auth_user.caller(), filter)
        .await?;
    Ok(Json(ApiResponse::success(page)))
}

/// Check out the caller's cart
#[utoipa::path(
    post,
    path = "/api/v1/orders",
    summary = "Create order from cart",
    tag = "orders",
    request_body = CreateOrderInput,
    responses(
        (status = 201, description = "Order created", body = ApiResponse<OrderModel>),
        (status = 400, description = "Empty cart or invalid input", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "Address not found", body = crate::errors::ErrorResponse),
        (status = 422, description = "Insufficient stock", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn create_order(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(payload): Json<CreateOrderInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state
        .services
        .orders
        .create_order(auth_user.user_id, payload)
        .await?;
    Ok(created_response(order))
}

/// Place an order without an account
#[utoipa::path(
    post,
    path = "/api/v1/orders/guest",
    summary = "Create guest order",
    tag = "orders",
    request_body = CreateGuestOrderInput,
    responses(
        (status = 201, description = "Order created", body = ApiResponse<OrderModel>),
        (status = 400, description = "Invalid input or inactive product", body = crate::errors::ErrorResponse),
        (status = 404, description = "Product or variant not found", body = crate::errors::ErrorResponse),
        (status = 422, description = "Insufficient stock", body = crate::errors::ErrorResponse),
    )
)]
pub async fn create_guest_order(
    State(state): State<AppState>,
    Json(payload): Json<CreateGuestOrderInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state.services.orders.create_guest_order(payload).await?;
    Ok(created_response(order))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    summary = "Get order",
    tag = "orders",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order found", body = ApiResponse<OrderModel>),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn get_order(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<OrderModel>>, ServiceError> {
    let order = state
        .services
        .orders
        .get_order(id, auth_user.caller())
        .await?;
    Ok(Json(ApiResponse::success(order)))
}

/// Cancel a pending order and return its stock
#[utoipa::path(
    patch,
    path = "/api/v1/orders/{id}/cancel",
    summary = "Cancel order",
    tag = "orders",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order cancelled", body = ApiResponse<OrderModel>),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Order is not pending", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn cancel_order(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<OrderModel>>, ServiceError> {
    let order = state
        .services
        .orders
        .cancel_order(id, auth_user.caller())
        .await?;
    Ok(Json(ApiResponse::success(order)))
}

/// Attach a guest order to the caller's account
#[utoipa::path(
    patch,
    path = "/api/v1/orders/{id}/link",
    summary = "Link guest order",
    tag = "orders",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order now belongs to the caller", body = ApiResponse<OrderModel>),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Order belongs to another account", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn link_guest_order(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<OrderModel>>, ServiceError> {
    let orders = &state.services.orders;
    orders.link_guest_order(id, auth_user.user_id).await?;
    let order = orders.get_order(id, auth_user.caller()).await?;
    Ok(Json(ApiResponse::success(order)))
}

#[utoipa::path(
    patch,
    path = "/api/v1/orders/{id}/status",
    summary = "Update order status",
    tag = "orders",
    params(("id" = Uuid, Path, description = "Order ID")),
    request_body = UpdateOrderStatusInput,
    responses(
        (status = 200, description = "Status updated", body = ApiResponse<OrderModel>),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Transition not allowed", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn update_order_status(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateOrderStatusInput>,
) -> Result<Json<ApiResponse<OrderModel>>, ServiceError> {
    auth_user.require_admin()?;
    let order = state
        .services
        .orders
        .update_status(id, payload.status, auth_user.caller())
        .await?;
    Ok(Json(ApiResponse::success(order)))
}

#[utoipa::path(
    patch,
    path = "/api/v1/orders/{id}/payment-status",
    summary = "Update payment status",
    tag = "orders",
    params(("id" = Uuid, Path, description = "Order ID")),
    request_body = UpdatePaymentStatusInput,
    responses(
        (status = 200, description = "Payment status updated", body = ApiResponse<OrderModel>),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn update_payment_status(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdatePaymentStatusInput>,
) -> Result<Json<ApiResponse<OrderModel>>, ServiceError> {
    auth_user.require_admin()?;
    let order = state
        .services
        .orders
        .update_payment_status(id, payload.payment_status, auth_user.caller())
        .await?;
    Ok(Json(ApiResponse::success(order)))
}
