use crate::{
    auth::AuthUser,
    entities::{ProductModel, ProductVariantModel},
    errors::ServiceError,
    handlers::common::{created_response, no_content_response, success_response},
    services::catalog::{
        CreateProductInput, NewVariantInput, ProductDetail, UpdateProductInput, UpdateVariantInput,
    },
    ApiResponse, AppState,
};
use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::{get, patch, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Public storefront catalog
pub fn catalog_routes() -> Router<AppState> {
    Router::new()
        .route("/products/catalog", get(list_catalog))
        .route("/products/catalog/:id", get(get_catalog_product))
}

/// Product administration; every handler requires the admin role
pub fn product_admin_routes() -> Router<AppState> {
    Router::new()
        .route("/products", get(list_products).post(create_product))
        .route("/products/by-code/:code", get(get_product_by_code))
        .route("/products/:id", get(get_product).patch(update_product))
        .route("/products/:id/activate", patch(activate_product))
        .route("/products/:id/deactivate", patch(deactivate_product))
        .route("/products/:id/variants", post(add_variant))
        .route(
            "/products/:id/variants/:sku",
            patch(update_variant).delete(remove_variant),
        )
        .route("/products/:id/variants/:sku/stock", patch(set_variant_stock))
        .route(
            "/products/:id/variants/:sku/increase-stock",
            patch(increase_variant_stock),
        )
        .route(
            "/products/:id/variants/:sku/decrease-stock",
            patch(decrease_variant_stock),
        )
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
pub struct SetStockRequest {
    #[validate(range(min = 0, message = "Stock cannot be negative"))]
    pub stock: i32,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
pub struct StockAdjustmentRequest {
    #[validate(range(min = 1, message = "Quantity must be positive"))]
    pub quantity: i32,
}

/// List active products
#[utoipa::path(
    get,
    path = "/api/v1/products/catalog",
    tag = "catalog",
    responses(
        (status = 200, description = "Active products with their variants", body = ApiResponse<Vec<ProductDetail>>),
    )
)]
pub async fn list_catalog(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<ProductDetail>>>, ServiceError> {
    let products = state.services.catalog.list_products(true).await?;
    Ok(Json(ApiResponse::success(products)))
}

/// Get an active product
#[utoipa::path(
    get,
    path = "/api/v1/products/catalog/{id}",
    tag = "catalog",
    params(("id" = Uuid, Path, description = "Product ID")),
    responses(
        (status = 200, description = "Product found", body = ApiResponse<ProductDetail>),
        (status = 404, description = "Product not found or inactive", body = crate::errors::ErrorResponse),
    )
)]
pub async fn get_catalog_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<ProductDetail>>, ServiceError> {
    let product = state.services.catalog.get_catalog_product(id).await?;
    Ok(Json(ApiResponse::success(product)))
}

/// List all products, active or not
#[utoipa::path(
    get,
    path = "/api/v1/products",
    tag = "products",
    responses(
        (status = 200, description = "All products", body = ApiResponse<Vec<ProductDetail>>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn list_products(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> Result<Json<ApiResponse<Vec<ProductDetail>>>, ServiceError> {
    auth_user.require_admin()?;
    let products = state.services.catalog.list_products(false).await?;
    Ok(Json(ApiResponse::success(products)))
}

/// Create a product with its initial variants
#[utoipa::path(
    post,
    path = "/api/v1/products",
    tag = "products",
    request_body = CreateProductInput,
    responses(
        (status = 201, description = "Product created", body = ApiResponse<ProductDetail>),
        (status = 400, description = "Invalid input", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 409, description = "Duplicate code or variant", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn create_product(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(payload): Json<CreateProductInput>,
) -> Result<impl IntoResponse, ServiceError> {
    auth_user.require_admin()?;
    let product = state.services.catalog.create_product(payload).await?;
    Ok(created_response(product))
}

/// Get any product by ID
#[utoipa::path(
    get,
    path = "/api/v1/products/{id}",
    tag = "products",
    params(("id" = Uuid, Path, description = "Product ID")),
    responses(
        (status = 200, description = "Product found", body = ApiResponse<ProductDetail>),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn get_product(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<ProductDetail>>, ServiceError> {
    auth_user.require_admin()?;
    let product = state.services.catalog.get_product(id).await?;
    Ok(Json(ApiResponse::success(product)))
}

#[utoipa::path(
    patch,
    path = "/api/v1/products/{id}/activate",
    tag = "products",
    params(("id" = Uuid, Path, description = "Product ID")),
    responses(
        (status = 200, description = "Product activated", body = ApiResponse<ProductModel>),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Product already active", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn activate_product(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<ProductModel>>, ServiceError> {
    auth_user.require_admin()?;
    let product = state.services.catalog.activate(id).await?;
    Ok(Json(ApiResponse::success(product)))
}

#[utoipa::path(
    patch,
    path = "/api/v1/products/{id}/deactivate",
    tag = "products",
    params(("id" = Uuid, Path, description = "Product ID")),
    responses(
        (status = 200, description = "Product deactivated", body = ApiResponse<ProductModel>),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Product already inactive", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn deactivate_product(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<ProductModel>>, ServiceError> {
    auth_user.require_admin()?;
    let product = state.services.catalog.deactivate(id).await?;
    Ok(Json(ApiResponse::success(product)))
}

/// Add a size/color variant; the SKU is generated
#[utoipa::path(
    post,
    path = "/api/v1/products/{id}/variants",
    tag = "products",
    params(("id" = Uuid, Path, description = "Product ID")),
    request_body = NewVariantInput,
    responses(
        (status = 201, description = "Variant created", body = ApiResponse<ProductVariantModel>),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Size/color combination exists", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn add_variant(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<NewVariantInput>,
) -> Result<impl IntoResponse, ServiceError> {
    auth_user.require_admin()?;
    let variant = state.services.catalog.add_variant(id, payload).await?;
    Ok(created_response(variant))
}

#[utoipa::path(
    patch,
    path = "/api/v1/products/{id}/variants/{sku}",
    tag = "products",
    params(
        ("id" = Uuid, Path, description = "Product ID"),
        ("sku" = String, Path, description = "Variant SKU"),
    ),
    request_body = UpdateVariantInput,
    responses(
        (status = 200, description = "Variant updated", body = ApiResponse<ProductVariantModel>),
        (status = 404, description = "Variant not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn update_variant(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path((id, sku)): Path<(Uuid, String)>,
    Json(payload): Json<UpdateVariantInput>,
) -> Result<impl IntoResponse, ServiceError> {
    auth_user.require_admin()?;
    let variant = state
        .services
        .catalog
        .update_variant(id, &sku, payload)
        .await?;
    Ok(success_response(variant))
}

/// Remove a variant; a product keeps at least one
#[utoipa::path(
    delete,
    path = "/api/v1/products/{id}/variants/{sku}",
    tag = "products",
    params(
        ("id" = Uuid, Path, description = "Product ID"),
        ("sku" = String, Path, description = "Variant SKU"),
    ),
    responses(
        (status = 204, description = "Variant removed"),
        (status = 400, description = "Last variant of the product", body = crate::errors::ErrorResponse),
        (status = 404, description = "Variant not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn remove_variant(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path((id, sku)): Path<(Uuid, String)>,
) -> Result<impl IntoResponse, ServiceError> {
    auth_user.require_admin()?;
    state.services.catalog.remove_variant(id, &sku).await?;
    Ok(no_content_response())
}

/// Overwrite the stock of a variant
#[utoipa::path(
    patch,
    path = "/api/v1/products/{id}/variants/{sku}/stock",
    tag = "products",
    params(
        ("id" = Uuid, Path, description = "Product ID"),
        ("sku" = String, Path, description = "Variant SKU"),
    ),
    request_body = SetStockRequest,
    responses(
        (status = 200, description = "Stock updated", body = ApiResponse<ProductVariantModel>),
        (status = 400, description = "Negative stock", body = crate::errors::ErrorResponse),
        (status = 404, description = "Variant not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn set_variant_stock(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path((id, sku)): Path<(Uuid, String)>,
    Json(payload): Json<SetStockRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    auth_user.require_admin()?;
    payload.validate()?;
    let variant = state
        .services
        .catalog
        .set_variant_stock(id, &sku, payload.stock)
        .await?;
    Ok(success_response(variant))
}

#[utoipa::path(
    get,
    path = "/api/v1/products/by-code/{code}",
    tag = "products",
    params(("code" = String, Path, description = "Product code")),
    responses(
        (status = 200, description = "Product with variants", body = ApiResponse<ProductDetail>),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn get_product_by_code(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(code): Path<String>,
) -> Result<Json<ApiResponse<ProductDetail>>, ServiceError> {
    auth_user.require_admin()?;
    let product = state.services.catalog.find_by_code(&code).await?;
    Ok(Json(ApiResponse::success(product)))
}

/// Update name, description, price, images, category, tags or code
#[utoipa::path(
    patch,
    path = "/api/v1/products/{id}",
    tag = "products",
    params(("id" = Uuid, Path, description = "Product ID")),
    request_body = UpdateProductInput,
    responses(
        (status = 200, description = "Product updated", body = ApiResponse<ProductDetail>),
        (status = 400, description = "Invalid input", body = crate::errors::ErrorResponse),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Code already in use", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn update_product(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateProductInput>,
) -> Result<Json<ApiResponse<ProductDetail>>, ServiceError> {
    auth_user.require_admin()?;
    let product = state.services.catalog.update_product(id, payload).await?;
    Ok(Json(ApiResponse::success(product)))
}

#[utoipa::path(
    patch,
    path = "/api/v1/products/{id}/variants/{sku}/increase-stock",
    tag = "products",
    params(
        ("id" = Uuid, Path, description = "Product ID"),
        ("sku" = String, Path, description = "Variant SKU"),
    ),
    request_body = StockAdjustmentRequest,
    responses(
        (status = 200, description = "Stock increased", body = ApiResponse<ProductVariantModel>),
        (status = 404, description = "Variant not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn increase_variant_stock(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path((id, sku)): Path<(Uuid, String)>,
    Json(payload): Json<StockAdjustmentRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    auth_user.require_admin()?;
    payload.validate()?;
    let variant = state
        .services
        .catalog
        .restock_variant(id, &sku, payload.quantity)
        .await?;
    Ok(success_response(variant))
}

#[utoipa::path(
    patch,
    path = "/api/v1/products/{id}/variants/{sku}/decrease-stock",
    tag = "products",
    params(
        ("id" = Uuid, Path, description = "Product ID"),
        ("sku" = String, Path, description = "Variant SKU"),
    ),
    request_body = StockAdjustmentRequest,
    responses(
        (status = 200, description = "Stock decreased", body = ApiResponse<ProductVariantModel>),
        (status = 404, description = "Variant not found", body = crate::errors::ErrorResponse),
        (status = 422, description = "Not enough stock", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn decrease_variant_stock(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path((id, sku)): Path<(Uuid, String)>,
    Json(payload): Json<StockAdjustmentRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    auth_user.require_admin()?;
    payload.validate()?;
    let variant = state
        .services
        .catalog
        .withdraw_variant_stock(id, &sku, payload.quantity)
        .await?;
    Ok(success_response(variant))
}
