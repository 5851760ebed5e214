use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Storefront API",
        version = "1.0.0",
        description = r#"
# Storefront API

Catalog, cart, address book and order management for an apparel storefront.

## Authentication

Customer and administrator endpoints require a JWT issued by `/api/v1/auth/login`
or `/api/v1/auth/register`:

```
Authorization: Bearer <your-jwt-token>
```

Guest checkout (`POST /api/v1/orders/guest`) and the public catalog need no token.

## Error Handling

Errors share one body shape. Stock failures list every offending line in `details`:

```json
{
  "error": "Unprocessable Entity",
  "message": "Insufficient stock: Classic Tee (CLTE-M-BLK-0001): available 1, requested 2",
  "details": [{"sku": "CLTE-M-BLK-0001", "available": 1, "requested": 2}],
  "timestamp": "2024-01-01T00:00:00Z"
}
```
        "#,
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "auth", description = "Registration, login and the current account"),
        (name = "catalog", description = "Public product catalog"),
        (name = "products", description = "Product administration"),
        (name = "cart", description = "Shopping cart"),
        (name = "addresses", description = "Customer address book"),
        (name = "orders", description = "Checkout and order management")
    ),
    paths(
        // Auth
        crate::handlers::auth::register,
        crate::handlers::auth::login,
        crate::handlers::auth::me,

        // Catalog
        crate::handlers::products::list_catalog,
        crate::handlers::products::get_catalog_product,
        crate::handlers::products::list_products,
        crate::handlers::products::create_product,
        crate::handlers::products::get_product,
        crate::handlers::products::get_product_by_code,
        crate::handlers::products::update_product,
        crate::handlers::products::activate_product,
        crate::handlers::products::deactivate_product,
        crate::handlers::products::add_variant,
        crate::handlers::products::update_variant,
        crate::handlers::products::remove_variant,
        crate::handlers::products::set_variant_stock,
        crate::handlers::products::increase_variant_stock,
        crate::handlers::products::decrease_variant_stock,

        // Cart
        crate::handlers::carts::get_cart,
        crate::handlers::carts::add_item,
        crate::handlers::carts::update_item,
        crate::handlers::carts::remove_item,
        crate::handlers::carts::clear_cart,
        crate::handlers::carts::validate_cart,

        // Addresses
        crate::handlers::addresses::list_addresses,
        crate::handlers::addresses::create_address,
        crate::handlers::addresses::get_address,
        crate::handlers::addresses::get_default_address,
        crate::handlers::addresses::update_address,
        crate::handlers::addresses::delete_address,
        crate::handlers::addresses::set_default_address,

        // Orders
        crate::handlers::orders::list_orders,
        crate::handlers::orders::create_order,
        crate::handlers::orders::create_guest_order,
        crate::handlers::orders::get_order,
        crate::handlers::orders::cancel_order,
        crate::handlers::orders::link_guest_order,
        crate::handlers::orders::update_order_status,
        crate::handlers::orders::update_payment_status,
    ),
    components(
        schemas(
            crate::entities::OrderStatus,
            crate::entities::PaymentStatus,
            crate::entities::PaymentMethod,
            crate::entities::ProductStatus,
            crate::entities::Size,
            crate::entities::Color,
            crate::entities::Role,
            crate::errors::StockShortfall,
            crate::errors::ErrorResponse
        )
    )
)]
pub struct ApiDocV1;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "Bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDocV1::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_document_lists_routes_and_bearer_scheme() {
        let openapi = ApiDocV1::openapi();
        let json = serde_json::to_string_pretty(&openapi).unwrap();
        assert!(json.contains("Storefront API"));
        assert!(json.contains("/api/v1/orders/guest"));
        assert!(json.contains("/api/v1/products/{id}/variants/{sku}/stock"));
        assert!(json.contains("\"Bearer\""));
    }
}
