use crate::{
    entities::{
        cart::{self, CartLine, CartLines},
        Cart as CartEntity, CartModel,
    },
    errors::{ServiceError, StockShortfall},
    models::Cart,
    services::catalog::{CatalogService, StockRequest},
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, QueryFilter, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Shopping cart service. Every mutation goes through the [`Cart`] aggregate
/// and is written back as one JSON document.
#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
}

impl CartService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Returns the user's cart, creating an empty one on first access.
    #[instrument(skip(self))]
    pub async fn get_cart(&self, user_id: Uuid) -> Result<CartView, ServiceError> {
        let model = load_or_create(&*self.db, user_id).await?;
        Ok(CartView::from(model))
    }

    /// Adds a variant to the cart.
    ///
    /// The product must exist and be active and the variant must exist. The
    /// merged quantity is checked against current stock, and a new line
    /// snapshots the variant price and display fields.
    #[instrument(skip(self))]
    pub async fn add_item(
        &self,
        user_id: Uuid,
        input: AddCartItemInput,
    ) -> Result<CartView, ServiceError> {
        input.validate()?;

        let product = CatalogService::find_by_id(&*self.db, input.product_id)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Product {} not found", input.product_id))
            })?;
        if !product.is_active() {
            return Err(ServiceError::InvalidOperation(format!(
                "Product {} is not available",
                product.name
            )));
        }
        let variant = CatalogService::find_variant(&*self.db, product.id, &input.variant_sku)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Variant with SKU {} not found", input.variant_sku))
            })?;

        let model = load_or_create(&*self.db, user_id).await?;
        let mut cart = Cart::from_lines(model.items.0.clone());

        let wanted = cart
            .quantity_of(product.id, &variant.sku)
            .checked_add(input.quantity)
            .ok_or_else(|| ServiceError::ValidationError("Quantity too large".to_string()))?;
        if variant.stock < wanted {
            return Err(ServiceError::InsufficientStock(vec![StockShortfall {
                product_id: product.id,
                sku: variant.sku.clone(),
                name: product.name.clone(),
                available: variant.stock,
                requested: wanted,
            }]));
        }

        cart.add(CartLine {
            product_id: product.id,
            variant_sku: variant.sku.clone(),
            quantity: input.quantity,
            price_at_add: variant.price,
            product_name: product.name.clone(),
            product_image: product.primary_image(),
            variant_size: variant.size,
            variant_color: variant.color,
        })?;

        let saved = store(&*self.db, model, cart).await?;
        info!(%user_id, sku = %variant.sku, "Added item to cart");
        Ok(CartView::from(saved))
    }

    /// Sets the quantity of the line at `index`, re-checking stock.
    #[instrument(skip(self))]
    pub async fn update_item(
        &self,
        user_id: Uuid,
        index: usize,
        quantity: i32,
    ) -> Result<CartView, ServiceError> {
        let model = load_or_create(&*self.db, user_id).await?;
        let mut cart = Cart::from_lines(model.items.0.clone());
        let line = cart.line(index)?.clone();

        let variant = CatalogService::find_variant(&*self.db, line.product_id, &line.variant_sku)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Variant with SKU {} not found", line.variant_sku))
            })?;
        if quantity > variant.stock {
            return Err(ServiceError::InsufficientStock(vec![StockShortfall {
                product_id: line.product_id,
                sku: line.variant_sku.clone(),
                name: line.product_name.clone(),
                available: variant.stock,
                requested: quantity,
            }]));
        }

        cart.update_quantity(index, quantity)?;
        let saved = store(&*self.db, model, cart).await?;
        Ok(CartView::from(saved))
    }

    #[instrument(skip(self))]
    pub async fn remove_item(&self, user_id: Uuid, index: usize) -> Result<CartView, ServiceError> {
        let model = load_or_create(&*self.db, user_id).await?;
        let mut cart = Cart::from_lines(model.items.0.clone());
        let removed = cart.remove(index)?;
        debug!(sku = %removed.variant_sku, "Removed cart line");
        let saved = store(&*self.db, model, cart).await?;
        Ok(CartView::from(saved))
    }

    #[instrument(skip(self))]
    pub async fn clear(&self, user_id: Uuid) -> Result<CartView, ServiceError> {
        let model = load_or_create(&*self.db, user_id).await?;
        let mut cart = Cart::from_lines(model.items.0.clone());
        cart.clear();
        let saved = store(&*self.db, model, cart).await?;
        Ok(CartView::from(saved))
    }

    /// Reports every line whose quantity exceeds current stock.
    #[instrument(skip(self))]
    pub async fn validate(&self, user_id: Uuid) -> Result<CartValidation, ServiceError> {
        let model = load_or_create(&*self.db, user_id).await?;
        let requests = stock_requests(&model.items.0);
        let issues = CatalogService::shortfalls(&*self.db, &requests).await?;
        Ok(CartValidation {
            valid: issues.is_empty(),
            issues,
        })
    }
}

pub(crate) fn stock_requests(lines: &[CartLine]) -> Vec<StockRequest> {
    lines
        .iter()
        .map(|line| StockRequest {
            product_id: line.product_id,
            sku: line.variant_sku.clone(),
            name: line.product_name.clone(),
            quantity: line.quantity,
        })
        .collect()
}

pub(crate) async fn find_for_user<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
) -> Result<Option<CartModel>, ServiceError> {
    Ok(CartEntity::find()
        .filter(cart::Column::UserId.eq(user_id))
        .one(conn)
        .await?)
}

async fn load_or_create<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
) -> Result<CartModel, ServiceError> {
    if let Some(existing) = find_for_user(conn, user_id).await? {
        return Ok(existing);
    }

    let now = Utc::now();
    let inserted = cart::ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(user_id),
        items: Set(CartLines::default()),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(conn)
    .await;

    match inserted {
        Ok(model) => Ok(model),
        // Another request created it first
        Err(err) => match find_for_user(conn, user_id).await? {
            Some(existing) => Ok(existing),
            None => Err(err.into()),
        },
    }
}

/// Writes the aggregate back onto its row.
pub(crate) async fn store<C: ConnectionTrait>(
    conn: &C,
    model: CartModel,
    cart: Cart,
) -> Result<CartModel, ServiceError> {
    let mut active: cart::ActiveModel = model.into();
    active.items = Set(CartLines(cart.into_lines()));
    active.updated_at = Set(Utc::now());
    Ok(active.update(conn).await?)
}

/// Empties the cart only if nobody wrote to it since `model` was read.
/// A concurrent change fails with `Conflict` and leaves the lines alone.
pub async fn clear_if_unchanged<C: ConnectionTrait>(
    conn: &C,
    model: &CartModel,
) -> Result<(), ServiceError> {
    let result = CartEntity::update_many()
        .col_expr(cart::Column::Items, Expr::value(CartLines::default()))
        .col_expr(cart::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(cart::Column::Id.eq(model.id))
        .filter(cart::Column::UpdatedAt.eq(model.updated_at))
        .exec(conn)
        .await?;
    if result.rows_affected == 0 {
        return Err(ServiceError::Conflict(
            "Cart changed during checkout, please review it and try again".to_string(),
        ));
    }
    Ok(())
}

/// Cart with computed totals
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CartView {
    #[serde(flatten)]
    pub cart: CartModel,
    pub subtotal: Decimal,
    pub item_count: i64,
}

impl From<CartModel> for CartView {
    fn from(cart: CartModel) -> Self {
        let aggregate = Cart::from_lines(cart.items.0.clone());
        Self {
            subtotal: aggregate.subtotal(),
            item_count: aggregate.item_count(),
            cart,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
pub struct AddCartItemInput {
    pub product_id: Uuid,
    #[validate(length(min = 1, message = "Variant SKU is required"))]
    pub variant_sku: String,
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: i32,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
pub struct UpdateCartItemInput {
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CartValidation {
    pub valid: bool,
    pub issues: Vec<StockShortfall>,
}
