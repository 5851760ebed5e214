use crate::{
    entities::{
        product::{self, ProductStatus, StringList},
        product_variant::{self, Color, Size},
        Product, ProductModel, ProductVariant, ProductVariantModel,
    },
    errors::{ServiceError, StockShortfall},
    events::{Event, EventSender},
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, ModelTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::{collections::HashSet, sync::Arc};
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Builds a variant SKU: the first two letters of each word of the product
/// name, upper-cased, then size, color code and the last four digits of
/// `epoch_millis`.
///
/// ```ignore
/// assert_eq!(generate_sku("Classic Tee", Size::M, Color::Black, 1_700_000_001_234), "CLTE-M-BLK-1234");
/// ```
pub fn generate_sku(product_name: &str, size: Size, color: Color, epoch_millis: i64) -> String {
    let prefix: String = product_name
        .split_whitespace()
        .map(|word| word.chars().take(2).collect::<String>())
        .collect::<String>()
        .to_uppercase();

    format!(
        "{}-{}-{}-{:04}",
        prefix,
        size.sku_label(),
        color.code(),
        epoch_millis.rem_euclid(10_000)
    )
}

fn ensure_positive(quantity: i32) -> Result<(), ServiceError> {
    if quantity <= 0 {
        return Err(ServiceError::ValidationError(
            "Quantity must be positive".to_string(),
        ));
    }
    Ok(())
}

fn ensure_price(price: Decimal) -> Result<(), ServiceError> {
    if price < Decimal::ZERO {
        return Err(ServiceError::ValidationError(
            "Price cannot be negative".to_string(),
        ));
    }
    Ok(())
}

fn variant_not_found(product_id: Uuid, sku: &str) -> ServiceError {
    ServiceError::NotFound(format!(
        "Variant with SKU {} not found for product {}",
        sku, product_id
    ))
}

/// Catalog service: products, their variants and stock levels.
#[derive(Clone)]
pub struct CatalogService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl CatalogService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Creates a product together with its initial variants.
    ///
    /// The product code must be unique and at least one variant is
    /// required. Each variant gets a generated SKU and, when no price is
    /// given, inherits the product's base price.
    #[instrument(skip(self, input), fields(code = %input.code))]
    pub async fn create_product(
        &self,
        input: CreateProductInput,
    ) -> Result<ProductDetail, ServiceError> {
        input.validate()?;
        ensure_price(input.base_price)?;
        if input.variants.is_empty() {
            return Err(ServiceError::ValidationError(
                "A product needs at least one variant".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for variant in &input.variants {
            variant.validate()?;
            if let Some(price) = variant.price {
                ensure_price(price)?;
            }
            if !seen.insert((variant.size, variant.color)) {
                return Err(ServiceError::Conflict(format!(
                    "Variant with size {} and color {} is listed twice",
                    variant.size, variant.color
                )));
            }
        }

        let txn = self.db.begin().await?;

        let code_taken = Product::find()
            .filter(product::Column::Code.eq(input.code.as_str()))
            .one(&txn)
            .await?
            .is_some();
        if code_taken {
            return Err(ServiceError::Conflict(format!(
                "Product code {} already exists",
                input.code
            )));
        }

        let product_id = Uuid::new_v4();
        let now = Utc::now();
        let product = product::ActiveModel {
            id: Set(product_id),
            code: Set(input.code.clone()),
            name: Set(input.name.clone()),
            description: Set(input.description.clone()),
            base_price: Set(input.base_price),
            images: Set(StringList(input.images.clone())),
            status: Set(ProductStatus::Active),
            category: Set(input.category.clone()),
            tags: Set(StringList(input.tags.clone())),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await
        .map_err(|e| ServiceError::from_db_unique(e, "Product code already exists"))?;

        let mut variants = Vec::with_capacity(input.variants.len());
        for (position, variant) in input.variants.iter().enumerate() {
            let model = insert_variant(&txn, &product, variant, position as i32).await?;
            variants.push(model);
        }

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::ProductCreated(product_id))
            .await;

        info!(%product_id, variants = variants.len(), "Created product");
        Ok(ProductDetail { product, variants })
    }

    #[instrument(skip(self))]
    pub async fn get_product(&self, product_id: Uuid) -> Result<ProductDetail, ServiceError> {
        let product = Self::find_by_id(&*self.db, product_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;
        let variants = product
            .find_related(ProductVariant)
            .order_by_asc(product_variant::Column::Position)
            .all(&*self.db)
            .await?;
        Ok(ProductDetail { product, variants })
    }

    #[instrument(skip(self))]
    pub async fn find_by_code(&self, code: &str) -> Result<ProductDetail, ServiceError> {
        let product = Product::find()
            .filter(product::Column::Code.eq(code))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product with code {} not found", code)))?;
        self.get_product(product.id).await
    }

    /// Updates the descriptive fields of a product. Only fields present in
    /// `input` change; variants are managed separately.
    #[instrument(skip(self, input))]
    pub async fn update_product(
        &self,
        product_id: Uuid,
        input: UpdateProductInput,
    ) -> Result<ProductDetail, ServiceError> {
        input.validate()?;
        if let Some(price) = input.base_price {
            ensure_price(price)?;
        }

        let txn = self.db.begin().await?;
        let product = Self::find_by_id(&txn, product_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;

        if let Some(code) = input.code.as_deref().filter(|c| *c != product.code) {
            let taken = Product::find()
                .filter(product::Column::Code.eq(code))
                .one(&txn)
                .await?
                .is_some();
            if taken {
                return Err(ServiceError::Conflict(format!(
                    "Product code {} already exists",
                    code
                )));
            }
        }

        let mut active: product::ActiveModel = product.into();
        if let Some(code) = input.code {
            active.code = Set(code);
        }
        if let Some(name) = input.name {
            active.name = Set(name);
        }
        if let Some(description) = input.description {
            active.description = Set(Some(description));
        }
        if let Some(price) = input.base_price {
            active.base_price = Set(price);
        }
        if let Some(images) = input.images {
            active.images = Set(StringList(images));
        }
        if let Some(category) = input.category {
            active.category = Set(Some(category));
        }
        if let Some(tags) = input.tags {
            active.tags = Set(StringList(tags));
        }
        active.updated_at = Set(Utc::now());
        active
            .update(&txn)
            .await
            .map_err(|e| ServiceError::from_db_unique(e, "Product code already exists"))?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::ProductUpdated(product_id))
            .await;
        info!(%product_id, "Updated product");
        self.get_product(product_id).await
    }

    /// Public catalog view: only active products are visible.
    #[instrument(skip(self))]
    pub async fn get_catalog_product(&self, product_id: Uuid) -> Result<ProductDetail, ServiceError> {
        let detail = self.get_product(product_id).await?;
        if !detail.product.is_active() {
            return Err(ServiceError::NotFound(format!(
                "Product {} not found",
                product_id
            )));
        }
        Ok(detail)
    }

    #[instrument(skip(self))]
    pub async fn list_products(&self, active_only: bool) -> Result<Vec<ProductDetail>, ServiceError> {
        let mut query = Product::find();
        if active_only {
            query = query.filter(product::Column::Status.eq(ProductStatus::Active));
        }

        let rows = query
            .find_with_related(ProductVariant)
            .order_by_desc(product::Column::CreatedAt)
            .order_by_asc(product_variant::Column::Position)
            .all(&*self.db)
            .await?;

        Ok(rows
            .into_iter()
            .map(|(product, variants)| ProductDetail { product, variants })
            .collect())
    }

    pub async fn find_by_id<C: ConnectionTrait>(
        conn: &C,
        product_id: Uuid,
    ) -> Result<Option<ProductModel>, ServiceError> {
        Ok(Product::find_by_id(product_id).one(conn).await?)
    }

    pub async fn find_variant<C: ConnectionTrait>(
        conn: &C,
        product_id: Uuid,
        sku: &str,
    ) -> Result<Option<ProductVariantModel>, ServiceError> {
        Ok(ProductVariant::find()
            .filter(product_variant::Column::ProductId.eq(product_id))
            .filter(product_variant::Column::Sku.eq(sku))
            .one(conn)
            .await?)
    }

    #[instrument(skip(self))]
    pub async fn add_variant(
        &self,
        product_id: Uuid,
        input: NewVariantInput,
    ) -> Result<ProductVariantModel, ServiceError> {
        input.validate()?;
        if let Some(price) = input.price {
            ensure_price(price)?;
        }

        let txn = self.db.begin().await?;
        let product = Self::find_by_id(&txn, product_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;

        let existing = product.find_related(ProductVariant).all(&txn).await?;
        if existing
            .iter()
            .any(|v| v.size == input.size && v.color == input.color)
        {
            return Err(ServiceError::Conflict(format!(
                "Variant with size {} and color {} already exists",
                input.size, input.color
            )));
        }
        let position = existing.iter().map(|v| v.position + 1).max().unwrap_or(0);

        let variant = insert_variant(&txn, &product, &input, position).await?;
        txn.commit().await?;

        info!(%product_id, sku = %variant.sku, "Added variant");
        Ok(variant)
    }

    #[instrument(skip(self))]
    pub async fn update_variant(
        &self,
        product_id: Uuid,
        sku: &str,
        input: UpdateVariantInput,
    ) -> Result<ProductVariantModel, ServiceError> {
        if let Some(stock) = input.stock {
            if stock < 0 {
                return Err(ServiceError::ValidationError(
                    "Stock cannot be negative".to_string(),
                ));
            }
        }
        if let Some(price) = input.price {
            ensure_price(price)?;
        }

        let variant = Self::find_variant(&*self.db, product_id, sku)
            .await?
            .ok_or_else(|| variant_not_found(product_id, sku))?;

        let mut active: product_variant::ActiveModel = variant.into();
        if let Some(price) = input.price {
            active.price = Set(price);
        }
        if let Some(stock) = input.stock {
            active.stock = Set(stock);
        }
        active.updated_at = Set(Utc::now());
        let updated = active.update(&*self.db).await?;

        if input.stock.is_some() {
            self.publish_stock(&updated).await;
        }
        Ok(updated)
    }

    /// Removes a variant. A product always keeps at least one.
    #[instrument(skip(self))]
    pub async fn remove_variant(&self, product_id: Uuid, sku: &str) -> Result<(), ServiceError> {
        let txn = self.db.begin().await?;
        let variants = ProductVariant::find()
            .filter(product_variant::Column::ProductId.eq(product_id))
            .all(&txn)
            .await?;
        let target = variants
            .iter()
            .find(|v| v.sku == sku)
            .cloned()
            .ok_or_else(|| variant_not_found(product_id, sku))?;
        if variants.len() == 1 {
            return Err(ServiceError::InvalidOperation(
                "Cannot remove the last variant of a product".to_string(),
            ));
        }

        target.delete(&txn).await?;
        txn.commit().await?;
        info!(%product_id, %sku, "Removed variant");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn set_variant_stock(
        &self,
        product_id: Uuid,
        sku: &str,
        stock: i32,
    ) -> Result<ProductVariantModel, ServiceError> {
        self.update_variant(
            product_id,
            sku,
            UpdateVariantInput {
                price: None,
                stock: Some(stock),
            },
        )
        .await
    }

    /// Adds `quantity` units to a variant and returns it.
    #[instrument(skip(self))]
    pub async fn restock_variant(
        &self,
        product_id: Uuid,
        sku: &str,
        quantity: i32,
    ) -> Result<ProductVariantModel, ServiceError> {
        Self::increase_stock(&*self.db, product_id, sku, quantity).await?;
        self.reload_and_publish(product_id, sku).await
    }

    /// Takes `quantity` units out of a variant; refused when fewer remain.
    #[instrument(skip(self))]
    pub async fn withdraw_variant_stock(
        &self,
        product_id: Uuid,
        sku: &str,
        quantity: i32,
    ) -> Result<ProductVariantModel, ServiceError> {
        Self::decrease_stock(&*self.db, product_id, sku, quantity).await?;
        self.reload_and_publish(product_id, sku).await
    }

    async fn reload_and_publish(
        &self,
        product_id: Uuid,
        sku: &str,
    ) -> Result<ProductVariantModel, ServiceError> {
        let variant = Self::find_variant(&*self.db, product_id, sku)
            .await?
            .ok_or_else(|| variant_not_found(product_id, sku))?;
        self.publish_stock(&variant).await;
        Ok(variant)
    }

    #[instrument(skip(self))]
    pub async fn activate(&self, product_id: Uuid) -> Result<ProductModel, ServiceError> {
        self.change_status(product_id, ProductStatus::Active).await
    }

    #[instrument(skip(self))]
    pub async fn deactivate(&self, product_id: Uuid) -> Result<ProductModel, ServiceError> {
        self.change_status(product_id, ProductStatus::Inactive).await
    }

    async fn change_status(
        &self,
        product_id: Uuid,
        status: ProductStatus,
    ) -> Result<ProductModel, ServiceError> {
        let product = Self::find_by_id(&*self.db, product_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;
        if product.status == status {
            return Err(ServiceError::Conflict(format!(
                "Product is already {}",
                status
            )));
        }

        let mut active: product::ActiveModel = product.into();
        active.status = Set(status);
        active.updated_at = Set(Utc::now());
        Ok(active.update(&*self.db).await?)
    }

    /// Reserves stock with a single conditional update. The row only changes
    /// when it still holds at least `quantity` units, so concurrent callers
    /// can never drive stock below zero.
    pub async fn decrease_stock<C: ConnectionTrait>(
        conn: &C,
        product_id: Uuid,
        sku: &str,
        quantity: i32,
    ) -> Result<(), ServiceError> {
        ensure_positive(quantity)?;

        let result = ProductVariant::update_many()
            .col_expr(
                product_variant::Column::Stock,
                Expr::col(product_variant::Column::Stock).sub(quantity),
            )
            .col_expr(product_variant::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(product_variant::Column::ProductId.eq(product_id))
            .filter(product_variant::Column::Sku.eq(sku))
            .filter(product_variant::Column::Stock.gte(quantity))
            .exec(conn)
            .await?;

        if result.rows_affected > 0 {
            return Ok(());
        }

        let variant = Self::find_variant(conn, product_id, sku)
            .await?
            .ok_or_else(|| variant_not_found(product_id, sku))?;
        let name = Self::find_by_id(conn, product_id)
            .await?
            .map(|p| p.name)
            .unwrap_or_default();

        warn!(%product_id, %sku, available = variant.stock, requested = quantity, "stock reservation refused");
        Err(ServiceError::InsufficientStock(vec![StockShortfall {
            product_id,
            sku: sku.to_string(),
            name,
            available: variant.stock,
            requested: quantity,
        }]))
    }

    pub async fn increase_stock<C: ConnectionTrait>(
        conn: &C,
        product_id: Uuid,
        sku: &str,
        quantity: i32,
    ) -> Result<(), ServiceError> {
        ensure_positive(quantity)?;

        let result = ProductVariant::update_many()
            .col_expr(
                product_variant::Column::Stock,
                Expr::col(product_variant::Column::Stock).add(quantity),
            )
            .col_expr(product_variant::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(product_variant::Column::ProductId.eq(product_id))
            .filter(product_variant::Column::Sku.eq(sku))
            .exec(conn)
            .await?;

        if result.rows_affected == 0 {
            return Err(variant_not_found(product_id, sku));
        }
        Ok(())
    }

    /// Checks every request against current stock and returns one shortfall
    /// per line that cannot be served. A missing product or variant counts as
    /// zero available units.
    pub async fn shortfalls<C: ConnectionTrait>(
        conn: &C,
        requests: &[StockRequest],
    ) -> Result<Vec<StockShortfall>, ServiceError> {
        let mut shortfalls = Vec::new();
        for request in requests {
            let product = Self::find_by_id(conn, request.product_id).await?;
            let variant = Self::find_variant(conn, request.product_id, &request.sku).await?;
            let available = variant.map(|v| v.stock).unwrap_or(0);
            if available < request.quantity {
                shortfalls.push(StockShortfall {
                    product_id: request.product_id,
                    sku: request.sku.clone(),
                    name: product
                        .map(|p| p.name)
                        .unwrap_or_else(|| request.name.clone()),
                    available,
                    requested: request.quantity,
                });
            }
        }
        Ok(shortfalls)
    }

    async fn publish_stock(&self, variant: &ProductVariantModel) {
        self.event_sender
            .send_or_log(Event::StockAdjusted {
                product_id: variant.product_id,
                sku: variant.sku.clone(),
                stock: variant.stock,
            })
            .await;
    }
}

async fn insert_variant<C: ConnectionTrait>(
    conn: &C,
    product: &ProductModel,
    input: &NewVariantInput,
    position: i32,
) -> Result<ProductVariantModel, ServiceError> {
    let now = Utc::now();
    let sku = generate_sku(&product.name, input.size, input.color, now.timestamp_millis());

    product_variant::ActiveModel {
        id: Set(Uuid::new_v4()),
        product_id: Set(product.id),
        sku: Set(sku),
        size: Set(input.size),
        color: Set(input.color),
        stock: Set(input.stock),
        price: Set(input.price.unwrap_or(product.base_price)),
        position: Set(position),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(conn)
    .await
    .map_err(|e| ServiceError::from_db_unique(e, "Variant already exists for this product"))
}

/// Quantity wanted from one variant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockRequest {
    pub product_id: Uuid,
    pub sku: String,
    /// Display name used when the product no longer exists
    pub name: String,
    pub quantity: i32,
}

/// Product with its variants in insertion order
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProductDetail {
    #[serde(flatten)]
    pub product: ProductModel,
    pub variants: Vec<ProductVariantModel>,
}

/// Input for creating a product
#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
pub struct CreateProductInput {
    #[validate(length(min = 1, max = 64, message = "Code must be between 1 and 64 characters"))]
    pub code: String,
    #[validate(length(min = 1, max = 255, message = "Name must be between 1 and 255 characters"))]
    pub name: String,
    pub description: Option<String>,
    pub base_price: Decimal,
    #[serde(default)]
    pub images: Vec<String>,
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub variants: Vec<NewVariantInput>,
}

/// Partial product update
#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate, ToSchema)]
pub struct UpdateProductInput {
    #[validate(length(min = 1, max = 64, message = "Code must be between 1 and 64 characters"))]
    pub code: Option<String>,
    #[validate(length(min = 1, max = 255, message = "Name must be between 1 and 255 characters"))]
    pub name: Option<String>,
    pub description: Option<String>,
    pub base_price: Option<Decimal>,
    pub images: Option<Vec<String>>,
    pub category: Option<String>,
    pub tags: Option<Vec<String>>,
}

/// Input for creating a variant
#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
pub struct NewVariantInput {
    pub size: Size,
    pub color: Color,
    #[validate(range(min = 0, message = "Stock cannot be negative"))]
    pub stock: i32,
    /// Defaults to the product base price
    pub price: Option<Decimal>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, ToSchema)]
pub struct UpdateVariantInput {
    pub price: Option<Decimal>,
    pub stock: Option<i32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("Classic Tee", Size::M, Color::Black, 1_700_000_001_234, "CLTE-M-BLK-1234")]
    #[case("Remera oversize negra", Size::Gg, Color::Navy, 42, "REOVNE-GG-NVY-0042")]
    #[case("T", Size::Xs, Color::Gray, 10_000, "T-XS-GRY-0000")]
    #[case("  basic   hoodie ", Size::Xxl, Color::Blue, 99_999, "BAHO-XXL-BLU-9999")]
    fn sku_generation(
        #[case] name: &str,
        #[case] size: Size,
        #[case] color: Color,
        #[case] millis: i64,
        #[case] expected: &str,
    ) {
        assert_eq!(generate_sku(name, size, color, millis), expected);
    }

    #[test]
    fn color_codes() {
        let codes: Vec<&str> = [
            Color::Black,
            Color::White,
            Color::Gray,
            Color::Navy,
            Color::Red,
            Color::Blue,
        ]
        .iter()
        .map(|c| c.code())
        .collect();
        assert_eq!(codes, vec!["BLK", "WHT", "GRY", "NVY", "RED", "BLU"]);
    }

    #[test]
    fn non_positive_quantities_are_rejected() {
        assert!(ensure_positive(0).is_err());
        assert!(ensure_positive(-3).is_err());
        assert!(ensure_positive(1).is_ok());
    }
}
