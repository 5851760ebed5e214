//! Order engine: registered and guest checkout, the status machine,
//! cancellation with stock refund, listing and guest-order linking.

pub mod numbering;

use crate::{
    config::AppConfig,
    entities::{
        cart::CartLine,
        order::{self, OrderItem, OrderItems, OrderStatus, PaymentMethod, PaymentStatus},
        Order, OrderModel, ShippingAddressSnapshot, User,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        addresses,
        carts::{self, stock_requests},
        catalog::{CatalogService, StockRequest},
        Caller,
    },
    PaginatedResponse,
};
use chrono::{Datelike, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection,
    DatabaseTransaction, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

/// Item subtotals and order totals: `subtotal = Σ price × quantity`,
/// `total = subtotal + shipping_cost`.
pub fn compute_totals(items: &[OrderItem], shipping_cost: Decimal) -> (Decimal, Decimal) {
    let subtotal: Decimal = items.iter().map(|i| i.subtotal).sum();
    (subtotal, subtotal + shipping_cost)
}

fn item_from_cart_line(line: &CartLine) -> OrderItem {
    OrderItem {
        product_id: line.product_id,
        variant_sku: line.variant_sku.clone(),
        product_name: line.product_name.clone(),
        product_image: line.product_image.clone(),
        variant_size: line.variant_size,
        variant_color: line.variant_color,
        quantity: line.quantity,
        price: line.price_at_add,
        subtotal: line.line_total(),
    }
}

fn order_not_found(order_id: Uuid) -> ServiceError {
    ServiceError::NotFound(format!("Order {} not found", order_id))
}

/// Merges guest lines that point at the same variant.
fn merge_guest_items(
    items: &[GuestOrderItemInput],
) -> Result<Vec<GuestOrderItemInput>, ServiceError> {
    let mut merged: Vec<GuestOrderItemInput> = Vec::with_capacity(items.len());
    for item in items {
        match merged
            .iter_mut()
            .find(|m| m.product_id == item.product_id && m.variant_sku == item.variant_sku)
        {
            Some(existing) => {
                existing.quantity = existing.quantity.checked_add(item.quantity).ok_or_else(
                    || ServiceError::ValidationError("Quantity too large".to_string()),
                )?;
            }
            None => merged.push(item.clone()),
        }
    }
    Ok(merged)
}

/// Order service
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    config: Arc<AppConfig>,
}

impl OrderService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            db,
            event_sender,
            config,
        }
    }

    fn shipping_cost(&self, requested: Option<Decimal>) -> Result<Decimal, ServiceError> {
        let cost = requested.unwrap_or(self.config.default_shipping_cost);
        if cost < Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Shipping cost cannot be negative".to_string(),
            ));
        }
        Ok(cost)
    }

    /// Turns the caller's cart into an order.
    ///
    /// Everything is validated before the first write: the cart must have
    /// lines, every line must be covered by current stock (all shortfalls
    /// are reported together) and the address must belong to the caller.
    /// Numbering, the insert, the stock reservations and emptying the cart
    /// then run in one transaction. If a reservation loses a race the whole
    /// checkout rolls back with `InsufficientStock`. A cart written to after
    /// it was read rolls back with `Conflict` instead of losing the new lines.
    #[instrument(skip(self, input), fields(address_id = %input.address_id))]
    pub async fn create_order(
        &self,
        user_id: Uuid,
        input: CreateOrderInput,
    ) -> Result<OrderModel, ServiceError> {
        input.validate()?;
        let shipping_cost = self.shipping_cost(input.shipping_cost)?;

        let cart_model = carts::find_for_user(&*self.db, user_id)
            .await?
            .filter(|c| !c.items.0.is_empty())
            .ok_or(ServiceError::EmptyCart)?;

        let shortfalls =
            CatalogService::shortfalls(&*self.db, &stock_requests(&cart_model.items.0)).await?;
        if !shortfalls.is_empty() {
            return Err(ServiceError::InsufficientStock(shortfalls));
        }

        let address = addresses::find_owned(&*self.db, input.address_id, user_id).await?;
        let user = User::find_by_id(user_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("User {} not found", user_id)))?;

        let items: Vec<OrderItem> = cart_model.items.0.iter().map(item_from_cart_line).collect();
        let snapshot = ShippingAddressSnapshot {
            full_name: address.full_name,
            email: user.email,
            street: address.street,
            city: address.city,
            state: address.state,
            zip_code: address.zip_code,
            country: address.country,
            phone: address.phone,
        };

        let txn = self.db.begin().await?;
        let order = insert_order(
            &txn,
            Some(user_id),
            items,
            snapshot,
            shipping_cost,
            input.payment_method,
            input.notes,
        )
        .await?;
        carts::clear_if_unchanged(&txn, &cart_model).await?;
        txn.commit().await?;

        info!(order_id = %order.id, order_number = %order.order_number, total = %order.total, "Created order");
        self.event_sender
            .send_or_log(Event::OrderCreated {
                order_id: order.id,
                order_number: order.order_number.clone(),
                guest: false,
            })
            .await;
        Ok(order)
    }

    /// Checkout without an account. Items are priced at the product base
    /// price and the shipping address comes from the request.
    #[instrument(skip(self, input), fields(items = input.items.len()))]
    pub async fn create_guest_order(
        &self,
        input: CreateGuestOrderInput,
    ) -> Result<OrderModel, ServiceError> {
        input.validate()?;
        input.shipping_address.validate()?;
        if input.items.is_empty() {
            return Err(ServiceError::ValidationError(
                "At least one item is required".to_string(),
            ));
        }
        for item in &input.items {
            item.validate()?;
        }
        let shipping_cost = self.shipping_cost(input.shipping_cost)?;
        let lines = merge_guest_items(&input.items)?;

        let mut items = Vec::with_capacity(lines.len());
        let mut requests = Vec::with_capacity(lines.len());
        for line in &lines {
            let product = CatalogService::find_by_id(&*self.db, line.product_id)
                .await?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("Product {} not found", line.product_id))
                })?;
            let variant = CatalogService::find_variant(&*self.db, product.id, &line.variant_sku)
                .await?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!(
                        "Variant {} not found for product {}",
                        line.variant_sku, product.name
                    ))
                })?;

            requests.push(StockRequest {
                product_id: product.id,
                sku: variant.sku.clone(),
                name: product.name.clone(),
                quantity: line.quantity,
            });
            items.push(OrderItem {
                product_id: product.id,
                variant_sku: variant.sku,
                product_name: product.name.clone(),
                product_image: product.primary_image(),
                variant_size: variant.size,
                variant_color: variant.color,
                quantity: line.quantity,
                price: product.base_price,
                subtotal: product.base_price * Decimal::from(line.quantity),
            });
        }

        let shortfalls = CatalogService::shortfalls(&*self.db, &requests).await?;
        if !shortfalls.is_empty() {
            return Err(ServiceError::InsufficientStock(shortfalls));
        }

        let address = input.shipping_address;
        let snapshot = ShippingAddressSnapshot {
            full_name: address.full_name,
            email: input.email.trim().to_lowercase(),
            street: address.street,
            city: address.city,
            state: address.state,
            zip_code: address.zip_code,
            country: address.country,
            phone: address.phone,
        };

        let txn = self.db.begin().await?;
        let order = insert_order(
            &txn,
            None,
            items,
            snapshot,
            shipping_cost,
            input.payment_method,
            input.notes,
        )
        .await?;
        txn.commit().await?;

        info!(order_id = %order.id, order_number = %order.order_number, "Created guest order");
        self.event_sender
            .send_or_log(Event::OrderCreated {
                order_id: order.id,
                order_number: order.order_number.clone(),
                guest: true,
            })
            .await;
        Ok(order)
    }

    /// Lists orders newest first. Non-admin callers only ever see their own
    /// orders, whatever the filter says.
    #[instrument(skip(self))]
    pub async fn list_orders(
        &self,
        caller: Caller,
        filter: OrderFilter,
    ) -> Result<PaginatedResponse<OrderModel>, ServiceError> {
        let page = filter.page.unwrap_or(1).max(1);
        let limit = self.config.page_size(filter.limit);

        let mut query = Order::find();
        if !caller.is_admin() {
            query = query.filter(order::Column::UserId.eq(caller.user_id));
        }
        match filter.is_guest {
            Some(true) => query = query.filter(order::Column::UserId.is_null()),
            Some(false) => query = query.filter(order::Column::UserId.is_not_null()),
            None => {}
        }
        if let Some(status) = filter.status {
            query = query.filter(order::Column::Status.eq(status));
        }
        if let Some(payment_status) = filter.payment_status {
            query = query.filter(order::Column::PaymentStatus.eq(payment_status));
        }
        if let Some(search) = filter.search.as_deref().map(str::trim) {
            if !search.is_empty() {
                query = query.filter(order::Column::OrderNumber.contains(search.to_uppercase()));
            }
        }
        if let Some(from) = filter.date_from {
            query = query.filter(order::Column::CreatedAt.gte(start_of_day(from)));
        }
        if let Some(to) = filter.date_to {
            // inclusive through the end of that day
            query = query.filter(order::Column::CreatedAt.lt(start_of_day(to) + Duration::days(1)));
        }

        let paginator = query
            .order_by_desc(order::Column::CreatedAt)
            .paginate(&*self.db, limit);
        let total = paginator.num_items().await?;
        let items = paginator.fetch_page(page - 1).await?;

        Ok(PaginatedResponse {
            items,
            total,
            page,
            limit,
            total_pages: total.div_ceil(limit),
        })
    }

    #[instrument(skip(self))]
    pub async fn get_order(&self, order_id: Uuid, caller: Caller) -> Result<OrderModel, ServiceError> {
        let order = Order::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| order_not_found(order_id))?;
        if !caller.is_admin() && !order.is_owned_by(caller.user_id) {
            return Err(order_not_found(order_id));
        }
        Ok(order)
    }

    /// Cancels a pending order and returns its items to stock, atomically.
    /// Owners and admins may cancel; anyone else sees `NotFound`.
    #[instrument(skip(self))]
    pub async fn cancel_order(
        &self,
        order_id: Uuid,
        caller: Caller,
    ) -> Result<OrderModel, ServiceError> {
        let txn = self.db.begin().await?;
        let order = Order::find_by_id(order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| order_not_found(order_id))?;
        if !caller.is_admin() && !order.is_owned_by(caller.user_id) {
            return Err(order_not_found(order_id));
        }
        if !order.status.can_transition_to(OrderStatus::Cancelled) {
            return Err(ServiceError::InvalidState(format!(
                "Only pending orders can be cancelled; order {} is {}",
                order.order_number, order.status
            )));
        }

        // Only one concurrent cancel can flip the row and refund.
        let flipped = Order::update_many()
            .col_expr(order::Column::Status, Expr::value(OrderStatus::Cancelled))
            .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::Status.eq(OrderStatus::Pending))
            .exec(&txn)
            .await?;
        if flipped.rows_affected == 0 {
            return Err(ServiceError::InvalidState(format!(
                "Order {} is no longer pending",
                order.order_number
            )));
        }

        for item in &order.items.0 {
            CatalogService::increase_stock(&txn, item.product_id, &item.variant_sku, item.quantity)
                .await?;
        }

        let cancelled = Order::find_by_id(order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| order_not_found(order_id))?;
        txn.commit().await?;

        info!(%order_id, order_number = %cancelled.order_number, "Cancelled order and refunded stock");
        self.event_sender
            .send_or_log(Event::OrderCancelled(order_id))
            .await;
        Ok(cancelled)
    }

    /// Admin status change. A request for `cancelled` goes through
    /// [`Self::cancel_order`] so stock is refunded.
    #[instrument(skip(self))]
    pub async fn update_status(
        &self,
        order_id: Uuid,
        status: OrderStatus,
        caller: Caller,
    ) -> Result<OrderModel, ServiceError> {
        caller.require_admin()?;

        if status == OrderStatus::Cancelled {
            let before = self.get_order(order_id, caller).await?;
            let cancelled = self.cancel_order(order_id, caller).await?;
            self.publish_status_change(order_id, before.status, cancelled.status)
                .await;
            return Ok(cancelled);
        }

        let order = self.get_order(order_id, caller).await?;
        if !order.status.can_transition_to(status) {
            return Err(ServiceError::InvalidState(format!(
                "Order {} cannot move from {} to {}",
                order.order_number, order.status, status
            )));
        }

        let updated = Order::update_many()
            .col_expr(order::Column::Status, Expr::value(status))
            .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::Status.eq(order.status))
            .exec(&*self.db)
            .await?;
        if updated.rows_affected == 0 {
            return Err(ServiceError::Conflict(format!(
                "Order {} was modified concurrently",
                order.order_number
            )));
        }

        let old_status = order.status;
        let order = self.get_order(order_id, caller).await?;
        self.publish_status_change(order_id, old_status, order.status)
            .await;
        Ok(order)
    }

    #[instrument(skip(self))]
    pub async fn update_payment_status(
        &self,
        order_id: Uuid,
        payment_status: PaymentStatus,
        caller: Caller,
    ) -> Result<OrderModel, ServiceError> {
        caller.require_admin()?;
        let order = self.get_order(order_id, caller).await?;
        if order.status.is_terminal() {
            return Err(ServiceError::InvalidState(format!(
                "Order {} is cancelled",
                order.order_number
            )));
        }

        let old = order.payment_status;
        let mut active: order::ActiveModel = order.into();
        active.payment_status = Set(payment_status);
        active.updated_at = Set(Utc::now());
        let updated = active.update(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::PaymentStatusChanged {
                order_id,
                old_status: old.to_string(),
                new_status: payment_status.to_string(),
            })
            .await;
        Ok(updated)
    }

    /// Attaches a guest order to `user_id` and returns its shipping snapshot.
    /// Linking again to the same user is a no-op success.
    #[instrument(skip(self))]
    pub async fn link_guest_order(
        &self,
        order_id: Uuid,
        user_id: Uuid,
    ) -> Result<ShippingAddressSnapshot, ServiceError> {
        let outcome = Self::link_with(&*self.db, order_id, user_id).await?;
        if outcome.newly_linked {
            self.event_sender
                .send_or_log(Event::GuestOrderLinked { order_id, user_id })
                .await;
        }
        Ok(outcome.snapshot)
    }

    /// Fails unless the order exists and is either a guest order or
    /// already owned by `user_id`.
    pub async fn ensure_linkable<C: ConnectionTrait>(
        conn: &C,
        order_id: Uuid,
        user_id: Uuid,
    ) -> Result<OrderModel, ServiceError> {
        let order = Order::find_by_id(order_id)
            .one(conn)
            .await?
            .ok_or_else(|| order_not_found(order_id))?;
        match order.user_id {
            None => Ok(order),
            Some(owner) if owner == user_id => Ok(order),
            Some(_) => Err(ServiceError::AlreadyLinked(order_id)),
        }
    }

    pub async fn link_with<C: ConnectionTrait>(
        conn: &C,
        order_id: Uuid,
        user_id: Uuid,
    ) -> Result<LinkOutcome, ServiceError> {
        let order = Self::ensure_linkable(conn, order_id, user_id).await?;
        if order.user_id.is_some() {
            return Ok(LinkOutcome {
                snapshot: order.shipping_address,
                newly_linked: false,
            });
        }

        let linked = Order::update_many()
            .col_expr(order::Column::UserId, Expr::value(user_id))
            .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::UserId.is_null())
            .exec(conn)
            .await?;
        if linked.rows_affected == 0 {
            // Someone linked it in between; same user is still fine.
            let order = Self::ensure_linkable(conn, order_id, user_id).await?;
            return Ok(LinkOutcome {
                snapshot: order.shipping_address,
                newly_linked: false,
            });
        }

        info!(%order_id, %user_id, "Linked guest order");
        Ok(LinkOutcome {
            snapshot: order.shipping_address,
            newly_linked: true,
        })
    }

    async fn publish_status_change(&self, order_id: Uuid, old: OrderStatus, new: OrderStatus) {
        self.event_sender
            .send_or_log(Event::OrderStatusChanged {
                order_id,
                old_status: old.to_string(),
                new_status: new.to_string(),
            })
            .await;
    }
}

/// Result of attaching a guest order to an account
#[derive(Debug, Clone, PartialEq)]
pub struct LinkOutcome {
    pub snapshot: ShippingAddressSnapshot,
    /// False when the order already belonged to the user
    pub newly_linked: bool,
}

/// Numbers, inserts and reserves stock for a new order on `txn`.
async fn insert_order(
    txn: &DatabaseTransaction,
    user_id: Option<Uuid>,
    items: Vec<OrderItem>,
    shipping_address: ShippingAddressSnapshot,
    shipping_cost: Decimal,
    payment_method: PaymentMethod,
    notes: Option<String>,
) -> Result<OrderModel, ServiceError> {
    let now = Utc::now();
    let (subtotal, total) = compute_totals(&items, shipping_cost);
    let order_number = numbering::next_order_number(txn, now.year()).await?;

    let order = order::ActiveModel {
        id: Set(Uuid::new_v4()),
        order_number: Set(order_number.clone()),
        user_id: Set(user_id),
        items: Set(OrderItems(items)),
        shipping_address: Set(shipping_address),
        subtotal: Set(subtotal),
        shipping_cost: Set(shipping_cost),
        total: Set(total),
        status: Set(OrderStatus::Pending),
        payment_method: Set(payment_method),
        payment_status: Set(PaymentStatus::Pending),
        notes: Set(notes),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(txn)
    .await
    .map_err(|e| {
        ServiceError::from_db_unique(e, format!("Order number {} already exists", order_number))
    })?;

    for item in &order.items.0 {
        if let Err(err) =
            CatalogService::decrease_stock(txn, item.product_id, &item.variant_sku, item.quantity)
                .await
        {
            warn!(order_number = %order.order_number, error = %err, "Stock reservation failed, rolling back checkout");
            return Err(err);
        }
    }

    Ok(order)
}

fn start_of_day(date: NaiveDate) -> chrono::DateTime<Utc> {
    date.and_time(chrono::NaiveTime::MIN).and_utc()
}

/// Registered checkout input
#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
pub struct CreateOrderInput {
    pub address_id: Uuid,
    pub payment_method: PaymentMethod,
    /// Defaults to the configured shipping cost
    pub shipping_cost: Option<Decimal>,
    #[validate(length(max = 500, message = "Notes cannot exceed 500 characters"))]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
pub struct GuestOrderItemInput {
    pub product_id: Uuid,
    #[validate(length(min = 1, message = "Variant SKU is required"))]
    pub variant_sku: String,
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: i32,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
pub struct GuestShippingAddress {
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
}

/// Guest checkout input
#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
pub struct CreateGuestOrderInput {
    #[validate(email(message = "A valid email is required"))]
    pub email: String,
    pub items: Vec<GuestOrderItemInput>,
    pub shipping_address: GuestShippingAddress,
    pub payment_method: PaymentMethod,
    pub shipping_cost: Option<Decimal>,
    #[validate(length(max = 500, message = "Notes cannot exceed 500 characters"))]
    pub notes: Option<String>,
}

/// Query parameters for listing orders
#[derive(Debug, Clone, Default, Deserialize, Serialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub payment_status: Option<PaymentStatus>,
    /// Case-insensitive fragment of the order number
    pub search: Option<String>,
    pub date_from: Option<NaiveDate>,
    /// Inclusive
    pub date_to: Option<NaiveDate>,
    pub is_guest: Option<bool>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct UpdateOrderStatusInput {
    pub status: OrderStatus,
}

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct UpdatePaymentStatusInput {
    pub payment_status: PaymentStatus,
}
