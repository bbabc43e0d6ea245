use crate::{
    entities::{
        order::{self, Entity as Order, OrderStatus, PaymentStatus},
        order_item::{self, Entity as OrderItem},
        order_status_history, payment, CatalogReference,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        commerce::{
            catalog_service::find_entry_on,
            coupon_service::{redeem_on, validate_on, CouponService},
        },
        order_status::{append_event_on, history_on},
        payments::payments_on,
    },
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    IntoActiveModel, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

/// One requested order line. Exactly one of `product_id` / `variant_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItemInput {
    pub product_id: Option<Uuid>,
    pub variant_id: Option<Uuid>,
    pub quantity: i32,
    /// Unit price charged for this line
    pub price: Decimal,
}

impl OrderItemInput {
    pub fn for_reference(reference: CatalogReference, quantity: i32, price: Decimal) -> Self {
        let (product_id, variant_id) = match reference {
            CatalogReference::Product(id) => (Some(id), None),
            CatalogReference::Variant(id) => (None, Some(id)),
        };
        Self {
            product_id,
            variant_id,
            quantity,
            price,
        }
    }

    pub fn reference(&self) -> Result<CatalogReference, ServiceError> {
        CatalogReference::from_ids(self.product_id, self.variant_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateOrderInput {
    /// Resolved from the caller's identity, never from the payload
    #[serde(skip_deserializing)]
    pub user_id: Option<Uuid>,
    #[validate(email)]
    pub email: String,
    #[serde(default)]
    pub shipping_address_id: Option<Uuid>,
    #[serde(default)]
    pub billing_address_id: Option<Uuid>,
    #[serde(default)]
    pub shipping_method: Option<String>,
    #[serde(default)]
    pub shipping_cost: Decimal,
    #[serde(default)]
    pub tax_amount: Decimal,
    /// Replaced by the coupon discount when `coupon_code` is set
    #[serde(default)]
    pub discount_amount: Decimal,
    #[serde(default)]
    pub coupon_code: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub payment_method: Option<String>,
    #[validate(length(min = 1, message = "An order needs at least one item"))]
    pub items: Vec<OrderItemInput>,
}

/// Order with its frozen lines, status trail and payments (both newest first)
#[derive(Debug, Clone, Serialize)]
pub struct OrderDetails {
    #[serde(flatten)]
    pub order: order::Model,
    pub items: Vec<order_item::Model>,
    pub status_history: Vec<order_status_history::Model>,
    pub payments: Vec<payment::Model>,
}

fn ensure_non_negative(value: Decimal, field: &str) -> Result<(), ServiceError> {
    if value < Decimal::ZERO {
        return Err(ServiceError::ValidationError(format!(
            "{} cannot be negative",
            field
        )));
    }
    Ok(())
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}

/// Builds an order inside the caller's transaction: snapshots each line from
/// the catalog, recomputes the subtotal from the stored lines, applies and
/// redeems the coupon, and records the initial `pending` event.
pub async fn build_order_on<C>(conn: &C, input: &CreateOrderInput) -> Result<OrderDetails, ServiceError>
where
    C: ConnectionTrait,
{
    if input.items.is_empty() {
        return Err(ServiceError::ValidationError(
            "An order needs at least one item".to_string(),
        ));
    }
    ensure_non_negative(input.shipping_cost, "shipping_cost")?;
    ensure_non_negative(input.tax_amount, "tax_amount")?;
    ensure_non_negative(input.discount_amount, "discount_amount")?;

    let mut snapshots = Vec::with_capacity(input.items.len());
    for item in &input.items {
        let reference = item.reference()?;
        if item.quantity < 1 {
            return Err(ServiceError::ValidationError(format!(
                "Quantity for {} must be at least 1",
                reference
            )));
        }
        ensure_non_negative(item.price, "price")?;

        let entry = find_entry_on(conn, reference).await?.ok_or_else(|| {
            ServiceError::InvalidReference(format!("{} does not exist", reference))
        })?;
        snapshots.push((item, entry));
    }

    let now = Utc::now();
    let order_id = Uuid::new_v4();
    let header = order::ActiveModel {
        id: Set(order_id),
        user_id: Set(input.user_id),
        email: Set(input.email.trim().to_string()),
        is_guest_checkout: Set(input.user_id.is_none()),
        status: Set(OrderStatus::Pending),
        payment_status: Set(PaymentStatus::Pending),
        payment_method: Set(non_empty(&input.payment_method)),
        shipping_address_id: Set(input.shipping_address_id),
        billing_address_id: Set(input.billing_address_id),
        shipping_method: Set(non_empty(&input.shipping_method)),
        tracking_number: Set(None),
        coupon_code: Set(None),
        notes: Set(non_empty(&input.notes)),
        subtotal: Set(Decimal::ZERO),
        shipping_cost: Set(input.shipping_cost),
        tax_amount: Set(input.tax_amount),
        discount_amount: Set(input.discount_amount),
        total: Set(Decimal::ZERO),
        created_at: Set(now),
        ..Default::default()
    }
    .insert(conn)
    .await?;

    for (item, entry) in &snapshots {
        order_item::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order_id),
            reference_kind: Set(entry.reference.kind()),
            reference_id: Set(Some(entry.reference.id())),
            product_name: Set(entry.name.clone()),
            variant_name: Set(entry.variant_name.clone()),
            sku: Set(entry.sku.clone()),
            price: Set(item.price),
            quantity: Set(item.quantity),
            total_price: Set(item.price * Decimal::from(item.quantity)),
        }
        .insert(conn)
        .await?;
    }

    let items = OrderItem::find()
        .filter(order_item::Column::OrderId.eq(order_id))
        .all(conn)
        .await?;
    let subtotal: Decimal = items.iter().map(|line| line.total_price).sum();

    let mut header = header.into_active_model();
    header.subtotal = Set(subtotal);

    if let Some(code) = non_empty(&input.coupon_code) {
        let coupon = validate_on(conn, &code, Some(subtotal)).await?;
        let discount = CouponService::compute_discount(&coupon, Some(subtotal));
        redeem_on(conn, coupon.id).await?;
        header.discount_amount = Set(discount);
        header.coupon_code = Set(Some(coupon.code));
    }

    let order = header.update(conn).await?;
    append_event_on(conn, order_id, OrderStatus::Pending, Some("Order placed".to_string()), input.user_id)
        .await?;
    let status_history = history_on(conn, order_id).await?;

    Ok(OrderDetails {
        order,
        items,
        status_history,
        payments: Vec::new(),
    })
}

async fn details_on<C>(conn: &C, order: order::Model) -> Result<OrderDetails, ServiceError>
where
    C: ConnectionTrait,
{
    let items = OrderItem::find()
        .filter(order_item::Column::OrderId.eq(order.id))
        .all(conn)
        .await?;
    let status_history = history_on(conn, order.id).await?;
    let payments = payments_on(conn, order.id).await?;
    Ok(OrderDetails {
        order,
        items,
        status_history,
        payments,
    })
}

/// Order creation and lookup
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl OrderService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Creates an order from an explicit item list in one transaction.
    /// Any failure leaves no order, lines, events or coupon usage behind.
    #[instrument(skip(self, input), fields(items = input.items.len()))]
    pub async fn create_order(&self, input: CreateOrderInput) -> Result<OrderDetails, ServiceError> {
        let txn = self.db.begin().await?;
        let details = build_order_on(&txn, &input).await?;
        txn.commit().await?;

        self.publish_created(&details).await;
        Ok(details)
    }

    pub(crate) async fn publish_created(&self, details: &OrderDetails) {
        let order = &details.order;
        info!(
            order_id = %order.id,
            order_number = %order.order_number,
            total = %order.total,
            "order created"
        );
        self.event_sender
            .send_or_log(Event::OrderCreated(order.id))
            .await;
        if let Some(code) = &order.coupon_code {
            self.event_sender
                .send_or_log(Event::CouponRedeemed {
                    code: code.clone(),
                    order_id: order.id,
                })
                .await;
        }
    }

    #[instrument(skip(self))]
    pub async fn get_order(&self, order_id: Uuid) -> Result<OrderDetails, ServiceError> {
        let order = Order::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;
        details_on(&*self.db, order).await
    }

    /// Orders placed by a user, newest first
    #[instrument(skip(self))]
    pub async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<order::Model>, ServiceError> {
        Ok(Order::find()
            .filter(order::Column::UserId.eq(user_id))
            .order_by_desc(order::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }

    #[instrument(skip(self))]
    pub async fn find_by_number(&self, order_number: &str) -> Result<OrderDetails, ServiceError> {
        let order = Order::find()
            .filter(order::Column::OrderNumber.eq(order_number))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_number)))?;
        details_on(&*self.db, order).await
    }
}
