use crate::{
    entities::{
        commerce::{cart, cart_item, Cart, CartItem},
        CatalogReference,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        commerce::cart_service::{load_lines_on, price_lines_on},
        inventory::decrement_on,
        orders::{build_order_on, CreateOrderInput, OrderDetails, OrderItemInput, OrderService},
    },
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument};
use uuid::Uuid;
use validator::Validate;

/// Order details supplied at checkout; the items come from the cart.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct CheckoutInput {
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
    #[serde(default)]
    pub discount_amount: Decimal,
    #[serde(default)]
    pub coupon_code: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub payment_method: Option<String>,
}

impl CheckoutInput {
    fn into_order_input(self, user_id: Option<Uuid>, items: Vec<OrderItemInput>) -> CreateOrderInput {
        CreateOrderInput {
            user_id,
            email: self.email,
            shipping_address_id: self.shipping_address_id,
            billing_address_id: self.billing_address_id,
            shipping_method: self.shipping_method,
            shipping_cost: self.shipping_cost,
            tax_amount: self.tax_amount,
            discount_amount: self.discount_amount,
            coupon_code: self.coupon_code,
            notes: self.notes,
            payment_method: self.payment_method,
            items,
        }
    }
}

/// Checkout service for converting carts to orders
#[derive(Clone)]
pub struct CheckoutService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    order_service: Arc<OrderService>,
}

impl CheckoutService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        order_service: Arc<OrderService>,
    ) -> Self {
        Self {
            db,
            event_sender,
            order_service,
        }
    }

    /// Converts the cart's active lines into an order.
    ///
    /// Runs as one transaction: the cart version is bumped with a
    /// compare-and-set so a concurrent checkout of the same cart fails with
    /// `ConcurrentModification`, then the order is built at live catalog
    /// prices, inventory is decremented and the active lines are deleted.
    /// Saved-for-later lines stay in the cart.
    #[instrument(skip(self, input))]
    pub async fn checkout_from_cart(
        &self,
        cart_id: Uuid,
        input: CheckoutInput,
    ) -> Result<OrderDetails, ServiceError> {
        let txn = self.db.begin().await?;

        let cart = Cart::find_by_id(cart_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Cart {} not found", cart_id)))?;

        let claimed = Cart::update_many()
            .col_expr(
                cart::Column::Version,
                Expr::col((Cart, cart::Column::Version)).add(1),
            )
            .col_expr(cart::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(cart::Column::Id.eq(cart_id))
            .filter(cart::Column::Version.eq(cart.version))
            .exec(&txn)
            .await?;
        if claimed.rows_affected == 0 {
            debug!(%cart_id, version = cart.version, "cart version moved during checkout");
            return Err(ServiceError::ConcurrentModification(cart_id));
        }

        let lines = load_lines_on(&txn, cart_id, Some(false)).await?;
        if lines.is_empty() {
            return Err(ServiceError::ValidationError("Cart is empty".to_string()));
        }

        let priced = price_lines_on(&txn, lines).await?;
        if let Some(dead) = priced.iter().find(|line| !line.available) {
            return Err(ServiceError::InvalidReference(format!(
                "cart item {} refers to {} which is no longer in the catalog; remove it to check out",
                dead.id, dead.reference
            )));
        }

        let items = priced
            .into_iter()
            .map(|line| OrderItemInput::for_reference(line.reference, line.quantity, line.unit_price))
            .collect();

        let order_input = input.into_order_input(cart.user_id, items);
        let details = build_order_on(&txn, &order_input).await?;

        for item in &order_input.items {
            decrement_on(&txn, item.reference()?, item.quantity).await?;
        }

        CartItem::delete_many()
            .filter(cart_item::Column::CartId.eq(cart_id))
            .filter(cart_item::Column::SavedForLater.eq(false))
            .exec(&txn)
            .await?;

        txn.commit().await?;

        info!(%cart_id, order_id = %details.order.id, "checkout completed");
        self.order_service.publish_created(&details).await;
        self.publish_decrements(&order_input).await;
        self.event_sender
            .send_or_log(Event::CheckoutCompleted {
                cart_id,
                order_id: details.order.id,
            })
            .await;

        Ok(details)
    }

    /// Creates an order from an explicit item list and takes its stock, in
    /// one transaction.
    #[instrument(skip(self, input), fields(items = input.items.len()))]
    pub async fn place_order(&self, input: CreateOrderInput) -> Result<OrderDetails, ServiceError> {
        let txn = self.db.begin().await?;
        let details = build_order_on(&txn, &input).await?;

        for item in &input.items {
            decrement_on(&txn, item.reference()?, item.quantity).await?;
        }

        txn.commit().await?;

        self.order_service.publish_created(&details).await;
        self.publish_decrements(&input).await;
        Ok(details)
    }

    async fn publish_decrements(&self, input: &CreateOrderInput) {
        for item in &input.items {
            let reference: Option<CatalogReference> = item.reference().ok();
            if let Some(reference) = reference {
                self.event_sender
                    .send_or_log(Event::InventoryDecremented {
                        reference,
                        amount: item.quantity,
                    })
                    .await;
            }
        }
    }
}
