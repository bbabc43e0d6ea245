use crate::{
    entities::{
        commerce::{cart, cart_item, Cart, CartItem, CartModel},
        CatalogReference,
    },
    errors::{is_unique_violation, ServiceError},
    events::{Event, EventSender},
    services::commerce::catalog_service::{find_entry_on, get_active_on},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::{Expr, OnConflict},
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    IntoActiveModel, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Who a cart belongs to. Identity is resolved upstream; carts never authenticate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "lowercase")]
pub enum CartOwner {
    User(Uuid),
    Session(String),
}

/// Cart line with its live catalog price
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PricedLine {
    pub id: Uuid,
    pub reference: CatalogReference,
    pub quantity: i32,
    pub saved_for_later: bool,
    /// False once the catalog entry has been deleted. Such a line prices at
    /// zero and must be removed before checkout.
    pub available: bool,
    pub name: Option<String>,
    pub variant_name: Option<String>,
    pub sku: Option<String>,
    pub unit_price: Decimal,
    pub line_total: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Read model of a cart: priced active lines, saved lines and totals
#[derive(Debug, Clone, Serialize)]
pub struct CartView {
    pub cart: CartModel,
    pub items: Vec<PricedLine>,
    pub saved_items: Vec<PricedLine>,
    pub total_items: i64,
    pub subtotal: Decimal,
    pub is_empty: bool,
}

impl CartView {
    /// Splits lines into active and saved. Totals only count active lines.
    pub fn from_lines(cart: CartModel, lines: Vec<PricedLine>) -> Self {
        let (saved_items, items): (Vec<_>, Vec<_>) =
            lines.into_iter().partition(|line| line.saved_for_later);

        let total_items = items.iter().map(|l| i64::from(l.quantity)).sum();
        let subtotal = items.iter().map(|l| l.line_total).sum();

        Self {
            cart,
            is_empty: items.is_empty(),
            items,
            saved_items,
            total_items,
            subtotal,
        }
    }
}

/// Prices each line at the catalog's current price. Lines whose entry has
/// disappeared price at zero.
pub async fn price_lines_on<C>(
    conn: &C,
    lines: Vec<cart_item::Model>,
) -> Result<Vec<PricedLine>, ServiceError>
where
    C: ConnectionTrait,
{
    let mut priced = Vec::with_capacity(lines.len());
    for line in lines {
        let reference = line.reference();
        let entry = find_entry_on(conn, reference).await?;
        if entry.is_none() {
            warn!(%reference, line_id = %line.id, "cart line references a missing catalog entry");
        }

        let unit_price = entry
            .as_ref()
            .map(|e| e.current_price())
            .unwrap_or(Decimal::ZERO);

        priced.push(PricedLine {
            id: line.id,
            reference,
            quantity: line.quantity,
            saved_for_later: line.saved_for_later,
            available: entry.is_some(),
            name: entry.as_ref().map(|e| e.name.clone()),
            variant_name: entry.as_ref().and_then(|e| e.variant_name.clone()),
            sku: entry.map(|e| e.sku),
            unit_price,
            line_total: unit_price * Decimal::from(line.quantity),
            created_at: line.created_at,
            updated_at: line.updated_at,
        });
    }
    Ok(priced)
}

/// Loads the lines of a cart, oldest first, optionally filtered by the saved flag.
pub async fn load_lines_on<C>(
    conn: &C,
    cart_id: Uuid,
    saved_for_later: Option<bool>,
) -> Result<Vec<cart_item::Model>, ServiceError>
where
    C: ConnectionTrait,
{
    let mut query = CartItem::find().filter(cart_item::Column::CartId.eq(cart_id));
    if let Some(saved) = saved_for_later {
        query = query.filter(cart_item::Column::SavedForLater.eq(saved));
    }
    Ok(query
        .order_by_asc(cart_item::Column::CreatedAt)
        .all(conn)
        .await?)
}

/// Bumps `updated_at`; fails with `NotFound` if the cart does not exist.
pub async fn touch_cart_on<C>(conn: &C, cart_id: Uuid) -> Result<(), ServiceError>
where
    C: ConnectionTrait,
{
    let result = Cart::update_many()
        .col_expr(cart::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(cart::Column::Id.eq(cart_id))
        .exec(conn)
        .await?;

    if result.rows_affected == 0 {
        return Err(ServiceError::NotFound(format!("Cart {} not found", cart_id)));
    }
    Ok(())
}

async fn find_line_on<C>(
    conn: &C,
    cart_id: Uuid,
    reference: CatalogReference,
    saved_for_later: bool,
) -> Result<Option<cart_item::Model>, ServiceError>
where
    C: ConnectionTrait,
{
    Ok(CartItem::find()
        .filter(cart_item::Column::CartId.eq(cart_id))
        .filter(cart_item::Column::ReferenceKind.eq(reference.kind()))
        .filter(cart_item::Column::ReferenceId.eq(reference.id()))
        .filter(cart_item::Column::SavedForLater.eq(saved_for_later))
        .one(conn)
        .await?)
}

/// Upper bound on the quantity a single cart line may hold
pub const MAX_LINE_QUANTITY: i32 = 10_000;

fn validate_quantity(quantity: i32) -> Result<(), ServiceError> {
    if quantity < 1 {
        return Err(ServiceError::ValidationError(
            "Quantity must be at least 1".to_string(),
        ));
    }
    if quantity > MAX_LINE_QUANTITY {
        return Err(ServiceError::ValidationError(format!(
            "Quantity cannot exceed {}",
            MAX_LINE_QUANTITY
        )));
    }
    Ok(())
}

/// Sum of two line quantities, rejected when it leaves the allowed range.
fn combine_quantities(current: i32, added: i32) -> Result<i32, ServiceError> {
    let combined = current.checked_add(added).ok_or_else(|| {
        ServiceError::ValidationError(format!(
            "Quantity cannot exceed {}",
            MAX_LINE_QUANTITY
        ))
    })?;
    validate_quantity(combined)?;
    Ok(combined)
}

/// Shopping cart service.
///
/// Owns cart lifecycle (lazy creation, anonymous-to-user merge) and line
/// mutations. Every mutation runs in one transaction that also touches the
/// cart's `updated_at`.
#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl CartService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    async fn find_by_owner(&self, owner: &CartOwner) -> Result<Option<CartModel>, ServiceError> {
        let query = match owner {
            CartOwner::User(user_id) => Cart::find().filter(cart::Column::UserId.eq(*user_id)),
            CartOwner::Session(session_id) => Cart::find()
                .filter(cart::Column::SessionId.eq(session_id.as_str()))
                .filter(cart::Column::UserId.is_null()),
        };
        Ok(query.one(&*self.db).await?)
    }

    /// Returns the owner's cart, creating it on first use. Losing a creation
    /// race to a concurrent request returns the winner's cart.
    #[instrument(skip(self))]
    pub async fn get_or_create(&self, owner: CartOwner) -> Result<CartModel, ServiceError> {
        if let Some(existing) = self.find_by_owner(&owner).await? {
            return Ok(existing);
        }

        let now = Utc::now();
        let (user_id, session_id) = match &owner {
            CartOwner::User(id) => (Some(*id), None),
            CartOwner::Session(session) => (None, Some(session.clone())),
        };

        let cart = cart::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            session_id: Set(session_id),
            version: Set(0),
            created_at: Set(now),
            updated_at: Set(now),
        };

        match cart.insert(&*self.db).await {
            Ok(cart) => {
                info!(cart_id = %cart.id, "created cart");
                self.event_sender
                    .send_or_log(Event::CartCreated(cart.id))
                    .await;
                Ok(cart)
            }
            Err(err) if is_unique_violation(&err) => {
                debug!("cart creation raced; reading the existing cart");
                self.find_by_owner(&owner).await?.ok_or_else(|| {
                    ServiceError::InternalError("cart vanished after unique violation".to_string())
                })
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Request-level cart lookup. A known user gets their own cart with any
    /// session cart folded in; an anonymous caller gets the session cart.
    #[instrument(skip(self))]
    pub async fn resolve(
        &self,
        user_id: Option<Uuid>,
        session_id: Option<String>,
    ) -> Result<CartModel, ServiceError> {
        match (user_id, session_id) {
            (Some(user_id), session_id) => {
                let cart = self.get_or_create(CartOwner::User(user_id)).await?;
                if let Some(session_id) = session_id {
                    if let Some(session_cart) =
                        self.find_by_owner(&CartOwner::Session(session_id)).await?
                    {
                        self.merge(cart.id, Some(session_cart.id)).await?;
                    }
                }
                Ok(cart)
            }
            (None, Some(session_id)) => self.get_or_create(CartOwner::Session(session_id)).await,
            (None, None) => Err(ServiceError::ValidationError(
                "a user id or session id is required".to_string(),
            )),
        }
    }

    /// Adds `quantity` of a catalog entry, summing into an existing active line.
    #[instrument(skip(self))]
    pub async fn add_line(
        &self,
        cart_id: Uuid,
        reference: CatalogReference,
        quantity: i32,
    ) -> Result<cart_item::Model, ServiceError> {
        validate_quantity(quantity)?;

        let txn = self.db.begin().await?;
        touch_cart_on(&txn, cart_id).await?;

        get_active_on(&txn, reference).await.map_err(|e| match e {
            ServiceError::NotFound(msg) | ServiceError::Inactive(msg) => {
                ServiceError::InvalidReference(msg)
            }
            other => other,
        })?;

        let now = Utc::now();
        let line = cart_item::ActiveModel {
            id: Set(Uuid::new_v4()),
            cart_id: Set(cart_id),
            reference_kind: Set(reference.kind()),
            reference_id: Set(reference.id()),
            quantity: Set(quantity),
            saved_for_later: Set(false),
            created_at: Set(now),
            updated_at: Set(now),
        };

        CartItem::insert(line)
            .on_conflict(
                OnConflict::columns([
                    cart_item::Column::CartId,
                    cart_item::Column::ReferenceKind,
                    cart_item::Column::ReferenceId,
                    cart_item::Column::SavedForLater,
                ])
                .value(
                    cart_item::Column::Quantity,
                    Expr::col((CartItem, cart_item::Column::Quantity)).add(quantity),
                )
                .value(cart_item::Column::UpdatedAt, now)
                .to_owned(),
            )
            .exec_without_returning(&txn)
            .await?;

        let line = find_line_on(&txn, cart_id, reference, false)
            .await?
            .ok_or_else(|| ServiceError::InternalError("cart line missing after upsert".to_string()))?;
        // Both operands are bounded, so the stored sum fits; reject it before commit.
        validate_quantity(line.quantity)?;

        txn.commit().await?;

        info!(%cart_id, %reference, quantity, line_quantity = line.quantity, "added to cart");
        self.event_sender
            .send_or_log(Event::CartItemAdded {
                cart_id,
                reference,
                quantity,
            })
            .await;

        Ok(line)
    }

    /// Sets the quantity of an active line.
    #[instrument(skip(self))]
    pub async fn update_quantity(
        &self,
        cart_id: Uuid,
        line_id: Uuid,
        quantity: i32,
    ) -> Result<cart_item::Model, ServiceError> {
        validate_quantity(quantity)?;

        let txn = self.db.begin().await?;
        touch_cart_on(&txn, cart_id).await?;

        let line = CartItem::find_by_id(line_id)
            .filter(cart_item::Column::CartId.eq(cart_id))
            .filter(cart_item::Column::SavedForLater.eq(false))
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Item {} not found in cart", line_id)))?;

        let mut line = line.into_active_model();
        line.quantity = Set(quantity);
        line.updated_at = Set(Utc::now());
        let line = line.update(&txn).await?;

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartItemUpdated {
                cart_id,
                item_id: line_id,
                quantity,
            })
            .await;

        Ok(line)
    }

    /// Deletes a line, active or saved.
    #[instrument(skip(self))]
    pub async fn remove_line(&self, cart_id: Uuid, line_id: Uuid) -> Result<(), ServiceError> {
        let txn = self.db.begin().await?;
        touch_cart_on(&txn, cart_id).await?;

        let result = CartItem::delete_many()
            .filter(cart_item::Column::Id.eq(line_id))
            .filter(cart_item::Column::CartId.eq(cart_id))
            .exec(&txn)
            .await?;

        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound(format!(
                "Item {} not found in cart",
                line_id
            )));
        }

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartItemRemoved {
                cart_id,
                item_id: line_id,
            })
            .await;
        Ok(())
    }

    /// Moves an active line to the saved list.
    #[instrument(skip(self))]
    pub async fn save_for_later(
        &self,
        cart_id: Uuid,
        line_id: Uuid,
    ) -> Result<cart_item::Model, ServiceError> {
        let line = self.relocate(cart_id, line_id, true).await?;
        self.event_sender
            .send_or_log(Event::CartItemSavedForLater {
                cart_id,
                item_id: line.id,
            })
            .await;
        Ok(line)
    }

    /// Moves a saved line back to the active list.
    #[instrument(skip(self))]
    pub async fn move_to_cart(
        &self,
        cart_id: Uuid,
        line_id: Uuid,
    ) -> Result<cart_item::Model, ServiceError> {
        let line = self.relocate(cart_id, line_id, false).await?;
        self.event_sender
            .send_or_log(Event::CartItemMovedToCart {
                cart_id,
                item_id: line.id,
            })
            .await;
        Ok(line)
    }

    /// Flips a line's saved flag. If the other list already holds the same
    /// reference, the quantities are combined into that line and the moved
    /// line is deleted.
    async fn relocate(
        &self,
        cart_id: Uuid,
        line_id: Uuid,
        to_saved: bool,
    ) -> Result<cart_item::Model, ServiceError> {
        let txn = self.db.begin().await?;
        touch_cart_on(&txn, cart_id).await?;

        let line = CartItem::find_by_id(line_id)
            .filter(cart_item::Column::CartId.eq(cart_id))
            .filter(cart_item::Column::SavedForLater.eq(!to_saved))
            .one(&txn)
            .await?
            .ok_or_else(|| {
                if to_saved {
                    ServiceError::NotFound(format!("Item {} not found in cart", line_id))
                } else {
                    ServiceError::NotFound(format!("Saved item {} not found", line_id))
                }
            })?;

        let now = Utc::now();
        let moved = match find_line_on(&txn, cart_id, line.reference(), to_saved).await? {
            Some(existing) => {
                let combined = combine_quantities(existing.quantity, line.quantity)?;
                let mut existing = existing.into_active_model();
                existing.quantity = Set(combined);
                existing.updated_at = Set(now);
                let existing = existing.update(&txn).await?;
                CartItem::delete_by_id(line.id).exec(&txn).await?;
                existing
            }
            None => {
                let mut line = line.into_active_model();
                line.saved_for_later = Set(to_saved);
                line.updated_at = Set(now);
                line.update(&txn).await?
            }
        };

        txn.commit().await?;
        Ok(moved)
    }

    /// Removes every active line. Saved lines are kept.
    #[instrument(skip(self))]
    pub async fn clear(&self, cart_id: Uuid) -> Result<u64, ServiceError> {
        let txn = self.db.begin().await?;
        touch_cart_on(&txn, cart_id).await?;

        let result = CartItem::delete_many()
            .filter(cart_item::Column::CartId.eq(cart_id))
            .filter(cart_item::Column::SavedForLater.eq(false))
            .exec(&txn)
            .await?;

        txn.commit().await?;

        info!(%cart_id, removed = result.rows_affected, "cart cleared");
        self.event_sender.send_or_log(Event::CartCleared(cart_id)).await;
        Ok(result.rows_affected)
    }

    /// Folds `source` into `target`: matching lines (same reference and saved
    /// flag) are summed, the rest are copied, then the source cart is deleted.
    /// Returns the number of source lines merged; zero when there was nothing
    /// to do.
    #[instrument(skip(self))]
    pub async fn merge(&self, target_id: Uuid, source_id: Option<Uuid>) -> Result<usize, ServiceError> {
        let source_id = match source_id {
            Some(id) if id != target_id => id,
            _ => return Ok(0),
        };

        let txn = self.db.begin().await?;

        if Cart::find_by_id(source_id).one(&txn).await?.is_none() {
            return Ok(0);
        }

        let source_lines = load_lines_on(&txn, source_id, None).await?;
        if source_lines.is_empty() {
            return Ok(0);
        }

        touch_cart_on(&txn, target_id).await?;

        let now = Utc::now();
        for line in &source_lines {
            let reference = line.reference();
            match find_line_on(&txn, target_id, reference, line.saved_for_later).await? {
                Some(existing) => {
                    let combined = combine_quantities(existing.quantity, line.quantity)?;
                    let mut existing = existing.into_active_model();
                    existing.quantity = Set(combined);
                    existing.updated_at = Set(now);
                    existing.update(&txn).await?;
                }
                None => {
                    cart_item::ActiveModel {
                        id: Set(Uuid::new_v4()),
                        cart_id: Set(target_id),
                        reference_kind: Set(line.reference_kind),
                        reference_id: Set(line.reference_id),
                        quantity: Set(line.quantity),
                        saved_for_later: Set(line.saved_for_later),
                        created_at: Set(now),
                        updated_at: Set(now),
                    }
                    .insert(&txn)
                    .await?;
                }
            }
        }

        CartItem::delete_many()
            .filter(cart_item::Column::CartId.eq(source_id))
            .exec(&txn)
            .await?;
        Cart::delete_by_id(source_id).exec(&txn).await?;

        txn.commit().await?;

        let lines = source_lines.len();
        info!(%source_id, %target_id, lines, "merged carts");
        self.event_sender
            .send_or_log(Event::CartMerged {
                source_cart_id: source_id,
                target_cart_id: target_id,
                lines,
            })
            .await;

        Ok(lines)
    }

    /// Cart with priced lines and totals
    #[instrument(skip(self))]
    pub async fn get_cart_view(&self, cart_id: Uuid) -> Result<CartView, ServiceError> {
        let cart = Cart::find_by_id(cart_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Cart {} not found", cart_id)))?;

        let lines = load_lines_on(&*self.db, cart_id, None).await?;
        let priced = price_lines_on(&*self.db, lines).await?;
        Ok(CartView::from_lines(cart, priced))
    }

    /// Saved-for-later lines only
    #[instrument(skip(self))]
    pub async fn saved_lines(&self, cart_id: Uuid) -> Result<Vec<PricedLine>, ServiceError> {
        let lines = load_lines_on(&*self.db, cart_id, Some(true)).await?;
        price_lines_on(&*self.db, lines).await
    }
}
