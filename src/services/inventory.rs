use crate::{
    entities::{
        inventory_record::{self, Entity as InventoryRecord, DEFAULT_LOW_STOCK_THRESHOLD},
        CatalogReference,
    },
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::Utc;
use sea_orm::{
    sea_query::{Expr, OnConflict},
    ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, QueryOrder,
    Set,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Inventory record plus its derived stock predicates
#[derive(Debug, Clone, Serialize)]
pub struct StockLevel {
    #[serde(flatten)]
    pub record: inventory_record::Model,
    pub is_low_stock: bool,
    pub is_in_stock: bool,
}

impl From<inventory_record::Model> for StockLevel {
    fn from(record: inventory_record::Model) -> Self {
        Self {
            is_low_stock: record.is_low_stock(),
            is_in_stock: record.is_in_stock(),
            record,
        }
    }
}

/// Floors the stored quantity at zero in one statement:
/// `quantity = CASE WHEN quantity > amount THEN quantity - amount ELSE 0 END`.
/// Returns the number of rows touched; zero means the reference is untracked.
pub async fn decrement_on<C>(
    conn: &C,
    reference: CatalogReference,
    amount: i32,
) -> Result<u64, ServiceError>
where
    C: ConnectionTrait,
{
    if amount < 0 {
        return Err(ServiceError::ValidationError(
            "decrement amount cannot be negative".to_string(),
        ));
    }

    let quantity = Expr::col((InventoryRecord, inventory_record::Column::Quantity));
    let result = InventoryRecord::update_many()
        .col_expr(
            inventory_record::Column::Quantity,
            Expr::case(quantity.clone().gt(amount), quantity.sub(amount))
                .finally(0)
                .into(),
        )
        .filter(inventory_record::Column::ReferenceKind.eq(reference.kind()))
        .filter(inventory_record::Column::ReferenceId.eq(reference.id()))
        .exec(conn)
        .await?;

    Ok(result.rows_affected)
}

async fn find_on<C>(
    conn: &C,
    reference: CatalogReference,
) -> Result<Option<inventory_record::Model>, DbErr>
where
    C: ConnectionTrait,
{
    InventoryRecord::find()
        .filter(inventory_record::Column::ReferenceKind.eq(reference.kind()))
        .filter(inventory_record::Column::ReferenceId.eq(reference.id()))
        .one(conn)
        .await
}

/// Service for stock bookkeeping per product or variant
#[derive(Clone)]
pub struct InventoryService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl InventoryService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Removes `amount` units, never going below zero. A reference with no
    /// inventory record is silently ignored.
    #[instrument(skip(self))]
    pub async fn decrement(&self, reference: CatalogReference, amount: i32) -> Result<(), ServiceError> {
        let touched = decrement_on(&*self.db, reference, amount).await?;
        if touched == 0 {
            warn!(%reference, "no inventory record to decrement");
            return Ok(());
        }

        self.event_sender
            .send_or_log(Event::InventoryDecremented { reference, amount })
            .await;
        Ok(())
    }

    /// Creates or overwrites the stock level for a reference. The threshold is
    /// left untouched on existing records unless supplied.
    #[instrument(skip(self))]
    pub async fn set_stock(
        &self,
        reference: CatalogReference,
        quantity: i32,
        low_stock_threshold: Option<i32>,
    ) -> Result<StockLevel, ServiceError> {
        if quantity < 0 {
            return Err(ServiceError::ValidationError(
                "stock quantity cannot be negative".to_string(),
            ));
        }
        if matches!(low_stock_threshold, Some(t) if t < 0) {
            return Err(ServiceError::ValidationError(
                "low stock threshold cannot be negative".to_string(),
            ));
        }

        let now = Utc::now();
        let record = inventory_record::ActiveModel {
            id: Set(Uuid::new_v4()),
            reference_kind: Set(reference.kind()),
            reference_id: Set(reference.id()),
            quantity: Set(quantity),
            low_stock_threshold: Set(low_stock_threshold.unwrap_or(DEFAULT_LOW_STOCK_THRESHOLD)),
            last_checked: Set(now),
        };

        let mut update_columns = vec![
            inventory_record::Column::Quantity,
            inventory_record::Column::LastChecked,
        ];
        if low_stock_threshold.is_some() {
            update_columns.push(inventory_record::Column::LowStockThreshold);
        }

        InventoryRecord::insert(record)
            .on_conflict(
                OnConflict::columns([
                    inventory_record::Column::ReferenceKind,
                    inventory_record::Column::ReferenceId,
                ])
                .update_columns(update_columns)
                .to_owned(),
            )
            .exec_without_returning(&*self.db)
            .await?;

        let stored = find_on(&*self.db, reference)
            .await?
            .ok_or_else(|| ServiceError::InternalError(format!("stock for {} vanished", reference)))?;

        info!(%reference, quantity, "stock level set");
        self.event_sender
            .send_or_log(Event::StockUpdated {
                reference,
                quantity,
                timestamp: now,
            })
            .await;

        Ok(stored.into())
    }

    #[instrument(skip(self))]
    pub async fn get(&self, reference: CatalogReference) -> Result<StockLevel, ServiceError> {
        find_on(&*self.db, reference)
            .await?
            .map(StockLevel::from)
            .ok_or_else(|| ServiceError::NotFound(format!("No inventory record for {}", reference)))
    }

    /// Records at or below their low-stock threshold, emptiest first
    #[instrument(skip(self))]
    pub async fn low_stock(&self) -> Result<Vec<StockLevel>, ServiceError> {
        let records = InventoryRecord::find()
            .filter(
                Expr::col((InventoryRecord, inventory_record::Column::Quantity)).lte(Expr::col((
                    InventoryRecord,
                    inventory_record::Column::LowStockThreshold,
                ))),
            )
            .order_by_asc(inventory_record::Column::Quantity)
            .all(&*self.db)
            .await?;

        Ok(records.into_iter().map(StockLevel::from).collect())
    }
}
