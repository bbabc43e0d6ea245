use std::sync::Arc;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, IntoActiveModel, QueryFilter, QueryOrder, TransactionTrait,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    config::AppConfig,
    entities::{
        order::{Entity as OrderEntity, Model as OrderModel, OrderStatus, PaymentStatus},
        order_status_history::{self, Entity as StatusHistory},
    },
    errors::ServiceError,
    events::{Event, EventSender},
};

/// Transition table used when strict transitions are enabled. Refunds are
/// always allowed, and re-applying the current status is a no-op.
pub fn is_valid_transition(from: OrderStatus, to: OrderStatus) -> bool {
    use OrderStatus::*;

    if from == to || to == Refunded {
        return true;
    }

    matches!(
        (from, to),
        (Pending, Processing)
            | (Pending, Cancelled)
            | (Processing, Shipped)
            | (Processing, Cancelled)
            | (Shipped, Delivered)
    )
}

/// Audit entries for an order, newest first
pub async fn history_on<C>(
    conn: &C,
    order_id: Uuid,
) -> Result<Vec<order_status_history::Model>, ServiceError>
where
    C: ConnectionTrait,
{
    Ok(StatusHistory::find()
        .filter(order_status_history::Column::OrderId.eq(order_id))
        .order_by_desc(order_status_history::Column::Id)
        .all(conn)
        .await?)
}

pub async fn latest_event_on<C>(
    conn: &C,
    order_id: Uuid,
) -> Result<Option<order_status_history::Model>, ServiceError>
where
    C: ConnectionTrait,
{
    Ok(StatusHistory::find()
        .filter(order_status_history::Column::OrderId.eq(order_id))
        .order_by_desc(order_status_history::Column::Id)
        .one(conn)
        .await?)
}

pub async fn append_event_on<C>(
    conn: &C,
    order_id: Uuid,
    status: OrderStatus,
    note: Option<String>,
    actor_id: Option<Uuid>,
) -> Result<order_status_history::Model, ServiceError>
where
    C: ConnectionTrait,
{
    let event = order_status_history::ActiveModel {
        order_id: Set(order_id),
        status: Set(status),
        note: Set(note.filter(|n| !n.trim().is_empty())),
        actor_id: Set(actor_id),
        created_at: Set(Utc::now()),
        ..Default::default()
    };
    Ok(event.insert(conn).await?)
}

#[derive(Clone)]
pub struct OrderStatusService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    config: Arc<AppConfig>,
}

impl OrderStatusService {
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

    /// Sets the order status. An audit entry is appended only when the new
    /// status differs from the most recent entry, so repeats are silent.
    #[instrument(skip(self, note), fields(order_id = %order_id, new_status = %new_status))]
    pub async fn update_status(
        &self,
        order_id: Uuid,
        new_status: OrderStatus,
        note: Option<String>,
        actor_id: Option<Uuid>,
    ) -> Result<OrderModel, ServiceError> {
        let txn = self.db.begin().await?;

        let order = OrderEntity::find_by_id(order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let old_status = order.status;
        if self.config.strict_status_transitions && !is_valid_transition(old_status, new_status) {
            warn!(%old_status, %new_status, "rejected order status transition");
            return Err(ServiceError::InvalidStatus(format!(
                "Cannot transition from status '{}' to '{}'",
                old_status, new_status
            )));
        }

        let mut active = order.into_active_model();
        active.status = Set(new_status);
        let order = active.update(&txn).await?;

        let latest = latest_event_on(&txn, order_id).await?;
        if latest.map(|e| e.status) != Some(new_status) {
            append_event_on(&txn, order_id, new_status, note, actor_id).await?;
        }

        txn.commit().await?;

        if old_status != new_status {
            info!(%old_status, %new_status, "order status updated");
            self.event_sender
                .send_or_log(Event::OrderStatusChanged {
                    order_id,
                    old_status,
                    new_status,
                })
                .await;
        }

        Ok(order)
    }

    /// Sets the payment status. Payment changes are not audited.
    #[instrument(skip(self))]
    pub async fn update_payment_status(
        &self,
        order_id: Uuid,
        new_status: PaymentStatus,
    ) -> Result<OrderModel, ServiceError> {
        let order = OrderEntity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let old_status = order.payment_status;
        let mut active = order.into_active_model();
        active.payment_status = Set(new_status);
        let order = active.update(&*self.db).await?;

        if old_status != new_status {
            self.event_sender
                .send_or_log(Event::PaymentStatusChanged {
                    order_id,
                    old_status,
                    new_status,
                })
                .await;
        }

        Ok(order)
    }

    #[instrument(skip(self))]
    pub async fn history(
        &self,
        order_id: Uuid,
    ) -> Result<Vec<order_status_history::Model>, ServiceError> {
        if OrderEntity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .is_none()
        {
            return Err(ServiceError::NotFound(format!("Order {} not found", order_id)));
        }
        history_on(&*self.db, order_id).await
    }
}
