use crate::{
    entities::{
        order::{self, Entity as Order},
        payment::{self, Entity as Payment, PaymentMethod, TransactionStatus},
    },
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RecordPaymentInput {
    pub payment_method: PaymentMethod,
    #[serde(default)]
    #[validate(length(max = 255))]
    pub transaction_id: Option<String>,
    pub amount: Decimal,
    #[serde(default = "default_status")]
    pub status: TransactionStatus,
    #[serde(default)]
    pub payment_details: Option<serde_json::Value>,
}

fn default_status() -> TransactionStatus {
    TransactionStatus::Pending
}

/// Payments recorded against an order, newest first
pub async fn payments_on<C>(conn: &C, order_id: Uuid) -> Result<Vec<payment::Model>, ServiceError>
where
    C: ConnectionTrait,
{
    Ok(Payment::find()
        .filter(payment::Column::OrderId.eq(order_id))
        .order_by_desc(payment::Column::CreatedAt)
        .all(conn)
        .await?)
}

async fn ensure_order_on<C>(conn: &C, order_id: Uuid) -> Result<(), ServiceError>
where
    C: ConnectionTrait,
{
    Order::find_by_id(order_id)
        .one(conn)
        .await?
        .map(|_| ())
        .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))
}

/// Ledger of payment transactions. Recording a payment does not change the
/// order's payment status; that stays with the status service.
#[derive(Clone)]
pub struct PaymentService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl PaymentService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Stores a payment for an order. A gateway transaction id also becomes
    /// the order's `payment_id`.
    #[instrument(skip(self, input), fields(method = ?input.payment_method, amount = %input.amount))]
    pub async fn record(
        &self,
        order_id: Uuid,
        input: RecordPaymentInput,
    ) -> Result<payment::Model, ServiceError> {
        input.validate()?;
        if input.amount <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Payment amount must be positive".to_string(),
            ));
        }
        let transaction_id = input
            .transaction_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(String::from);

        let txn = self.db.begin().await?;
        ensure_order_on(&txn, order_id).await?;

        let now = Utc::now();
        let recorded = payment::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order_id),
            payment_method: Set(input.payment_method),
            transaction_id: Set(transaction_id.clone()),
            amount: Set(input.amount),
            status: Set(input.status),
            payment_details: Set(input
                .payment_details
                .unwrap_or_else(|| serde_json::Value::Object(Default::default()))),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        if let Some(transaction_id) = &transaction_id {
            Order::update_many()
                .col_expr(order::Column::PaymentId, Expr::value(transaction_id.clone()))
                .filter(order::Column::Id.eq(order_id))
                .exec(&txn)
                .await?;
        }

        txn.commit().await?;

        info!(%order_id, payment_id = %recorded.id, status = ?recorded.status, "payment recorded");
        self.event_sender
            .send_or_log(Event::PaymentRecorded {
                order_id,
                payment_id: recorded.id,
                amount: recorded.amount,
                status: recorded.status,
            })
            .await;

        Ok(recorded)
    }

    #[instrument(skip(self))]
    pub async fn list_for_order(&self, order_id: Uuid) -> Result<Vec<payment::Model>, ServiceError> {
        ensure_order_on(&*self.db, order_id).await?;
        payments_on(&*self.db, order_id).await
    }
}
