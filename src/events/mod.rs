use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

use rust_decimal::Decimal;

use crate::entities::{payment::TransactionStatus, CatalogReference, OrderStatus, PaymentStatus};

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event, logging instead of failing when the processor is gone.
    /// Domain writes are already committed at this point.
    pub async fn send_or_log(&self, event: Event) {
        let name = event.name();
        if let Err(e) = self.send(event).await {
            warn!(event = name, error = %e, "dropping domain event");
        }
    }
}

/// Domain events published after a unit of work commits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    CartCreated(Uuid),
    CartItemAdded {
        cart_id: Uuid,
        reference: CatalogReference,
        quantity: i32,
    },
    CartItemUpdated {
        cart_id: Uuid,
        item_id: Uuid,
        quantity: i32,
    },
    CartItemRemoved {
        cart_id: Uuid,
        item_id: Uuid,
    },
    CartItemSavedForLater {
        cart_id: Uuid,
        item_id: Uuid,
    },
    CartItemMovedToCart {
        cart_id: Uuid,
        item_id: Uuid,
    },
    CartCleared(Uuid),
    CartMerged {
        source_cart_id: Uuid,
        target_cart_id: Uuid,
        lines: usize,
    },
    CheckoutCompleted {
        cart_id: Uuid,
        order_id: Uuid,
    },
    OrderCreated(Uuid),
    OrderStatusChanged {
        order_id: Uuid,
        old_status: OrderStatus,
        new_status: OrderStatus,
    },
    PaymentStatusChanged {
        order_id: Uuid,
        old_status: PaymentStatus,
        new_status: PaymentStatus,
    },
    PaymentRecorded {
        order_id: Uuid,
        payment_id: Uuid,
        amount: Decimal,
        status: TransactionStatus,
    },
    CouponRedeemed {
        code: String,
        order_id: Uuid,
    },
    InventoryDecremented {
        reference: CatalogReference,
        amount: i32,
    },
    StockUpdated {
        reference: CatalogReference,
        quantity: i32,
        timestamp: DateTime<Utc>,
    },
    AddressCreated {
        user_id: Uuid,
        address_id: Uuid,
    },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::CartCreated(_) => "cart_created",
            Event::CartItemAdded { .. } => "cart_item_added",
            Event::CartItemUpdated { .. } => "cart_item_updated",
            Event::CartItemRemoved { .. } => "cart_item_removed",
            Event::CartItemSavedForLater { .. } => "cart_item_saved_for_later",
            Event::CartItemMovedToCart { .. } => "cart_item_moved_to_cart",
            Event::CartCleared(_) => "cart_cleared",
            Event::CartMerged { .. } => "cart_merged",
            Event::CheckoutCompleted { .. } => "checkout_completed",
            Event::OrderCreated(_) => "order_created",
            Event::OrderStatusChanged { .. } => "order_status_changed",
            Event::PaymentStatusChanged { .. } => "payment_status_changed",
            Event::PaymentRecorded { .. } => "payment_recorded",
            Event::CouponRedeemed { .. } => "coupon_redeemed",
            Event::InventoryDecremented { .. } => "inventory_decremented",
            Event::StockUpdated { .. } => "stock_updated",
            Event::AddressCreated { .. } => "address_created",
        }
    }
}

/// Drains the event channel until every sender is dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::OrderCreated(order_id) => {
                info!(%order_id, "order created");
            }
            Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            } => {
                info!(%order_id, %old_status, %new_status, "order status changed");
            }
            Event::CartMerged {
                source_cart_id,
                target_cart_id,
                lines,
            } => {
                info!(%source_cart_id, %target_cart_id, lines, "anonymous cart merged");
            }
            Event::StockUpdated {
                reference,
                quantity,
                ..
            } if *quantity == 0 => {
                warn!(%reference, "stock depleted");
            }
            other => {
                info!(event = other.name(), payload = ?other, "domain event");
            }
        }
    }

    error!("Event channel closed; event processing loop stopped");
}
