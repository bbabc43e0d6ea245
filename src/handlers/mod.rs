pub mod addresses;
pub mod commerce;
pub mod common;
pub mod health;
pub mod orders;

use crate::config::AppConfig;
use crate::db::DbPool;
use crate::events::EventSender;
use crate::services::{
    addresses::AddressService,
    commerce::{CartService, CatalogService, CheckoutService, CouponService},
    inventory::InventoryService,
    order_status::OrderStatusService,
    orders::OrderService,
    payments::PaymentService,
};
use std::sync::Arc;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub catalog: Arc<CatalogService>,
    pub cart: Arc<CartService>,
    pub coupons: Arc<CouponService>,
    pub inventory: Arc<InventoryService>,
    pub orders: Arc<OrderService>,
    pub order_status: Arc<OrderStatusService>,
    pub checkout: Arc<CheckoutService>,
    pub addresses: Arc<AddressService>,
    pub payments: Arc<PaymentService>,
}

impl AppServices {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>, config: Arc<AppConfig>) -> Self {
        let orders = Arc::new(OrderService::new(db_pool.clone(), event_sender.clone()));

        Self {
            catalog: Arc::new(CatalogService::new(db_pool.clone())),
            cart: Arc::new(CartService::new(db_pool.clone(), event_sender.clone())),
            coupons: Arc::new(CouponService::new(db_pool.clone())),
            inventory: Arc::new(InventoryService::new(db_pool.clone(), event_sender.clone())),
            order_status: Arc::new(OrderStatusService::new(
                db_pool.clone(),
                event_sender.clone(),
                config,
            )),
            checkout: Arc::new(CheckoutService::new(
                db_pool.clone(),
                event_sender.clone(),
                orders.clone(),
            )),
            payments: Arc::new(PaymentService::new(db_pool.clone(), event_sender.clone())),
            addresses: Arc::new(AddressService::new(db_pool, event_sender)),
            orders,
        }
    }
}
