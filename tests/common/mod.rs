#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Method, Request},
    Router,
};
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, Set};
use serde_json::Value;
use storefront_api::{
    config::AppConfig,
    db,
    entities::{
        commerce::{coupon, product_variant, DiscountType},
        product, CatalogReference,
    },
    events::{self, Event, EventSender},
    handlers::common::{SESSION_ID_HEADER, USER_ID_HEADER},
    AppState,
};
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

/// Helper harness for spinning up an application state backed by a fresh
/// in-memory SQLite database.
pub struct TestApp {
    router: Router,
    pub state: Arc<AppState>,
    _event_task: Option<tokio::task::JoinHandle<()>>,
}

fn test_config() -> AppConfig {
    let mut cfg = AppConfig::new(
        "sqlite::memory:".to_string(),
        "127.0.0.1".to_string(),
        18_080,
        "test".to_string(),
    );
    cfg.auto_migrate = true;
    cfg.db_max_connections = 1;
    cfg.db_min_connections = 1;
    cfg
}

impl TestApp {
    /// Construct a new test application with events drained by the logging processor.
    pub async fn new() -> Self {
        Self::with_config(test_config()).await
    }

    pub async fn with_config(cfg: AppConfig) -> Self {
        let (event_tx, event_rx) = mpsc::channel(1024);
        let event_task = tokio::spawn(events::process_events(event_rx));
        Self::build(cfg, event_tx, Some(event_task)).await
    }

    /// Test application whose domain events are handed back to the caller.
    pub async fn capturing_events() -> (Self, mpsc::Receiver<Event>) {
        Self::capturing_events_with_config(test_config()).await
    }

    pub async fn capturing_events_with_config(cfg: AppConfig) -> (Self, mpsc::Receiver<Event>) {
        let (event_tx, event_rx) = mpsc::channel(1024);
        (Self::build(cfg, event_tx, None).await, event_rx)
    }

    async fn build(
        cfg: AppConfig,
        event_tx: mpsc::Sender<Event>,
        event_task: Option<tokio::task::JoinHandle<()>>,
    ) -> Self {
        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let state = Arc::new(AppState::new(
            Arc::new(pool),
            Arc::new(cfg),
            Arc::new(EventSender::new(event_tx)),
        ));
        let router = storefront_api::build_router(state.clone());

        Self {
            router,
            state,
            _event_task: event_task,
        }
    }

    /// Send a request against the router. `user` and `session` become the
    /// caller identity headers.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        user: Option<Uuid>,
        session: Option<&str>,
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);

        if let Some(user_id) = user {
            builder = builder.header(USER_ID_HEADER, user_id.to_string());
        }
        if let Some(session_id) = session {
            builder = builder.header(SESSION_ID_HEADER, session_id);
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    pub async fn seed_product(&self, sku: &str, price: Decimal) -> product::Model {
        let now = Utc::now();
        product::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(format!("Product {}", sku)),
            sku: Set(sku.to_string()),
            price: Set(price),
            sale_price: Set(None),
            is_on_sale: Set(false),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed product for tests")
    }

    pub async fn seed_variant(
        &self,
        product: &product::Model,
        sku: &str,
        price: Decimal,
    ) -> product_variant::Model {
        let now = Utc::now();
        product_variant::ActiveModel {
            id: Set(Uuid::new_v4()),
            product_id: Set(product.id),
            name: Set(format!("Variant {}", sku)),
            sku: Set(sku.to_string()),
            price: Set(price),
            sale_price: Set(None),
            is_on_sale: Set(false),
            is_default: Set(false),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed product variant for tests")
    }

    pub async fn seed_coupon(
        &self,
        code: &str,
        discount_type: DiscountType,
        value: Decimal,
        minimum: Decimal,
        max_uses: i32,
    ) -> coupon::Model {
        let now = Utc::now();
        coupon::ActiveModel {
            id: Set(Uuid::new_v4()),
            code: Set(code.to_string()),
            description: Set(format!("{} test coupon", code)),
            discount_type: Set(discount_type),
            discount_value: Set(value),
            minimum_order_amount: Set(minimum),
            is_active: Set(true),
            valid_from: Set(now - Duration::days(1)),
            valid_to: Set(now + Duration::days(30)),
            max_uses: Set(max_uses),
            times_used: Set(0),
            created_at: Set(now),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed coupon for tests")
    }

    pub async fn seed_stock(&self, reference: CatalogReference, quantity: i32) {
        self.state
            .services
            .inventory
            .set_stock(reference, quantity, None)
            .await
            .expect("seed stock for tests");
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        if let Some(task) = self._event_task.take() {
            task.abort();
        }
    }
}

/// Read a JSON response body
pub async fn response_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read response body");
    serde_json::from_slice(&bytes).expect("response body is JSON")
}

/// Collects every event currently buffered on the channel.
pub fn drain_events(rx: &mut mpsc::Receiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
