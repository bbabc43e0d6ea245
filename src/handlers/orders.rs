use crate::handlers::common::{
    created_response, map_service_error, success_response, validate_input, CallerIdentity,
};
use crate::{
    entities::{OrderStatus, PaymentStatus},
    errors::{ApiError, ServiceError},
    services::{
        orders::{CreateOrderInput, OrderDetails},
        payments::RecordPaymentInput,
    },
    AppState,
};
use axum::{
    extract::{Json, Path, State},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use super::commerce::checkout::checkout_from_cart;

/// Creates the router for order endpoints
pub fn orders_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(create_order).get(list_orders))
        .route("/checkout", post(checkout_from_cart))
        .route("/number/:order_number", get(get_order_by_number))
        .route("/:id", get(get_order))
        .route("/:id/status", post(update_status))
        .route("/:id/payment-status", post(update_payment_status))
        .route("/:id/payments", get(list_payments).post(record_payment))
}

/// Orders are only visible to the user who placed them.
fn ensure_owner(details: &OrderDetails, user_id: Uuid) -> Result<(), ApiError> {
    if details.order.user_id != Some(user_id) {
        return Err(ApiError::ServiceError(ServiceError::NotFound(format!(
            "Order {} not found",
            details.order.id
        ))));
    }
    Ok(())
}

/// Place an order from an explicit item list (guest checkout allowed)
async fn create_order(
    State(state): State<Arc<AppState>>,
    identity: CallerIdentity,
    Json(mut payload): Json<CreateOrderInput>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    payload.user_id = identity.user_id;

    let order = state
        .services
        .checkout
        .place_order(payload)
        .await
        .map_err(map_service_error)?;

    Ok(created_response(order))
}

/// Orders of the calling user
async fn list_orders(
    State(state): State<Arc<AppState>>,
    identity: CallerIdentity,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = identity.require_user()?;
    let orders = state
        .services
        .orders
        .list_for_user(user_id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(orders))
}

async fn get_order(
    State(state): State<Arc<AppState>>,
    identity: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = identity.require_user()?;
    let details = state
        .services
        .orders
        .get_order(id)
        .await
        .map_err(map_service_error)?;
    ensure_owner(&details, user_id)?;

    Ok(success_response(details))
}

async fn get_order_by_number(
    State(state): State<Arc<AppState>>,
    identity: CallerIdentity,
    Path(order_number): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = identity.require_user()?;
    let details = state
        .services
        .orders
        .find_by_number(&order_number)
        .await
        .map_err(map_service_error)?;
    ensure_owner(&details, user_id)?;

    Ok(success_response(details))
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateStatusRequest {
    pub status: OrderStatus,
    #[serde(default)]
    #[validate(length(max = 1000))]
    pub note: Option<String>,
}

async fn update_status(
    State(state): State<Arc<AppState>>,
    identity: CallerIdentity,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;

    let order = state
        .services
        .order_status
        .update_status(id, payload.status, payload.note, identity.user_id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(order))
}

#[derive(Debug, Deserialize)]
pub struct UpdatePaymentStatusRequest {
    pub payment_status: PaymentStatus,
}

async fn update_payment_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdatePaymentStatusRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let order = state
        .services
        .order_status
        .update_payment_status(id, payload.payment_status)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(order))
}

/// Payments of one of the caller's orders
async fn list_payments(
    State(state): State<Arc<AppState>>,
    identity: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = identity.require_user()?;
    let details = state
        .services
        .orders
        .get_order(id)
        .await
        .map_err(map_service_error)?;
    ensure_owner(&details, user_id)?;

    Ok(success_response(details.payments))
}

async fn record_payment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<RecordPaymentInput>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;

    let payment = state
        .services
        .payments
        .record(id, payload)
        .await
        .map_err(map_service_error)?;

    Ok(created_response(payment))
}
