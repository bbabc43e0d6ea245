use crate::handlers::common::{
    created_response, map_service_error, no_content_response, success_response, validate_input,
};
use crate::{
    errors::ApiError,
    services::commerce::coupon_service::{CreateCouponInput, UpdateCouponInput},
    AppState,
};
use axum::{
    extract::{Json, Path, State},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

pub fn coupons_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_coupons).post(create_coupon))
        .route("/validate", post(validate_coupon))
        .route(
            "/:id",
            get(get_coupon).put(update_coupon).delete(delete_coupon),
        )
        .route("/:id/deactivate", post(deactivate_coupon))
}

#[derive(Debug, Deserialize, Validate)]
pub struct ValidateCouponRequest {
    #[validate(length(min = 1, max = 50))]
    pub code: String,
    #[serde(default)]
    pub order_total: Option<Decimal>,
}

/// Check a coupon code and preview its discount
async fn validate_coupon(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ValidateCouponRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;

    let applied = state
        .services
        .coupons
        .apply(&payload.code, payload.order_total)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(applied))
}

async fn list_coupons(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let coupons = state
        .services
        .coupons
        .list()
        .await
        .map_err(map_service_error)?;
    Ok(success_response(coupons))
}

async fn create_coupon(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateCouponInput>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;

    let coupon = state
        .services
        .coupons
        .create(payload)
        .await
        .map_err(map_service_error)?;
    Ok(created_response(coupon))
}

async fn get_coupon(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let coupon = state
        .services
        .coupons
        .get(id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(coupon))
}

async fn update_coupon(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateCouponInput>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;

    let coupon = state
        .services
        .coupons
        .update(id, payload)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(coupon))
}

async fn deactivate_coupon(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let coupon = state
        .services
        .coupons
        .deactivate(id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(coupon))
}

async fn delete_coupon(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .services
        .coupons
        .delete(id)
        .await
        .map_err(map_service_error)?;
    Ok(no_content_response())
}
