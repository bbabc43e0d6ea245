use crate::handlers::common::{created_response, map_service_error, validate_input, CallerIdentity};
use crate::{errors::ApiError, services::commerce::CheckoutInput, AppState};
use axum::{
    extract::{Json, State},
    response::IntoResponse,
};
use std::sync::Arc;

/// Turn the caller's cart into an order
pub async fn checkout_from_cart(
    State(state): State<Arc<AppState>>,
    identity: CallerIdentity,
    Json(payload): Json<CheckoutInput>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;

    let cart = state
        .services
        .cart
        .resolve(identity.user_id, identity.session_id.clone())
        .await
        .map_err(map_service_error)?;

    let order = state
        .services
        .checkout
        .checkout_from_cart(cart.id, payload)
        .await
        .map_err(map_service_error)?;

    Ok(created_response(order))
}
