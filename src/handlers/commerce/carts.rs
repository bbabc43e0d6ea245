use crate::handlers::common::{
    map_service_error, no_content_response, success_response, validate_input, CallerIdentity,
};
use crate::{entities::CatalogReference, errors::ApiError, AppState};
use axum::{
    extract::{Json, Path, State},
    response::IntoResponse,
    routing::{get, post, put},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

/// Creates the router for the caller's cart
pub fn carts_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(get_cart))
        .route("/saved", get(saved_items))
        .route("/items", post(add_item))
        .route("/items/:item_id", put(update_item).delete(remove_item))
        .route("/items/:item_id/save-for-later", post(save_for_later))
        .route("/items/:item_id/move-to-cart", post(move_to_cart))
        .route("/clear", post(clear_cart))
}

async fn current_cart_id(state: &AppState, identity: &CallerIdentity) -> Result<Uuid, ApiError> {
    let cart = state
        .services
        .cart
        .resolve(identity.user_id, identity.session_id.clone())
        .await
        .map_err(map_service_error)?;
    Ok(cart.id)
}

/// Get the caller's cart with priced lines
async fn get_cart(
    State(state): State<Arc<AppState>>,
    identity: CallerIdentity,
) -> Result<impl IntoResponse, ApiError> {
    let cart_id = current_cart_id(&state, &identity).await?;
    let view = state
        .services
        .cart
        .get_cart_view(cart_id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(view))
}

async fn saved_items(
    State(state): State<Arc<AppState>>,
    identity: CallerIdentity,
) -> Result<impl IntoResponse, ApiError> {
    let cart_id = current_cart_id(&state, &identity).await?;
    let lines = state
        .services
        .cart
        .saved_lines(cart_id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(lines))
}

/// Add item to cart
async fn add_item(
    State(state): State<Arc<AppState>>,
    identity: CallerIdentity,
    Json(payload): Json<AddItemRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let reference = CatalogReference::from_ids(payload.product_id, payload.variant_id)
        .map_err(map_service_error)?;

    let cart_id = current_cart_id(&state, &identity).await?;
    let line = state
        .services
        .cart
        .add_line(cart_id, reference, payload.quantity)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(line))
}

/// Update cart item quantity
async fn update_item(
    State(state): State<Arc<AppState>>,
    identity: CallerIdentity,
    Path(item_id): Path<Uuid>,
    Json(payload): Json<UpdateQuantityRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;

    let cart_id = current_cart_id(&state, &identity).await?;
    let line = state
        .services
        .cart
        .update_quantity(cart_id, item_id, payload.quantity)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(line))
}

/// Remove item from cart
async fn remove_item(
    State(state): State<Arc<AppState>>,
    identity: CallerIdentity,
    Path(item_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let cart_id = current_cart_id(&state, &identity).await?;
    state
        .services
        .cart
        .remove_line(cart_id, item_id)
        .await
        .map_err(map_service_error)?;

    Ok(no_content_response())
}

async fn save_for_later(
    State(state): State<Arc<AppState>>,
    identity: CallerIdentity,
    Path(item_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let cart_id = current_cart_id(&state, &identity).await?;
    let line = state
        .services
        .cart
        .save_for_later(cart_id, item_id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(line))
}

async fn move_to_cart(
    State(state): State<Arc<AppState>>,
    identity: CallerIdentity,
    Path(item_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let cart_id = current_cart_id(&state, &identity).await?;
    let line = state
        .services
        .cart
        .move_to_cart(cart_id, item_id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(line))
}

/// Clear active items; saved items stay
async fn clear_cart(
    State(state): State<Arc<AppState>>,
    identity: CallerIdentity,
) -> Result<impl IntoResponse, ApiError> {
    let cart_id = current_cart_id(&state, &identity).await?;
    let removed = state
        .services
        .cart
        .clear(cart_id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(ClearCartResponse {
        message: "Cart cleared successfully".to_string(),
        removed,
    }))
}

#[derive(Debug, Deserialize, Validate)]
pub struct AddItemRequest {
    pub product_id: Option<Uuid>,
    pub variant_id: Option<Uuid>,
    #[serde(default = "default_quantity")]
    #[validate(range(min = 1, max = 10000, message = "Quantity must be between 1 and 10000"))]
    pub quantity: i32,
}

fn default_quantity() -> i32 {
    1
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateQuantityRequest {
    #[validate(range(min = 1, max = 10000, message = "Quantity must be between 1 and 10000"))]
    pub quantity: i32,
}

#[derive(Debug, Serialize)]
pub struct ClearCartResponse {
    pub message: String,
    pub removed: u64,
}
