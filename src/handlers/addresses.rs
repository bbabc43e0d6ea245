use crate::handlers::common::{
    created_response, map_service_error, no_content_response, success_response, validate_input,
    CallerIdentity,
};
use crate::{
    entities::commerce::AddressType, errors::ApiError, services::addresses::CreateAddressInput,
    AppState,
};
use axum::{
    extract::{Json, Path, Query, State},
    response::IntoResponse,
    routing::{delete, get, post},
    Router,
};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

pub fn addresses_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_addresses).post(create_address))
        .route("/default/:address_type", get(default_address))
        .route("/:id", delete(delete_address))
        .route("/:id/default", post(set_default))
}

#[derive(Debug, Deserialize)]
pub struct AddressFilter {
    #[serde(rename = "type")]
    pub address_type: Option<AddressType>,
}

async fn list_addresses(
    State(state): State<Arc<AppState>>,
    identity: CallerIdentity,
    Query(filter): Query<AddressFilter>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = identity.require_user()?;
    let addresses = state
        .services
        .addresses
        .list(user_id, filter.address_type)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(addresses))
}

async fn create_address(
    State(state): State<Arc<AppState>>,
    identity: CallerIdentity,
    Json(payload): Json<CreateAddressInput>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = identity.require_user()?;
    validate_input(&payload)?;

    let address = state
        .services
        .addresses
        .create(user_id, payload)
        .await
        .map_err(map_service_error)?;

    Ok(created_response(address))
}

async fn default_address(
    State(state): State<Arc<AppState>>,
    identity: CallerIdentity,
    Path(address_type): Path<AddressType>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = identity.require_user()?;
    let address = state
        .services
        .addresses
        .default_for(user_id, address_type)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(address))
}

async fn set_default(
    State(state): State<Arc<AppState>>,
    identity: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = identity.require_user()?;
    let address = state
        .services
        .addresses
        .set_default(user_id, id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(address))
}

async fn delete_address(
    State(state): State<Arc<AppState>>,
    identity: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = identity.require_user()?;
    state
        .services
        .addresses
        .delete(user_id, id)
        .await
        .map_err(map_service_error)?;

    Ok(no_content_response())
}
