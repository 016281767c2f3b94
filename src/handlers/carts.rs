use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use uuid::Uuid;

use super::common::{created_response, no_content_response, success_response};
use crate::{
    auth::AuthUser,
    errors::ServiceError,
    services::carts::{AddCartItem, UpdateCartItem},
    AppState,
};

pub async fn view_cart(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse, ServiceError> {
    let cart = state.services.carts.view(&user).await?;
    Ok(success_response(cart))
}

pub async fn add_item(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<AddCartItem>,
) -> Result<impl IntoResponse, ServiceError> {
    let line = state.services.carts.add_item(&user, payload).await?;
    Ok(created_response(line))
}

/// A quantity of zero or less removes the line.
pub async fn update_item(
    State(state): State<AppState>,
    user: AuthUser,
    Path(item_id): Path<Uuid>,
    Json(payload): Json<UpdateCartItem>,
) -> Result<impl IntoResponse, ServiceError> {
    let quantity = payload
        .quantity
        .ok_or_else(|| ServiceError::ValidationError("quantity is required".to_string()))?;

    match state
        .services
        .carts
        .update_item(&user, item_id, quantity)
        .await?
    {
        Some(line) => Ok(success_response(line)),
        None => Ok(no_content_response()),
    }
}

pub async fn remove_item(
    State(state): State<AppState>,
    user: AuthUser,
    Path(item_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    state.services.carts.remove_item(&user, item_id).await?;
    Ok(no_content_response())
}
