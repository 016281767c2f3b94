use axum::{
    extract::{Path, State},
    response::IntoResponse,
};
use uuid::Uuid;

use super::common::success_response;
use crate::{auth::AuthUser, errors::ServiceError, AppState};

pub async fn list_orders(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse, ServiceError> {
    let orders = state.services.orders.list_customer_orders(&user).await?;
    Ok(success_response(orders))
}

pub async fn get_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state.services.orders.get_customer_order(&user, id).await?;
    Ok(success_response(order))
}

/// Customer cancellation; online orders are refunded before this returns.
pub async fn cancel_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let result = state.services.orders.cancel_order(&user, id).await?;
    Ok(success_response(result))
}
