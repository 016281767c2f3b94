use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use super::common::success_response;
use crate::{auth::AuthUser, errors::ServiceError, services::orders::AdminOrderFilter, AppState};

#[derive(Debug, Default, Deserialize)]
pub struct StatusPatch {
    pub status: Option<String>,
}

pub async fn list_orders(
    State(state): State<AppState>,
    Query(filter): Query<AdminOrderFilter>,
) -> Result<impl IntoResponse, ServiceError> {
    let page = state.services.orders.admin_list(filter).await?;
    Ok(success_response(page))
}

pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state.services.orders.admin_get(id).await?;
    Ok(success_response(order))
}

/// Status override; bypasses the order lifecycle.
pub async fn set_order_status(
    State(state): State<AppState>,
    admin: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<StatusPatch>,
) -> Result<impl IntoResponse, ServiceError> {
    let change = state
        .services
        .orders
        .admin_set_status(id, payload.status.as_deref())
        .await?;
    info!(admin_id = %admin.user_id, order_id = %id, status = %change.status, "Admin status override");
    Ok(success_response(change))
}
