use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde::Serialize;

use super::common::{created_response, success_response, validate_input};
use crate::{
    errors::ServiceError,
    services::catalog::{FlowerFilter, NewCategory, NewFlower},
    AppState,
};

#[derive(Debug, Serialize)]
pub struct DeliveryCheck {
    pub pincode: String,
    pub deliverable: bool,
}

pub async fn list_flowers(
    State(state): State<AppState>,
    Query(filter): Query<FlowerFilter>,
) -> Result<impl IntoResponse, ServiceError> {
    let flowers = state.services.catalog.list_flowers(filter).await?;
    Ok(success_response(flowers))
}

pub async fn get_flower(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, ServiceError> {
    let flower = state.services.catalog.flower_detail(id).await?;
    Ok(success_response(flower))
}

pub async fn create_flower(
    State(state): State<AppState>,
    Json(payload): Json<NewFlower>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;
    let flower = state.services.catalog.create_flower(payload).await?;
    Ok(created_response(flower))
}

pub async fn list_categories(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ServiceError> {
    let categories = state.services.catalog.list_categories().await?;
    Ok(success_response(categories))
}

pub async fn create_category(
    State(state): State<AppState>,
    Json(payload): Json<NewCategory>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;
    let category = state.services.catalog.create_category(payload).await?;
    Ok(created_response(category))
}

pub async fn check_delivery_zone(
    State(state): State<AppState>,
    Path(pincode): Path<String>,
) -> impl IntoResponse {
    let deliverable = state.services.zones.is_deliverable(&pincode);
    success_response(DeliveryCheck {
        pincode: pincode.trim().to_string(),
        deliverable,
    })
}
