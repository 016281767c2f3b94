use axum::{extract::State, response::IntoResponse, Json};

use super::common::success_response;
use crate::{auth::AuthUser, errors::ServiceError, services::customers::DeliveryInfo, AppState};

/// Post-registration step; safe to call more than once.
pub async fn provision_customer(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse, ServiceError> {
    let customer = state.services.customers.provision(&user).await?;
    Ok(success_response(customer))
}

pub async fn get_profile(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse, ServiceError> {
    let profile = state.services.customers.profile(&user).await?;
    Ok(success_response(profile))
}

pub async fn update_delivery(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<DeliveryInfo>,
) -> Result<impl IntoResponse, ServiceError> {
    state.services.customers.update_delivery(&user, payload).await?;
    let profile = state.services.customers.profile(&user).await?;
    Ok(success_response(profile))
}
