use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use super::common::{created_response, success_response};
use crate::{
    auth::AuthUser,
    errors::ServiceError,
    services::checkout::{PaymentIntentRequest, PlaceOrderRequest},
    AppState,
};

/// Replays answer 200 with the stored order; fresh orders answer 201.
fn order_response<T: serde::Serialize>(replayed: bool, body: T) -> Response {
    if replayed {
        success_response(body)
    } else {
        created_response(body)
    }
}

/// `POST /checkout/buy-now`
pub async fn buy_now(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<PlaceOrderRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let result = state.services.checkout.place_order(&user, payload).await?;
    Ok(order_response(result.replayed, result))
}

/// `POST /checkout/create-payment`
pub async fn create_payment(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<PaymentIntentRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let result = state
        .services
        .checkout
        .create_payment_intent(&user, payload)
        .await?;
    Ok(order_response(result.replayed, result))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replays_are_not_reported_as_created() {
        assert_eq!(order_response(true, "x").status(), StatusCode::OK);
        assert_eq!(order_response(false, "x").status(), StatusCode::CREATED);
    }
}
