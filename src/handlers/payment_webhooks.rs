use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::{IntoResponse, Json},
};
use tracing::warn;

use crate::{
    errors::ServiceError,
    payments::signature::{verify_webhook_signature, SIGNATURE_HEADER},
    AppState,
};

/// `POST /api/v1/payments/webhook`
///
/// Unauthenticated. When a webhook secret is configured the raw body must
/// carry a valid HMAC-SHA256 signature.
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ServiceError> {
    if let Some(secret) = state
        .config
        .payment
        .webhook_secret
        .as_deref()
        .filter(|s| !s.is_empty())
    {
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if !verify_webhook_signature(&body, signature, secret) {
            warn!("Payment webhook signature verification failed");
            metrics::counter!("bloomhaven_webhooks.rejected", 1);
            return Err(ServiceError::Unauthorized(
                "invalid webhook signature".to_string(),
            ));
        }
    }

    let ack = state
        .services
        .reconciliation
        .handle_gateway_event(&body)
        .await?;
    Ok(Json(ack))
}
