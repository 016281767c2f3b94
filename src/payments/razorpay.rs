use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, instrument, warn};

use super::{GatewayError, GatewayIntent, GatewayRefund, PaymentGateway};
use crate::config::PaymentGatewayConfig;
use crate::errors::ServiceError;

/// Razorpay REST adapter. Credentials are fixed at construction.
#[derive(Clone)]
pub struct RazorpayGateway {
    config: PaymentGatewayConfig,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct CreateOrderRequest<'a> {
    amount: i64,
    currency: &'a str,
    receipt: &'a str,
    payment_capture: u8,
}

#[derive(Debug, Deserialize)]
struct OrderResponse {
    id: String,
    amount: i64,
    currency: String,
}

#[derive(Debug, Serialize)]
struct RefundRequest {
    amount: i64,
}

#[derive(Debug, Deserialize)]
struct RefundResponse {
    id: String,
}

impl RazorpayGateway {
    pub fn new(config: PaymentGatewayConfig) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| {
                ServiceError::InternalError(format!("Failed to build gateway client: {}", e))
            })?;

        Ok(Self { config, client })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn read_error(response: reqwest::Response) -> GatewayError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        warn!(status, body = %body, "Razorpay rejected request");
        GatewayError::Rejected { status, body }
    }
}

#[async_trait]
impl PaymentGateway for RazorpayGateway {
    #[instrument(skip(self))]
    async fn create_intent(
        &self,
        amount_minor: i64,
        currency: &str,
        receipt: &str,
    ) -> Result<GatewayIntent, GatewayError> {
        let response = self
            .client
            .post(self.url("/v1/orders"))
            .basic_auth(&self.config.key_id, Some(&self.config.key_secret))
            .json(&CreateOrderRequest {
                amount: amount_minor,
                currency,
                receipt,
                payment_capture: 1,
            })
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::read_error(response).await);
        }

        let order: OrderResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;

        info!(gateway_order_id = %order.id, amount_minor = order.amount, "Razorpay order created");
        Ok(GatewayIntent {
            intent_id: order.id,
            amount_minor: order.amount,
            currency: order.currency,
        })
    }

    #[instrument(skip(self))]
    async fn refund(&self, txn_ref: &str, amount_minor: i64) -> Result<GatewayRefund, GatewayError> {
        let response = self
            .client
            .post(self.url(&format!("/v1/payments/{}/refund", txn_ref)))
            .basic_auth(&self.config.key_id, Some(&self.config.key_secret))
            .json(&RefundRequest {
                amount: amount_minor,
            })
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::read_error(response).await);
        }

        let refund: RefundResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;

        info!(refund_id = %refund.id, "Razorpay refund issued");
        Ok(GatewayRefund { refund_id: refund.id })
    }

    fn public_key(&self) -> &str {
        &self.config.key_id
    }
}
