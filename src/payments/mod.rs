//! Payment gateway seam.
//!
//! The order core talks to [`PaymentGateway`] only; amounts cross this
//! boundary as integer minor units (paise).

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::errors::ServiceError;

pub mod razorpay;
pub mod signature;

pub use razorpay::RazorpayGateway;
pub use signature::{sign_payload, verify_webhook_signature, SIGNATURE_HEADER};

/// Remote payment intent created by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayIntent {
    pub intent_id: String,
    pub amount_minor: i64,
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayRefund {
    pub refund_id: String,
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("gateway request failed: {0}")]
    Transport(String),
    #[error("gateway rejected request with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("unexpected gateway response: {0}")]
    InvalidResponse(String),
}

impl From<GatewayError> for ServiceError {
    fn from(err: GatewayError) -> Self {
        ServiceError::ExternalServiceError(format!("Payment gateway error: {}", err))
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create a remote intent for `amount_minor`. `receipt` is our reference.
    async fn create_intent(
        &self,
        amount_minor: i64,
        currency: &str,
        receipt: &str,
    ) -> Result<GatewayIntent, GatewayError>;

    /// Refund `amount_minor` of the captured payment `txn_ref`.
    async fn refund(&self, txn_ref: &str, amount_minor: i64) -> Result<GatewayRefund, GatewayError>;

    /// Key the browser checkout needs to open the payment sheet.
    fn public_key(&self) -> &str;
}

/// Exact conversion from major units to minor units.
pub fn to_minor_units(amount: Decimal) -> Result<i64, ServiceError> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(ServiceError::ValidationError(format!(
            "Amount must not be negative: {}",
            amount
        )));
    }

    let normalized = amount.normalize();
    if normalized.scale() > 2 {
        return Err(ServiceError::ValidationError(format!(
            "Amount has more than 2 decimal places: {}",
            amount
        )));
    }

    let minor = normalized
        .checked_mul(Decimal::ONE_HUNDRED)
        .ok_or_else(|| ServiceError::ValidationError(format!("Amount out of range: {}", amount)))?;

    i64::try_from(minor.trunc())
        .map_err(|_| ServiceError::ValidationError(format!("Amount out of range: {}", amount)))
}

pub fn from_minor_units(minor: i64) -> Decimal {
    Decimal::new(minor, 2)
}

/// Rounds to cents and pins the scale at 2, so `12.5` renders as `12.50`.
pub fn round_money(amount: Decimal) -> Decimal {
    let mut rounded = amount.round_dp(2);
    rounded.rescale(2);
    rounded
}
