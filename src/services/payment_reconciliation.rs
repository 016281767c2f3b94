use std::sync::Arc;

use chrono::Utc;
use metrics::counter;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, QueryFilter, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};

use super::{carts::CartService, orders::restore_stock};
use crate::{
    db::lock_for_update,
    entities::{order, NotificationKind, OrderStatus, PaymentStatus},
    errors::ServiceError,
    notifications::outbox,
};

pub const EVENT_CAPTURED: &str = "payment.captured";
pub const EVENT_FAILED: &str = "payment.failed";

/// Envelope only; the payload shape depends on the event type.
#[derive(Debug, Deserialize)]
struct GatewayEvent {
    event: String,
    #[serde(default)]
    payload: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct PaymentEntity {
    id: String,
    order_id: String,
}

impl GatewayEvent {
    fn payment_entity(&self) -> Result<PaymentEntity, ServiceError> {
        let entity = self.payload.pointer("/payment/entity").ok_or_else(|| {
            ServiceError::BadRequest("Webhook payload is missing payment.entity".to_string())
        })?;
        PaymentEntity::deserialize(entity)
            .map_err(|e| ServiceError::BadRequest(format!("Malformed payment entity: {}", e)))
    }
}

/// What an event did to the order it references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Confirmed,
    Failed,
    /// The order had already left `payment_pending`; the event is acknowledged.
    AlreadySettled,
    Ignored,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct WebhookAck {
    pub status: &'static str,
    pub event: String,
    pub outcome: Outcome,
}

impl WebhookAck {
    fn new(event: String, outcome: Outcome) -> Self {
        Self {
            status: "ok",
            event,
            outcome,
        }
    }
}

/// Applies asynchronous payment events from the gateway to pending orders.
#[derive(Clone)]
pub struct PaymentReconciliationService {
    db: Arc<DatabaseConnection>,
}

impl PaymentReconciliationService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Handles a verified webhook body. Deliveries may repeat; only an order
    /// still in `payment_pending` is changed.
    #[instrument(skip(self, body), fields(bytes = body.len()))]
    pub async fn handle_gateway_event(&self, body: &[u8]) -> Result<WebhookAck, ServiceError> {
        let event: GatewayEvent = serde_json::from_slice(body)
            .map_err(|e| ServiceError::BadRequest(format!("Malformed webhook payload: {}", e)))?;

        let target = match event.event.as_str() {
            EVENT_CAPTURED => OrderStatus::Confirmed,
            EVENT_FAILED => OrderStatus::PaymentFailed,
            other => {
                info!(event = other, "Ignoring gateway event");
                counter!("bloomhaven_webhooks.events", 1, "event" => "ignored");
                return Ok(WebhookAck::new(event.event, Outcome::Ignored));
            }
        };

        let payment = event.payment_entity()?;

        let outcome = self.settle(target, &payment).await?;
        counter!(
            "bloomhaven_webhooks.events",
            1,
            "event" => event.event.clone(),
            "outcome" => format!("{:?}", outcome).to_lowercase()
        );
        Ok(WebhookAck::new(event.event, outcome))
    }

    async fn settle(
        &self,
        target: OrderStatus,
        payment: &PaymentEntity,
    ) -> Result<Outcome, ServiceError> {
        let txn = self.db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start webhook transaction");
            ServiceError::DatabaseError(e)
        })?;

        let query = order::Entity::find()
            .filter(order::Column::GatewayOrderId.eq(payment.order_id.as_str()));
        let order = lock_for_update(query, txn.get_database_backend())
            .one(&txn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| {
                warn!(gateway_order_id = %payment.order_id, "Webhook references unknown order");
                ServiceError::NotFound(format!("Order for {} not found", payment.order_id))
            })?;

        if order.status != OrderStatus::PaymentPending {
            info!(
                order_id = %order.id,
                status = %order.status,
                "Order already settled; acknowledging event"
            );
            return Ok(Outcome::AlreadySettled);
        }

        let order_id = order.id;
        let customer_id = order.customer_id;
        let mut active: order::ActiveModel = order.into();
        active.status = Set(target);
        active.updated_at = Set(Utc::now());

        let outcome = if target == OrderStatus::Confirmed {
            active.payment_status = Set(PaymentStatus::Paid);
            active.gateway_payment_id = Set(Some(payment.id.clone()));
            active.update(&txn).await.map_err(ServiceError::db_error)?;
            CartService::clear(&txn, customer_id).await?;
            outbox::enqueue(&txn, order_id, NotificationKind::Confirmation).await?;
            Outcome::Confirmed
        } else {
            active.payment_status = Set(PaymentStatus::Failed);
            active.update(&txn).await.map_err(ServiceError::db_error)?;
            restore_stock(&txn, order_id).await?;
            Outcome::Failed
        };

        txn.commit().await.map_err(|e| {
            error!(order_id = %order_id, error = %e, "Failed to commit webhook outcome");
            ServiceError::DatabaseError(e)
        })?;

        info!(order_id = %order_id, outcome = ?outcome, "Payment event applied");
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_captured_event() {
        let body = br#"{"event":"payment.captured","payload":{"payment":{"entity":{"id":"pay_1","order_id":"order_9","amount":2000}}}}"#;
        let event: GatewayEvent = serde_json::from_slice(body).unwrap();
        assert_eq!(event.event, EVENT_CAPTURED);
        let entity = event.payment_entity().unwrap();
        assert_eq!(entity.id, "pay_1");
        assert_eq!(entity.order_id, "order_9");
    }

    #[test]
    fn envelope_accepts_any_payload_shape() {
        for body in [
            r#"{"event":"refund.processed","payload":{"payment":{"entity":{"id":"pay_1","order_id":null}}}}"#,
            r#"{"event":"payment.authorized","payload":{"refund":{"entity":{"id":"rfnd_1"}}}}"#,
            r#"{"event":"order.paid","payload":[1,2,3]}"#,
            r#"{"event":"payment.dispute.created"}"#,
        ] {
            let event: GatewayEvent = serde_json::from_str(body).unwrap();
            assert!(!event.event.is_empty());
        }
    }

    #[test]
    fn known_event_with_null_order_is_rejected() {
        let body = br#"{"event":"payment.failed","payload":{"payment":{"entity":{"id":"pay_1","order_id":null}}}}"#;
        let event: GatewayEvent = serde_json::from_slice(body).unwrap();
        assert!(matches!(event.payment_entity(), Err(ServiceError::BadRequest(_))));
    }

    #[test]
    fn ack_serializes_outcome() {
        let ack = WebhookAck::new("payment.failed".into(), Outcome::AlreadySettled);
        let json = serde_json::to_value(&ack).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["outcome"], "already_settled");
    }
}
