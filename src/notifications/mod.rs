//! Order notifications.
//!
//! State changes write a row into the `notification_jobs` outbox inside their
//! own transaction (see [`outbox::enqueue`]). A background
//! [`outbox::NotificationWorker`] renders and hands each job to a [`Mailer`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::entities::{customer, order, NotificationKind, PaymentMethod};
use crate::payments::round_money;

pub mod outbox;

pub use outbox::{enqueue, NotificationWorker};

pub const STORE_NAME: &str = "Bloom Haven";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Error)]
pub enum MailerError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("rejected recipient: {0}")]
    Rejected(String),
}

/// Delivery transport for rendered messages.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &OutgoingMessage) -> Result<(), MailerError>;
}

/// Writes messages to the log instead of sending them.
#[derive(Debug, Clone, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: &OutgoingMessage) -> Result<(), MailerError> {
        info!(
            to = %message.to,
            subject = %message.subject,
            body_len = message.body.len(),
            "Dispatching notification"
        );
        Ok(())
    }
}

/// Builds the message for `kind`. `to` is the customer's email address.
pub fn render(
    kind: NotificationKind,
    order: &order::Model,
    customer: &customer::Model,
    from: &str,
    to: &str,
) -> OutgoingMessage {
    let (subject, body) = match kind {
        NotificationKind::Confirmation => (
            format!("Order #{} Confirmation", order.id),
            format!(
                "Hi {},\n\nThank you for shopping with {}. Your order #{} is confirmed.\nTotal: {} {}\nPayment: {}\n",
                customer.username,
                STORE_NAME,
                order.id,
                order.currency,
                round_money(order.total_amount),
                order.payment_method,
            ),
        ),
        NotificationKind::Cancellation => {
            let mut body = format!(
                "Hi {},\n\nYour order #{} has been cancelled.\n",
                customer.username, order.id
            );
            if order.payment_method == PaymentMethod::Online {
                body.push_str(&format!(
                    "A refund of {} {} has been initiated and should reach your account within 5-7 business days.\n",
                    order.currency, round_money(order.total_amount)
                ));
            }
            (format!("Order Cancelled - {}", STORE_NAME), body)
        }
    };

    OutgoingMessage {
        from: from.to_string(),
        to: to.to_string(),
        subject,
        body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{OrderStatus, PaymentStatus};
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn order(method: PaymentMethod) -> order::Model {
        order::Model {
            id: Uuid::new_v4(),
            customer_id: Uuid::new_v4(),
            idempotency_key: "k".into(),
            payment_method: method,
            status: OrderStatus::Cancelled,
            payment_status: PaymentStatus::Refunded,
            total_amount: dec!(35.50),
            currency: "INR".into(),
            gateway_order_id: None,
            gateway_payment_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn customer() -> customer::Model {
        customer::Model {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            username: "anu".into(),
            email: Some("anu@example.com".into()),
            phone_number: None,
            address: None,
            pincode: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn confirmation_subject_names_the_order() {
        let order = order(PaymentMethod::CashOnDelivery);
        let msg = render(
            NotificationKind::Confirmation,
            &order,
            &customer(),
            "shop@example.com",
            "anu@example.com",
        );
        assert_eq!(msg.subject, format!("Order #{} Confirmation", order.id));
        assert!(msg.body.contains("35.50"));
    }

    #[test]
    fn online_cancellation_mentions_refund_window() {
        let msg = render(
            NotificationKind::Cancellation,
            &order(PaymentMethod::Online),
            &customer(),
            "shop@example.com",
            "anu@example.com",
        );
        assert_eq!(msg.subject, "Order Cancelled - Bloom Haven");
        assert!(msg.body.contains("5-7 business days"));

        let cod = render(
            NotificationKind::Cancellation,
            &order(PaymentMethod::CashOnDelivery),
            &customer(),
            "shop@example.com",
            "anu@example.com",
        );
        assert!(!cod.body.contains("refund"));
    }
}
