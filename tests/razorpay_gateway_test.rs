//! HTTP contract of the Razorpay adapter against a local mock server.

use assert_matches::assert_matches;
use bloomhaven_api::{
    config::PaymentGatewayConfig,
    payments::{GatewayError, PaymentGateway, RazorpayGateway},
};
use serde_json::json;
use wiremock::{
    matchers::{basic_auth, body_json, method, path},
    Mock, MockServer, ResponseTemplate,
};

fn gateway(server: &MockServer) -> RazorpayGateway {
    let config = PaymentGatewayConfig {
        base_url: server.uri(),
        key_id: "rzp_test_abc".to_string(),
        key_secret: "shh".to_string(),
        ..PaymentGatewayConfig::default()
    };
    RazorpayGateway::new(config).unwrap()
}

#[tokio::test]
async fn create_intent_posts_order_with_credentials() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/orders"))
        .and(basic_auth("rzp_test_abc", "shh"))
        .and(body_json(json!({
            "amount": 3550,
            "currency": "INR",
            "receipt": "receipt-1",
            "payment_capture": 1
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "order_Ns1",
            "entity": "order",
            "amount": 3550,
            "currency": "INR",
            "status": "created"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let intent = gateway(&server)
        .create_intent(3550, "INR", "receipt-1")
        .await
        .unwrap();

    assert_eq!(intent.intent_id, "order_Ns1");
    assert_eq!(intent.amount_minor, 3550);
    assert_eq!(intent.currency, "INR");
}

#[tokio::test]
async fn refund_targets_the_captured_payment() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/payments/pay_42/refund"))
        .and(body_json(json!({"amount": 1200})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "rfnd_9",
            "payment_id": "pay_42",
            "amount": 1200
        })))
        .expect(1)
        .mount(&server)
        .await;

    let refund = gateway(&server).refund("pay_42", 1200).await.unwrap();
    assert_eq!(refund.refund_id, "rfnd_9");
}

#[tokio::test]
async fn non_success_status_is_a_rejection() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/orders"))
        .respond_with(ResponseTemplate::new(401).set_body_string("Authentication failed"))
        .mount(&server)
        .await;

    let err = gateway(&server)
        .create_intent(100, "INR", "r")
        .await
        .unwrap_err();
    assert_matches!(err, GatewayError::Rejected { status: 401, ref body } if body == "Authentication failed");
}

#[tokio::test]
async fn malformed_success_body_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/payments/pay_1/refund"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let err = gateway(&server).refund("pay_1", 100).await.unwrap_err();
    assert_matches!(err, GatewayError::InvalidResponse(_));
}
