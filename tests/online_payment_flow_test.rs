//! Online checkout: intent creation and webhook reconciliation.

mod common;

use axum::http::{Method, StatusCode};
use bloomhaven_api::{
    entities::{notification_job, OrderStatus, PaymentStatus},
    payments::sign_payload,
};
use common::{captured_event, failed_event, response_json, GatewayCall, TestApp};
use rstest::rstest;
use rust_decimal_macros::dec;
use sea_orm::EntityTrait;
use serde_json::{json, Value};
use std::sync::atomic::Ordering;
use uuid::Uuid;

const WEBHOOK_SECRET: &str = "whsec_bloomhaven_tests";

async fn create_intent(app: &TestApp, token: &str, body: Value) -> (StatusCode, Value) {
    let response = app
        .request(
            Method::POST,
            "/api/v1/checkout/create-payment",
            Some(body),
            Some(token),
        )
        .await;
    let status = response.status();
    (status, response_json(response).await)
}

async fn post_webhook(app: &TestApp, event: &Value) -> (StatusCode, Value) {
    let response = app
        .request(Method::POST, "/api/v1/payments/webhook", Some(event.clone()), None)
        .await;
    let status = response.status();
    (status, response_json(response).await)
}

#[tokio::test]
async fn intent_is_created_for_the_catalog_total() {
    let app = TestApp::new().await;
    let alice = app.customer("alice");
    let rose = app.seed_flower("Rose", dec!(17.75), 10).await;

    let (status, body) = create_intent(
        &app,
        &alice.token,
        json!({
            "flowers": [{"id": rose.id, "quantity": 2}],
            "idempotency_key": "pay-1",
            "amount": "1.00"
        }),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    let data = &body["data"];
    assert_eq!(data["amount"], 3550);
    assert_eq!(data["currency"], "INR");
    assert_eq!(data["key_id"], "rzp_test_key");
    assert_eq!(data["status"], "payment_pending");
    assert_eq!(data["gateway_order_id"], "order_test_0");

    let order_id: Uuid = data["order_id"].as_str().unwrap().parse().unwrap();
    assert_eq!(
        app.gateway.calls(),
        vec![GatewayCall::Intent {
            amount_minor: 3550,
            currency: "INR".to_string(),
            receipt: order_id.to_string(),
        }]
    );
    assert_eq!(app.stock_of(rose.id).await, 8);
}

#[tokio::test]
async fn replayed_intent_does_not_call_the_gateway_again() {
    let app = TestApp::new().await;
    let alice = app.customer("alice");
    let rose = app.seed_flower("Rose", dec!(10.00), 10).await;
    let payload = json!({"flowers": [rose.id], "idempotency_key": "pay-twice"});

    let (_, first) = create_intent(&app, &alice.token, payload.clone()).await;
    let (status, second) = create_intent(&app, &alice.token, payload).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["data"]["order_id"], second["data"]["order_id"]);
    assert_eq!(first["data"]["gateway_order_id"], second["data"]["gateway_order_id"]);
    assert_eq!(second["data"]["replayed"], true);
    assert_eq!(app.gateway.intents(), 1);
    assert_eq!(app.stock_of(rose.id).await, 9);
}

#[tokio::test]
async fn gateway_failure_leaves_no_order_and_no_reservation() {
    let app = TestApp::new().await;
    let alice = app.customer("alice");
    let rose = app.seed_flower("Rose", dec!(10.00), 10).await;
    app.gateway.fail_intents.store(true, Ordering::SeqCst);

    let (status, _) = create_intent(
        &app,
        &alice.token,
        json!({"flowers": [rose.id], "idempotency_key": "gateway-down"}),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(app.order_count().await, 0);
    assert_eq!(app.stock_of(rose.id).await, 10);
}

#[tokio::test]
async fn captured_webhook_confirms_the_order_once() {
    let app = TestApp::new().await;
    let alice = app.customer("alice");
    let rose = app.seed_flower("Rose", dec!(10.00), 10).await;

    app.request(
        Method::POST,
        "/api/v1/cart/items",
        Some(json!({"flower_id": rose.id})),
        Some(&alice.token),
    )
    .await;

    let (_, body) = create_intent(
        &app,
        &alice.token,
        json!({"flowers": [rose.id], "idempotency_key": "pay-capture"}),
    )
    .await;
    let order_id: Uuid = body["data"]["order_id"].as_str().unwrap().parse().unwrap();
    let gateway_order_id = body["data"]["gateway_order_id"].as_str().unwrap().to_string();

    let event = captured_event(&gateway_order_id, "pay_abc");
    let (status, ack) = post_webhook(&app, &event).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["status"], "ok");
    assert_eq!(ack["outcome"], "confirmed");

    let order = app.order(order_id).await;
    assert_eq!(order.status, OrderStatus::Confirmed);
    assert_eq!(order.payment_status, PaymentStatus::Paid);
    assert_eq!(order.gateway_payment_id.as_deref(), Some("pay_abc"));

    // redelivery is acknowledged without touching the order
    let (status, ack) = post_webhook(&app, &event).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["outcome"], "already_settled");

    let jobs = notification_job::Entity::find().all(app.db()).await.unwrap();
    assert_eq!(jobs.len(), 1);

    let cart = response_json(
        app.request(Method::GET, "/api/v1/cart", None, Some(&alice.token))
            .await,
    )
    .await;
    assert!(cart["data"]["items"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn failed_webhook_releases_stock() {
    let app = TestApp::new().await;
    let alice = app.customer("alice");
    let rose = app.seed_flower("Rose", dec!(10.00), 10).await;

    let (_, body) = create_intent(
        &app,
        &alice.token,
        json!({"flowers": [{"id": rose.id, "quantity": 3}], "idempotency_key": "pay-fail"}),
    )
    .await;
    let order_id: Uuid = body["data"]["order_id"].as_str().unwrap().parse().unwrap();
    assert_eq!(app.stock_of(rose.id).await, 7);

    let (status, ack) = post_webhook(
        &app,
        &failed_event(body["data"]["gateway_order_id"].as_str().unwrap(), "pay_x"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["outcome"], "failed");

    let order = app.order(order_id).await;
    assert_eq!(order.status, OrderStatus::PaymentFailed);
    assert_eq!(order.payment_status, PaymentStatus::Failed);
    assert_eq!(app.stock_of(rose.id).await, 10);

    // a late capture for a failed order is acknowledged and ignored
    let (_, ack) = post_webhook(
        &app,
        &captured_event(body["data"]["gateway_order_id"].as_str().unwrap(), "pay_x"),
    )
    .await;
    assert_eq!(ack["outcome"], "already_settled");
    assert_eq!(app.order(order_id).await.status, OrderStatus::PaymentFailed);
}

#[tokio::test]
async fn unknown_events_and_orders() {
    let app = TestApp::new().await;

    let (status, ack) = post_webhook(&app, &json!({"event": "refund.processed", "payload": {}})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["outcome"], "ignored");

    let (status, _) = post_webhook(&app, &captured_event("order_missing", "pay_1")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let response = app
        .request_raw(Method::POST, "/api/v1/payments/webhook", b"not json".to_vec(), &[])
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[rstest]
#[case::refund_with_null_order(json!({
    "event": "refund.processed",
    "payload": {"payment": {"entity": {"id": "pay_1", "order_id": null}}}
}))]
#[case::refund_entity_only(json!({
    "event": "refund.created",
    "payload": {"refund": {"entity": {"id": "rfnd_1", "payment_id": "pay_1", "amount": 500}}}
}))]
#[case::authorized_without_order(json!({
    "event": "payment.authorized",
    "payload": {"payment": {"entity": {"id": "pay_2", "amount": 1000}}}
}))]
#[case::no_payload(json!({"event": "payment.dispute.created"}))]
#[case::payload_not_an_object(json!({"event": "order.paid", "payload": "opaque"}))]
#[tokio::test]
async fn unhandled_event_shapes_are_acknowledged(#[case] event: Value) {
    let app = TestApp::new().await;

    let (status, ack) = post_webhook(&app, &event).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["outcome"], "ignored");
    assert_eq!(ack["event"], event["event"]);
}

#[tokio::test]
async fn webhook_signature_is_enforced_when_configured() {
    let app = TestApp::with_config(|cfg| {
        cfg.payment.webhook_secret = Some(WEBHOOK_SECRET.to_string());
    })
    .await;
    let alice = app.customer("alice");
    let rose = app.seed_flower("Rose", dec!(10.00), 10).await;
    let (_, body) = create_intent(
        &app,
        &alice.token,
        json!({"flowers": [rose.id], "idempotency_key": "signed"}),
    )
    .await;
    let order_id: Uuid = body["data"]["order_id"].as_str().unwrap().parse().unwrap();

    let payload = serde_json::to_vec(&captured_event(
        body["data"]["gateway_order_id"].as_str().unwrap(),
        "pay_signed",
    ))
    .unwrap();

    let unsigned = app
        .request_raw(Method::POST, "/api/v1/payments/webhook", payload.clone(), &[])
        .await;
    assert_eq!(unsigned.status(), StatusCode::UNAUTHORIZED);

    let forged = app
        .request_raw(
            Method::POST,
            "/api/v1/payments/webhook",
            payload.clone(),
            &[("x-razorpay-signature", &sign_payload(&payload, "wrong-secret"))],
        )
        .await;
    assert_eq!(forged.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(app.order(order_id).await.status, OrderStatus::PaymentPending);

    let signature = sign_payload(&payload, WEBHOOK_SECRET);
    let signed = app
        .request_raw(
            Method::POST,
            "/api/v1/payments/webhook",
            payload,
            &[("x-razorpay-signature", &signature)],
        )
        .await;
    assert_eq!(signed.status(), StatusCode::OK);
    assert_eq!(app.order(order_id).await.status, OrderStatus::Confirmed);
}
