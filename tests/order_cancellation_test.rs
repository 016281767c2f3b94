//! Customer cancellation for both payment methods.

mod common;

use axum::http::{Method, StatusCode};
use bloomhaven_api::entities::{notification_job, NotificationKind, OrderStatus, PaymentStatus};
use common::{captured_event, response_json, TestApp, TestUser};
use rust_decimal_macros::dec;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use serde_json::json;
use std::sync::atomic::Ordering;
use uuid::Uuid;

async fn place_cod(app: &TestApp, user: &TestUser, flower_id: i32, quantity: i32, key: &str) -> Uuid {
    let response = app
        .request(
            Method::POST,
            "/api/v1/checkout/buy-now",
            Some(json!({"flowers": [{"id": flower_id, "quantity": quantity}], "idempotency_key": key})),
            Some(&user.token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    response_json(response).await["data"]["order_id"]
        .as_str()
        .unwrap()
        .parse()
        .unwrap()
}

/// Creates an online order and confirms it through a captured webhook.
async fn place_paid_online(app: &TestApp, user: &TestUser, flower_id: i32, key: &str) -> Uuid {
    let response = app
        .request(
            Method::POST,
            "/api/v1/checkout/create-payment",
            Some(json!({"flowers": [flower_id], "idempotency_key": key})),
            Some(&user.token),
        )
        .await;
    let body = response_json(response).await;
    let gateway_order_id = body["data"]["gateway_order_id"].as_str().unwrap();
    let webhook = app
        .request(
            Method::POST,
            "/api/v1/payments/webhook",
            Some(captured_event(gateway_order_id, &format!("pay_{}", key))),
            None,
        )
        .await;
    assert_eq!(webhook.status(), StatusCode::OK);
    body["data"]["order_id"].as_str().unwrap().parse().unwrap()
}

async fn cancel(app: &TestApp, user: &TestUser, order_id: Uuid) -> axum::response::Response {
    app.request(
        Method::POST,
        &format!("/api/v1/orders/{}/cancel", order_id),
        None,
        Some(&user.token),
    )
    .await
}

#[tokio::test]
async fn cod_cancellation_restores_stock_without_refund() {
    let app = TestApp::new().await;
    let alice = app.customer("alice");
    let rose = app.seed_flower("Rose", dec!(10.00), 10).await;
    let order_id = place_cod(&app, &alice, rose.id, 4, "cod-cancel").await;
    assert_eq!(app.stock_of(rose.id).await, 6);

    let response = cancel(&app, &alice, order_id).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["status"], "cancelled");
    assert_eq!(body["data"]["message"], "Order cancelled successfully");

    let order = app.order(order_id).await;
    assert_eq!(order.status, OrderStatus::Cancelled);
    assert_eq!(order.payment_status, PaymentStatus::Pending);
    assert_eq!(app.stock_of(rose.id).await, 10);
    assert!(app.gateway.refunds().is_empty());

    let cancellation_jobs = notification_job::Entity::find()
        .filter(notification_job::Column::OrderId.eq(order_id))
        .filter(notification_job::Column::Kind.eq(NotificationKind::Cancellation))
        .all(app.db())
        .await
        .unwrap();
    assert_eq!(cancellation_jobs.len(), 1);
}

#[tokio::test]
async fn online_cancellation_refunds_the_full_amount() {
    let app = TestApp::new().await;
    let alice = app.customer("alice");
    let tulip = app.seed_flower("Tulip", dec!(35.50), 10).await;
    let order_id = place_paid_online(&app, &alice, tulip.id, "online-cancel").await;

    let response = cancel(&app, &alice, order_id).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["payment_status"], "refunded");

    assert_eq!(
        app.gateway.refunds(),
        vec![("pay_online-cancel".to_string(), 3550)]
    );
    let order = app.order(order_id).await;
    assert_eq!(order.status, OrderStatus::Cancelled);
    assert_eq!(order.payment_status, PaymentStatus::Refunded);
    assert_eq!(app.stock_of(tulip.id).await, 10);
}

#[tokio::test]
async fn refund_failure_keeps_the_order_confirmed() {
    let app = TestApp::new().await;
    let alice = app.customer("alice");
    let tulip = app.seed_flower("Tulip", dec!(35.50), 10).await;
    let order_id = place_paid_online(&app, &alice, tulip.id, "refund-fails").await;
    app.gateway.fail_refunds.store(true, Ordering::SeqCst);

    let response = cancel(&app, &alice, order_id).await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

    let order = app.order(order_id).await;
    assert_eq!(order.status, OrderStatus::Confirmed);
    assert_eq!(order.payment_status, PaymentStatus::Paid);
    assert_eq!(app.stock_of(tulip.id).await, 9);
}

#[tokio::test]
async fn only_confirmed_orders_can_be_cancelled() {
    let app = TestApp::new().await;
    let alice = app.customer("alice");
    let rose = app.seed_flower("Rose", dec!(10.00), 10).await;
    let order_id = place_cod(&app, &alice, rose.id, 1, "twice").await;

    assert_eq!(cancel(&app, &alice, order_id).await.status(), StatusCode::OK);

    let again = cancel(&app, &alice, order_id).await;
    assert_eq!(again.status(), StatusCode::CONFLICT);
    let body = response_json(again).await;
    assert!(body["message"]
        .as_str()
        .unwrap()
        .contains("Current status: cancelled"));
    assert_eq!(app.stock_of(rose.id).await, 10);

    // pending online orders are not cancellable either
    let response = app
        .request(
            Method::POST,
            "/api/v1/checkout/create-payment",
            Some(json!({"flowers": [rose.id], "idempotency_key": "pending"})),
            Some(&alice.token),
        )
        .await;
    let pending_id: Uuid = response_json(response).await["data"]["order_id"]
        .as_str()
        .unwrap()
        .parse()
        .unwrap();
    assert_eq!(
        cancel(&app, &alice, pending_id).await.status(),
        StatusCode::CONFLICT
    );
}

#[tokio::test]
async fn other_customers_orders_are_not_found() {
    let app = TestApp::new().await;
    let alice = app.customer("alice");
    let mallory = app.customer("mallory");
    let rose = app.seed_flower("Rose", dec!(10.00), 10).await;
    let order_id = place_cod(&app, &alice, rose.id, 1, "mine").await;

    assert_eq!(
        cancel(&app, &mallory, order_id).await.status(),
        StatusCode::NOT_FOUND
    );
    let peek = app
        .request(
            Method::GET,
            &format!("/api/v1/orders/{}", order_id),
            None,
            Some(&mallory.token),
        )
        .await;
    assert_eq!(peek.status(), StatusCode::NOT_FOUND);
    assert_eq!(app.order(order_id).await.status, OrderStatus::Confirmed);
}

#[tokio::test]
async fn customer_order_list_is_newest_first_with_items() {
    let app = TestApp::new().await;
    let alice = app.customer("alice");
    let rose = app.seed_flower("Rose", dec!(10.00), 10).await;
    let first = place_cod(&app, &alice, rose.id, 1, "first").await;
    let second = place_cod(&app, &alice, rose.id, 2, "second").await;

    let body = response_json(
        app.request(Method::GET, "/api/v1/orders", None, Some(&alice.token))
            .await,
    )
    .await;
    let orders = body["data"].as_array().unwrap();
    assert_eq!(orders.len(), 2);
    assert_eq!(orders[0]["id"], second.to_string());
    assert_eq!(orders[1]["id"], first.to_string());
    assert_eq!(orders[0]["items"][0]["flower_name"], "Rose");
    assert_eq!(orders[0]["items"][0]["quantity"], 2);
    assert_eq!(orders[0]["customer_username"], "alice");
}
