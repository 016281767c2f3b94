//! Catalog browsing, catalog administration and customer profiles.

mod common;

use axum::http::{Method, StatusCode};
use bloomhaven_api::entities::customer;
use common::{response_json, TestApp, TEST_PINCODE};
use rust_decimal_macros::dec;
use sea_orm::EntityTrait;
use serde_json::json;

#[tokio::test]
async fn catalog_is_public_and_filterable() {
    let app = TestApp::new().await;
    let admin = app.admin();

    let category = response_json(
        app.request(
            Method::POST,
            "/api/v1/categories",
            Some(json!({"name": "Roses", "description": "All the roses"})),
            Some(&admin.token),
        )
        .await,
    )
    .await;
    let category_id = category["data"]["id"].as_i64().unwrap();

    for (name, price) in [("Red Rose", "12.00"), ("Pink Rose", "30.00")] {
        let response = app
            .request(
                Method::POST,
                "/api/v1/flowers",
                Some(json!({
                    "name": name,
                    "price": price,
                    "stock": 5,
                    "category_id": category_id
                })),
                Some(&admin.token),
            )
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
    }
    app.seed_flower("Daisy", dec!(4.00), 50).await;

    let all = response_json(app.request(Method::GET, "/api/v1/flowers", None, None).await).await;
    assert_eq!(all["data"].as_array().unwrap().len(), 3);

    let roses = response_json(
        app.request(
            Method::GET,
            &format!("/api/v1/flowers?category={}", category_id),
            None,
            None,
        )
        .await,
    )
    .await;
    let roses = roses["data"].as_array().unwrap();
    assert_eq!(roses.len(), 2);
    assert_eq!(roses[0]["category_name"], "Roses");

    let cheap = response_json(
        app.request(Method::GET, "/api/v1/flowers?price=1-15", None, None)
            .await,
    )
    .await;
    let names: Vec<&str> = cheap["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["Red Rose", "Daisy"]);

    let malformed = app
        .request(Method::GET, "/api/v1/flowers?price=cheap", None, None)
        .await;
    assert_eq!(malformed.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn catalog_writes_need_the_manage_capability() {
    let app = TestApp::new().await;
    let alice = app.customer("alice");
    let admin = app.admin();

    let response = app
        .request(
            Method::POST,
            "/api/v1/flowers",
            Some(json!({"name": "Sneaky", "price": "1.00"})),
            Some(&alice.token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let negative = app
        .request(
            Method::POST,
            "/api/v1/flowers",
            Some(json!({"name": "Broken", "price": "-1.00"})),
            Some(&admin.token),
        )
        .await;
    assert_eq!(negative.status(), StatusCode::BAD_REQUEST);

    app.request(
        Method::POST,
        "/api/v1/categories",
        Some(json!({"name": "Lilies"})),
        Some(&admin.token),
    )
    .await;
    let duplicate = app
        .request(
            Method::POST,
            "/api/v1/categories",
            Some(json!({"name": "Lilies"})),
            Some(&admin.token),
        )
        .await;
    assert_eq!(duplicate.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn delivery_zone_lookup() {
    let app = TestApp::new().await;

    let inside = response_json(
        app.request(
            Method::GET,
            &format!("/api/v1/delivery-zones/{}", TEST_PINCODE),
            None,
            None,
        )
        .await,
    )
    .await;
    assert_eq!(inside["data"]["deliverable"], true);

    let outside = response_json(
        app.request(Method::GET, "/api/v1/delivery-zones/110001", None, None)
            .await,
    )
    .await;
    assert_eq!(outside["data"]["deliverable"], false);
}

#[tokio::test]
async fn provisioning_is_idempotent() {
    let app = TestApp::new().await;
    let alice = app.customer("alice");

    let first = response_json(
        app.request(
            Method::POST,
            "/api/v1/customers/provision",
            None,
            Some(&alice.token),
        )
        .await,
    )
    .await;
    let second = response_json(
        app.request(
            Method::POST,
            "/api/v1/customers/provision",
            None,
            Some(&alice.token),
        )
        .await,
    )
    .await;

    assert_eq!(first["data"]["id"], second["data"]["id"]);
    assert_eq!(first["data"]["email"], "alice@example.com");
    assert_eq!(customer::Entity::find().all(app.db()).await.unwrap().len(), 1);
}

#[tokio::test]
async fn profile_and_delivery_details() {
    let app = TestApp::new().await;
    let alice = app.customer("alice");

    let response = app
        .request(
            Method::PUT,
            "/api/v1/me/delivery",
            Some(json!({
                "address": "  12 Market Street  ",
                "phone": "9876543210",
                "pincode": TEST_PINCODE
            })),
            Some(&alice.token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let profile = response_json(
        app.request(Method::GET, "/api/v1/me", None, Some(&alice.token))
            .await,
    )
    .await;
    assert_eq!(profile["data"]["username"], "alice");
    assert_eq!(profile["data"]["role"], "customer");
    assert_eq!(profile["data"]["address"], "12 Market Street");
    assert_eq!(profile["data"]["phone"], "9876543210");
    assert_eq!(profile["data"]["pincode"], TEST_PINCODE);

    let outside = app
        .request(
            Method::PUT,
            "/api/v1/me/delivery",
            Some(json!({"pincode": "560001"})),
            Some(&alice.token),
        )
        .await;
    assert_eq!(outside.status(), StatusCode::BAD_REQUEST);
    let body = response_json(outside).await;
    assert!(body["message"]
        .as_str()
        .unwrap()
        .contains("we do not deliver to 560001"));
}

#[tokio::test]
async fn health_and_status_endpoints() {
    let app = TestApp::new().await;

    let health = app.request(Method::GET, "/health", None, None).await;
    assert_eq!(health.status(), StatusCode::OK);
    assert!(health.headers().contains_key("x-request-id"));
    assert_eq!(response_json(health).await["data"]["status"], "healthy");

    let status = response_json(app.request(Method::GET, "/api/v1/status", None, None).await).await;
    assert_eq!(status["data"]["service"], "bloomhaven-api");
}
