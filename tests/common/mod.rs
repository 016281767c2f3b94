#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::{self, Body},
    http::{Method, Request},
    response::Response,
    Router,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, Set};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;

use bloomhaven_api::{
    auth::Role,
    config::AppConfig,
    db,
    entities::{flower, order},
    payments::{GatewayError, GatewayIntent, GatewayRefund, PaymentGateway},
    AppState,
};

pub const TEST_JWT_SECRET: &str = "bloomhaven-test-secret-with-plenty-of-entropy-42";
pub const TEST_PINCODE: &str = "688524";

/// Call log of [`RecordingGateway`].
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayCall {
    Intent {
        amount_minor: i64,
        currency: String,
        receipt: String,
    },
    Refund {
        txn_ref: String,
        amount_minor: i64,
    },
}

/// In-process gateway that records every call and can be told to fail.
#[derive(Default)]
pub struct RecordingGateway {
    calls: Mutex<Vec<GatewayCall>>,
    sequence: AtomicUsize,
    pub fail_intents: AtomicBool,
    pub fail_refunds: AtomicBool,
}

impl RecordingGateway {
    pub fn calls(&self) -> Vec<GatewayCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn intents(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, GatewayCall::Intent { .. }))
            .count()
    }

    pub fn refunds(&self) -> Vec<(String, i64)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                GatewayCall::Refund {
                    txn_ref,
                    amount_minor,
                } => Some((txn_ref, amount_minor)),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl PaymentGateway for RecordingGateway {
    async fn create_intent(
        &self,
        amount_minor: i64,
        currency: &str,
        receipt: &str,
    ) -> Result<GatewayIntent, GatewayError> {
        if self.fail_intents.load(Ordering::SeqCst) {
            return Err(GatewayError::Transport("connection reset".to_string()));
        }
        self.calls.lock().unwrap().push(GatewayCall::Intent {
            amount_minor,
            currency: currency.to_string(),
            receipt: receipt.to_string(),
        });
        let n = self.sequence.fetch_add(1, Ordering::SeqCst);
        Ok(GatewayIntent {
            intent_id: format!("order_test_{}", n),
            amount_minor,
            currency: currency.to_string(),
        })
    }

    async fn refund(&self, txn_ref: &str, amount_minor: i64) -> Result<GatewayRefund, GatewayError> {
        if self.fail_refunds.load(Ordering::SeqCst) {
            return Err(GatewayError::Rejected {
                status: 400,
                body: "refund window closed".to_string(),
            });
        }
        self.calls.lock().unwrap().push(GatewayCall::Refund {
            txn_ref: txn_ref.to_string(),
            amount_minor,
        });
        Ok(GatewayRefund {
            refund_id: format!("rfnd_{}", txn_ref),
        })
    }

    fn public_key(&self) -> &str {
        "rzp_test_key"
    }
}

pub struct TestUser {
    pub user_id: Uuid,
    pub username: String,
    pub token: String,
}

/// Application backed by a throwaway SQLite file.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub gateway: Arc<RecordingGateway>,
    _dir: TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    pub async fn with_config(customize: impl FnOnce(&mut AppConfig)) -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let db_path = dir.path().join("bloomhaven_test.db");

        let mut cfg = AppConfig::new(
            format!("sqlite://{}?mode=rwc", db_path.display()),
            TEST_JWT_SECRET.to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        cfg.notifications.retry_backoff_secs = 0;
        customize(&mut cfg);

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let gateway = Arc::new(RecordingGateway::default());
        let state = AppState::new(Arc::new(pool), cfg, gateway.clone());
        let router = bloomhaven_api::build_router(state.clone());

        Self {
            router,
            state,
            gateway,
            _dir: dir,
        }
    }

    pub fn db(&self) -> &DatabaseConnection {
        &self.state.db
    }

    pub fn user(&self, username: &str, role: Role) -> TestUser {
        let user_id = Uuid::new_v4();
        let email = format!("{}@example.com", username);
        let token = self
            .state
            .services
            .auth
            .issue_token(user_id, username, Some(&email), role)
            .expect("issue token");
        TestUser {
            user_id,
            username: username.to_string(),
            token,
        }
    }

    pub fn customer(&self, username: &str) -> TestUser {
        self.user(username, Role::Customer)
    }

    pub fn admin(&self) -> TestUser {
        self.user("root", Role::SuperAdmin)
    }

    /// Send a request against the router with an optional bearer token.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);

        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {}", tok));
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// Raw body with extra headers; used for signed webhooks.
    pub async fn request_raw(
        &self,
        method: Method,
        uri: &str,
        body: Vec<u8>,
        headers: &[(&str, &str)],
    ) -> Response {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let request = builder.body(Body::from(body)).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    pub async fn seed_flower(&self, name: &str, price: Decimal, stock: i32) -> flower::Model {
        flower::ActiveModel {
            name: Set(name.to_string()),
            description: Set(format!("{} for tests", name)),
            price: Set(price),
            stock: Set(stock),
            category_id: Set(None),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(self.db())
        .await
        .expect("seed flower")
    }

    pub async fn stock_of(&self, flower_id: i32) -> i32 {
        flower::Entity::find_by_id(flower_id)
            .one(self.db())
            .await
            .expect("load flower")
            .expect("flower exists")
            .stock
    }

    pub async fn order(&self, order_id: Uuid) -> order::Model {
        order::Entity::find_by_id(order_id)
            .one(self.db())
            .await
            .expect("load order")
            .expect("order exists")
    }

    pub async fn order_count(&self) -> usize {
        order::Entity::find()
            .all(self.db())
            .await
            .expect("load orders")
            .len()
    }
}

pub async fn response_json(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}

/// Captured-payment webhook body for `gateway_order_id`.
pub fn captured_event(gateway_order_id: &str, payment_id: &str) -> Value {
    serde_json::json!({
        "event": "payment.captured",
        "payload": {"payment": {"entity": {
            "id": payment_id,
            "order_id": gateway_order_id,
            "status": "captured"
        }}}
    })
}

pub fn failed_event(gateway_order_id: &str, payment_id: &str) -> Value {
    serde_json::json!({
        "event": "payment.failed",
        "payload": {"payment": {"entity": {
            "id": payment_id,
            "order_id": gateway_order_id,
            "status": "failed"
        }}}
    })
}
