//! Bloom Haven API Library
//!
//! Flower storefront backend: catalog, carts, cash-on-delivery and online
//! checkout, payment reconciliation and order administration.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod handlers;
pub mod middleware_helpers;
pub mod migrator;
pub mod notifications;
pub mod payments;
pub mod services;
pub mod tracing;

use axum::{
    extract::State,
    response::Json,
    routing::{get, patch, post},
    Extension, Router,
};
use chrono::Utc;
use sea_orm::DatabaseConnection;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::auth::{AuthRouterExt, Capability};

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub services: handlers::AppServices,
}

impl AppState {
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: config::AppConfig,
        gateway: Arc<dyn payments::PaymentGateway>,
    ) -> Self {
        let services = handlers::AppServices::new(db.clone(), &config, gateway);
        Self {
            db,
            config,
            services,
        }
    }
}

// Common response wrappers
#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

#[derive(Serialize)]
pub struct ResponseMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

impl ResponseMeta {
    fn capture() -> Self {
        Self {
            request_id: crate::tracing::current_request_id().map(|rid| rid.as_str().to_string()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            meta: Some(ResponseMeta::capture()),
        }
    }

    pub fn message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: None,
            message: Some(message.into()),
            meta: Some(ResponseMeta::capture()),
        }
    }
}

/// Standard API result type for JSON responses
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, errors::ServiceError>;

pub fn api_v1_routes() -> Router<AppState> {
    let catalog_public = Router::new()
        .route("/flowers", get(handlers::flowers::list_flowers))
        .route("/flowers/:id", get(handlers::flowers::get_flower))
        .route("/categories", get(handlers::flowers::list_categories))
        .route(
            "/delivery-zones/:pincode",
            get(handlers::flowers::check_delivery_zone),
        );

    let catalog_admin = Router::new()
        .route("/flowers", post(handlers::flowers::create_flower))
        .route("/categories", post(handlers::flowers::create_category))
        .with_capability(Capability::ManageCatalog);

    let shopper = Router::new()
        .route(
            "/customers/provision",
            post(handlers::customers::provision_customer),
        )
        .route("/me", get(handlers::customers::get_profile))
        .route(
            "/me/delivery",
            axum::routing::put(handlers::customers::update_delivery),
        )
        .route("/cart", get(handlers::carts::view_cart))
        .route("/cart/items", post(handlers::carts::add_item))
        .route(
            "/cart/items/:id",
            patch(handlers::carts::update_item).delete(handlers::carts::remove_item),
        )
        .route("/checkout/buy-now", post(handlers::checkout::buy_now))
        .route(
            "/checkout/create-payment",
            post(handlers::checkout::create_payment),
        )
        .route("/orders", get(handlers::orders::list_orders))
        .route("/orders/:id", get(handlers::orders::get_order))
        .route("/orders/:id/cancel", post(handlers::orders::cancel_order))
        .with_capability(Capability::Shop);

    let admin_read = Router::new()
        .route("/admin/orders", get(handlers::admin_orders::list_orders))
        .route("/admin/orders/:id", get(handlers::admin_orders::get_order))
        .with_capability(Capability::ViewAllOrders);

    let admin_override = Router::new()
        .route(
            "/admin/orders/:id/status",
            patch(handlers::admin_orders::set_order_status),
        )
        .with_capability(Capability::OverrideOrderStatus);

    // Payment webhook (does not require auth, but signature-verified)
    let payment_webhook = Router::new().route(
        "/payments/webhook",
        post(handlers::payment_webhooks::payment_webhook),
    );

    Router::new()
        .route("/status", get(api_status))
        .merge(catalog_public)
        .merge(catalog_admin)
        .merge(shopper)
        .merge(admin_read)
        .merge(admin_override)
        .merge(payment_webhook)
}

/// Full application router without transport-level layers (CORS, compression).
pub fn build_router(state: AppState) -> Router {
    let auth_service = state.services.auth.clone();

    Router::<AppState>::new()
        .route("/health", get(health_check))
        .nest("/api/v1", api_v1_routes())
        // HTTP tracing layer for consistent request/response telemetry
        .layer(crate::tracing::configure_http_tracing())
        // Inject AuthService into request extensions for auth middleware
        .layer(Extension(auth_service))
        // Ensure every request carries a request id for traceability
        .layer(axum::middleware::from_fn(
            middleware_helpers::request_id::request_id_middleware,
        ))
        .with_state(state)
}

async fn api_status(State(state): State<AppState>) -> ApiResult<Value> {
    let status_data = json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "bloomhaven-api",
        "environment": state.config.environment,
        "currency": state.config.payment.currency,
        "timestamp": Utc::now().to_rfc3339(),
    });

    Ok(Json(ApiResponse::success(status_data)))
}

async fn health_check(State(state): State<AppState>) -> ApiResult<Value> {
    let db_status = match db::check_connection(&state.db).await {
        Ok(_) => "healthy",
        Err(e) => {
            ::tracing::warn!(error = %e, "Health check failed");
            "unhealthy"
        }
    };

    Ok(Json(ApiResponse::success(json!({
        "status": db_status,
        "checks": { "database": db_status },
        "timestamp": Utc::now().to_rfc3339(),
    }))))
}
