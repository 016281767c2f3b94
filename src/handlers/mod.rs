pub mod admin_orders;
pub mod carts;
pub mod checkout;
pub mod common;
pub mod customers;
pub mod flowers;
pub mod orders;
pub mod payment_webhooks;

use std::sync::Arc;

use sea_orm::DatabaseConnection;
use tracing::{debug, warn};

use crate::{
    auth::{AuthConfig, AuthService},
    config::AppConfig,
    payments::PaymentGateway,
    services::{
        carts::CartService, catalog::CatalogService, checkout::CheckoutService,
        customers::CustomerService, delivery_zones::DeliveryZones, orders::OrderService,
        payment_reconciliation::PaymentReconciliationService,
    },
};

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub catalog: Arc<CatalogService>,
    pub customers: Arc<CustomerService>,
    pub carts: Arc<CartService>,
    pub checkout: Arc<CheckoutService>,
    pub orders: Arc<OrderService>,
    pub reconciliation: Arc<PaymentReconciliationService>,
    pub zones: Arc<DeliveryZones>,
    pub auth: Arc<AuthService>,
}

impl AppServices {
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: &AppConfig,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        let zones = Arc::new(DeliveryZones::from(&config.delivery));
        if zones.is_empty() {
            warn!("No delivery pincodes configured; every delivery check will fail");
        } else {
            debug!(pincodes = zones.len(), "Delivery zones loaded");
        }

        Self {
            catalog: Arc::new(CatalogService::new(db.clone())),
            customers: Arc::new(CustomerService::new(db.clone(), zones.clone())),
            carts: Arc::new(CartService::new(db.clone())),
            checkout: Arc::new(CheckoutService::new(
                db.clone(),
                gateway.clone(),
                zones.clone(),
                config.payment.currency.clone(),
            )),
            orders: Arc::new(OrderService::new(db.clone(), gateway)),
            reconciliation: Arc::new(PaymentReconciliationService::new(db)),
            zones,
            auth: Arc::new(AuthService::new(AuthConfig::from(config))),
        }
    }
}
