use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection,
    DatabaseTransaction, EntityTrait, QueryFilter, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use super::{
    carts::CartService,
    catalog::CatalogService,
    customers::{CustomerService, DeliveryInfo},
    delivery_zones::DeliveryZones,
};
use crate::{
    auth::AuthUser,
    entities::{
        flower, order, order_item, NotificationKind, OrderStatus, PaymentMethod, PaymentStatus,
    },
    errors::{is_unique_violation, ServiceError},
    notifications::outbox,
    payments::{round_money, to_minor_units, PaymentGateway},
};

const MAX_IDEMPOTENCY_KEY_LEN: usize = 255;

/// One requested line: either a bare flower id (quantity 1) or an explicit line.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum LineRequest {
    Id(i32),
    Line {
        #[serde(alias = "id")]
        flower_id: i32,
        #[serde(default = "one")]
        quantity: i32,
    },
}

fn one() -> i32 {
    1
}

impl LineRequest {
    fn parts(&self) -> (i32, i32) {
        match *self {
            LineRequest::Id(id) => (id, 1),
            LineRequest::Line { flower_id, quantity } => (flower_id, quantity),
        }
    }
}

/// Cash-on-delivery checkout
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlaceOrderRequest {
    #[serde(default, alias = "flowers")]
    pub items: Vec<LineRequest>,
    pub idempotency_key: Option<String>,
    pub payment_method: Option<PaymentMethod>,
    #[serde(flatten)]
    pub delivery: DeliveryInfo,
}

/// Online checkout. `amount` is what the client believes the total is; it is
/// only compared against the catalog total for logging.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaymentIntentRequest {
    #[serde(default, alias = "flowers")]
    pub items: Vec<LineRequest>,
    pub idempotency_key: Option<String>,
    pub amount: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct OrderResult {
    pub order_id: Uuid,
    pub total: Decimal,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub payment_method: PaymentMethod,
    /// True when an earlier order with the same idempotency key was returned
    pub replayed: bool,
}

impl OrderResult {
    fn from_order(order: &order::Model, replayed: bool) -> Self {
        Self {
            order_id: order.id,
            total: round_money(order.total_amount),
            status: order.status,
            payment_status: order.payment_status,
            payment_method: order.payment_method,
            replayed,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PaymentIntentResult {
    pub order_id: Uuid,
    pub gateway_order_id: Option<String>,
    /// Minor units
    pub amount: i64,
    pub currency: String,
    pub key_id: String,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub replayed: bool,
}

struct PricedLine {
    flower: flower::Model,
    quantity: i32,
    unit_price: Decimal,
}

struct NewOrder {
    id: Uuid,
    customer_id: Uuid,
    idempotency_key: String,
    payment_method: PaymentMethod,
    status: OrderStatus,
    total: Decimal,
    gateway_order_id: Option<String>,
}

fn require_key(raw: Option<&str>) -> Result<String, ServiceError> {
    let key = raw
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .ok_or_else(|| ServiceError::ValidationError("Idempotency key required".to_string()))?;
    if key.len() > MAX_IDEMPOTENCY_KEY_LEN {
        return Err(ServiceError::ValidationError(format!(
            "idempotency_key must be at most {} characters",
            MAX_IDEMPOTENCY_KEY_LEN
        )));
    }
    Ok(key.to_string())
}

/// Collapses repeated flower ids into one line with the summed quantity.
fn merge_lines(items: &[LineRequest]) -> Result<BTreeMap<i32, i32>, ServiceError> {
    if items.is_empty() {
        return Err(ServiceError::ValidationError("No flowers found".to_string()));
    }

    let mut merged = BTreeMap::new();
    for item in items {
        let (flower_id, quantity) = item.parts();
        if quantity < 1 {
            return Err(ServiceError::ValidationError(format!(
                "quantity for flower {} must be at least 1",
                flower_id
            )));
        }
        let entry = merged.entry(flower_id).or_insert(0i32);
        *entry = entry.checked_add(quantity).ok_or_else(|| {
            ServiceError::ValidationError(format!("quantity for flower {} is too large", flower_id))
        })?;
    }
    Ok(merged)
}

/// Prices lines from the catalog. Ids missing from the catalog are dropped.
async fn price_lines<C: ConnectionTrait>(
    conn: &C,
    lines: &BTreeMap<i32, i32>,
) -> Result<(Vec<PricedLine>, Decimal), ServiceError> {
    let ids: Vec<i32> = lines.keys().copied().collect();
    let mut catalog = CatalogService::get_items_by_ids(conn, &ids).await?;

    let mut priced = Vec::with_capacity(lines.len());
    for (flower_id, quantity) in lines {
        match catalog.remove(flower_id) {
            Some(flower) => {
                let unit_price = round_money(flower.price);
                priced.push(PricedLine {
                    flower,
                    quantity: *quantity,
                    unit_price,
                });
            }
            None => warn!(flower_id, "Dropping unknown flower from checkout"),
        }
    }

    if priced.is_empty() {
        return Err(ServiceError::ValidationError(
            "None of the requested flowers exist".to_string(),
        ));
    }

    let total = round_money(
        priced
            .iter()
            .map(|l| l.unit_price * Decimal::from(l.quantity))
            .sum::<Decimal>(),
    );
    Ok((priced, total))
}

async fn find_existing<C: ConnectionTrait>(
    conn: &C,
    customer_id: Uuid,
    key: &str,
) -> Result<Option<order::Model>, ServiceError> {
    order::Entity::find()
        .filter(order::Column::CustomerId.eq(customer_id))
        .filter(order::Column::IdempotencyKey.eq(key))
        .one(conn)
        .await
        .map_err(ServiceError::db_error)
}

async fn reserve_lines(txn: &DatabaseTransaction, lines: &[PricedLine]) -> Result<(), ServiceError> {
    for line in lines {
        CatalogService::reserve_stock(txn, &line.flower, line.quantity).await?;
    }
    Ok(())
}

/// Writes the order with its items. The inner `DbErr` is the order insert's
/// own failure, so callers can detect a lost idempotency race.
async fn insert_order_rows(
    txn: &DatabaseTransaction,
    new_order: NewOrder,
    lines: &[PricedLine],
    currency: &str,
) -> Result<Result<order::Model, sea_orm::DbErr>, ServiceError> {
    let now = Utc::now();
    let inserted = order::ActiveModel {
        id: Set(new_order.id),
        customer_id: Set(new_order.customer_id),
        idempotency_key: Set(new_order.idempotency_key),
        payment_method: Set(new_order.payment_method),
        status: Set(new_order.status),
        payment_status: Set(PaymentStatus::Pending),
        total_amount: Set(new_order.total),
        currency: Set(currency.to_string()),
        gateway_order_id: Set(new_order.gateway_order_id),
        gateway_payment_id: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(txn)
    .await;

    let order = match inserted {
        Ok(order) => order,
        Err(e) => return Ok(Err(e)),
    };

    let items = lines.iter().map(|line| order_item::ActiveModel {
        id: Set(Uuid::new_v4()),
        order_id: Set(order.id),
        flower_id: Set(line.flower.id),
        flower_name: Set(line.flower.name.clone()),
        quantity: Set(line.quantity),
        unit_price: Set(line.unit_price),
    });
    order_item::Entity::insert_many(items)
        .exec_without_returning(txn)
        .await
        .map_err(|e| {
            error!(order_id = %order.id, error = %e, "Failed to insert order items");
            ServiceError::DatabaseError(e)
        })?;

    Ok(Ok(order))
}

/// The checkout orchestrator.
#[derive(Clone)]
pub struct CheckoutService {
    db: Arc<DatabaseConnection>,
    gateway: Arc<dyn PaymentGateway>,
    zones: Arc<DeliveryZones>,
    currency: String,
}

impl CheckoutService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        gateway: Arc<dyn PaymentGateway>,
        zones: Arc<DeliveryZones>,
        currency: String,
    ) -> Self {
        Self {
            db,
            gateway,
            zones,
            currency,
        }
    }

    async fn begin(&self) -> Result<DatabaseTransaction, ServiceError> {
        self.db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start checkout transaction");
            ServiceError::DatabaseError(e)
        })
    }

    async fn winner_after_conflict(
        &self,
        customer_id: Uuid,
        key: &str,
    ) -> Result<order::Model, ServiceError> {
        find_existing(&*self.db, customer_id, key)
            .await?
            .ok_or_else(|| {
                ServiceError::InternalError("Idempotency conflict without a stored order".into())
            })
    }

    /// Cash-on-delivery checkout. Repeating a call with the same key returns
    /// the first order without side effects.
    #[instrument(skip(self, user, request), fields(user_id = %user.user_id, idempotency_key = tracing::field::Empty))]
    pub async fn place_order(
        &self,
        user: &AuthUser,
        request: PlaceOrderRequest,
    ) -> Result<OrderResult, ServiceError> {
        let lines = merge_lines(&request.items)?;
        let key = require_key(request.idempotency_key.as_deref())?;
        tracing::Span::current().record("idempotency_key", key.as_str());
        if request.payment_method == Some(PaymentMethod::Online) {
            return Err(ServiceError::ValidationError(
                "Use create-payment API for online orders".to_string(),
            ));
        }

        let txn = self.begin().await?;
        let customer = CustomerService::provision_on(&txn, user).await?;

        // a replay returns the stored order before the delivery details are touched
        if let Some(existing) = find_existing(&txn, customer.id, &key).await? {
            txn.commit().await.map_err(ServiceError::db_error)?;
            info!(order_id = %existing.id, "Idempotent replay of checkout");
            counter!("bloomhaven_orders.idempotent_replays", 1);
            return Ok(OrderResult::from_order(&existing, true));
        }

        let customer =
            CustomerService::apply_delivery(&txn, customer, &request.delivery, &self.zones).await?;

        let (priced, total) = price_lines(&txn, &lines).await?;
        reserve_lines(&txn, &priced).await?;

        let new_order = NewOrder {
            id: Uuid::new_v4(),
            customer_id: customer.id,
            idempotency_key: key.clone(),
            payment_method: PaymentMethod::CashOnDelivery,
            status: OrderStatus::Confirmed,
            total,
            gateway_order_id: None,
        };

        let order = match insert_order_rows(&txn, new_order, &priced, &self.currency).await? {
            Ok(order) => order,
            Err(e) if is_unique_violation(&e) => {
                txn.rollback().await.map_err(ServiceError::db_error)?;
                let winner = self.winner_after_conflict(customer.id, &key).await?;
                info!(order_id = %winner.id, "Concurrent checkout lost the idempotency race");
                counter!("bloomhaven_orders.idempotent_replays", 1);
                return Ok(OrderResult::from_order(&winner, true));
            }
            Err(e) => {
                error!(error = %e, "Failed to insert order");
                return Err(ServiceError::DatabaseError(e));
            }
        };

        CartService::clear(&txn, customer.id).await?;
        outbox::enqueue(&txn, order.id, NotificationKind::Confirmation).await?;

        txn.commit().await.map_err(|e| {
            error!(order_id = %order.id, error = %e, "Failed to commit checkout");
            ServiceError::DatabaseError(e)
        })?;

        info!(order_id = %order.id, customer_id = %customer.id, total = %order.total_amount, "Order placed");
        counter!("bloomhaven_orders.placed", 1, "payment_method" => "cash_on_delivery");
        Ok(OrderResult::from_order(&order, false))
    }

    fn intent_result(
        &self,
        order: &order::Model,
        replayed: bool,
    ) -> Result<PaymentIntentResult, ServiceError> {
        Ok(PaymentIntentResult {
            order_id: order.id,
            gateway_order_id: order.gateway_order_id.clone(),
            amount: to_minor_units(round_money(order.total_amount))?,
            currency: order.currency.clone(),
            key_id: self.gateway.public_key().to_string(),
            status: order.status,
            payment_status: order.payment_status,
            replayed,
        })
    }

    /// Online checkout. The gateway intent is created for the catalog total
    /// before the local commit; a gateway failure leaves no order behind.
    ///
    /// The gateway call runs while the transaction holds the stock rows
    /// written by the reservation: row locks on Postgres, the database write
    /// lock on SQLite. That window is bounded by `payment.timeout_secs`, so
    /// keep the timeout short.
    #[instrument(skip(self, user, request), fields(user_id = %user.user_id, idempotency_key = tracing::field::Empty))]
    pub async fn create_payment_intent(
        &self,
        user: &AuthUser,
        request: PaymentIntentRequest,
    ) -> Result<PaymentIntentResult, ServiceError> {
        let lines = merge_lines(&request.items)?;
        let key = require_key(request.idempotency_key.as_deref())?;
        tracing::Span::current().record("idempotency_key", key.as_str());

        let txn = self.begin().await?;
        let customer = CustomerService::provision_on(&txn, user).await?;

        if let Some(existing) = find_existing(&txn, customer.id, &key).await? {
            txn.commit().await.map_err(ServiceError::db_error)?;
            info!(order_id = %existing.id, "Idempotent replay of payment intent");
            counter!("bloomhaven_orders.idempotent_replays", 1);
            return self.intent_result(&existing, true);
        }

        let (priced, total) = price_lines(&txn, &lines).await?;
        if let Some(claimed) = request.amount {
            if round_money(claimed) != total {
                warn!(claimed = %claimed, total = %total, "Client amount differs from catalog total");
            }
        }

        // Stock is taken before the remote call so a sold-out item never reaches the gateway
        reserve_lines(&txn, &priced).await?;

        let amount_minor = to_minor_units(total)?;
        let order_id = Uuid::new_v4();
        let intent = self
            .gateway
            .create_intent(amount_minor, &self.currency, &order_id.to_string())
            .await
            .map_err(|e| {
                error!(error = %e, "Gateway intent creation failed");
                ServiceError::from(e)
            })?;

        let new_order = NewOrder {
            id: order_id,
            customer_id: customer.id,
            idempotency_key: key.clone(),
            payment_method: PaymentMethod::Online,
            status: OrderStatus::PaymentPending,
            total,
            gateway_order_id: Some(intent.intent_id.clone()),
        };

        let order = match insert_order_rows(&txn, new_order, &priced, &self.currency).await? {
            Ok(order) => order,
            Err(e) if is_unique_violation(&e) => {
                txn.rollback().await.map_err(ServiceError::db_error)?;
                warn!(gateway_order_id = %intent.intent_id, "Orphaned gateway intent after idempotency race");
                let winner = self.winner_after_conflict(customer.id, &key).await?;
                counter!("bloomhaven_orders.idempotent_replays", 1);
                return self.intent_result(&winner, true);
            }
            Err(e) => {
                error!(error = %e, "Failed to insert order");
                return Err(ServiceError::DatabaseError(e));
            }
        };

        txn.commit().await.map_err(|e| {
            error!(order_id = %order.id, error = %e, "Failed to commit payment intent");
            ServiceError::DatabaseError(e)
        })?;

        info!(
            order_id = %order.id,
            gateway_order_id = %intent.intent_id,
            amount_minor,
            "Payment intent created"
        );
        counter!("bloomhaven_orders.placed", 1, "payment_method" => "online");
        self.intent_result(&order, false)
    }
}
