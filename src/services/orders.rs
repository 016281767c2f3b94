use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::{Expr, Func},
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, QueryTrait, Select,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use super::{catalog::CatalogService, customers::CustomerService, order_status::parse_admin_status};
use crate::{
    auth::AuthUser,
    db::lock_for_update,
    entities::{
        customer, order, order_item, NotificationKind, OrderStatus, PaymentMethod, PaymentStatus,
    },
    errors::ServiceError,
    notifications::outbox,
    payments::{round_money, to_minor_units, PaymentGateway},
};

const DEFAULT_PER_PAGE: u64 = 20;
const MAX_PER_PAGE: u64 = 100;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderItemView {
    pub flower_id: i32,
    pub flower_name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderView {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub customer_username: Option<String>,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub payment_method: PaymentMethod,
    pub total_amount: Decimal,
    pub currency: String,
    pub gateway_order_id: Option<String>,
    pub gateway_payment_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub items: Vec<OrderItemView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderPage {
    pub orders: Vec<OrderView>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CancelResult {
    pub message: String,
    pub order_id: Uuid,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub payment_method: PaymentMethod,
    pub refund_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StatusChange {
    pub id: Uuid,
    pub status: OrderStatus,
}

/// Admin list query string
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AdminOrderFilter {
    pub customer: Option<String>,
    pub status: Option<String>,
    pub flower_name: Option<String>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    pub total_min: Option<Decimal>,
    pub total_max: Option<Decimal>,
    pub ordering: Option<String>,
    pub page: Option<u64>,
    pub per_page: Option<u64>,
}

fn parse_date(field: &str, raw: &str) -> Result<NaiveDate, ServiceError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|_| {
        ServiceError::ValidationError(format!("{}: expected YYYY-MM-DD, got {}", field, raw))
    })
}

fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc())
        .unwrap_or_default()
}

fn contains_pattern(raw: &str) -> String {
    format!("%{}%", raw.trim().to_lowercase())
}

fn apply_ordering(
    query: Select<order::Entity>,
    ordering: Option<&str>,
) -> Result<Select<order::Entity>, ServiceError> {
    let query = match ordering.map(str::trim).filter(|o| !o.is_empty()) {
        None | Some("-created_at") => query.order_by_desc(order::Column::CreatedAt),
        Some("created_at") => query.order_by_asc(order::Column::CreatedAt),
        Some("total_amount") => query.order_by_asc(order::Column::TotalAmount),
        Some("-total_amount") => query.order_by_desc(order::Column::TotalAmount),
        Some(other) => {
            return Err(ServiceError::ValidationError(format!(
                "Invalid ordering {}. Choose from [created_at, -created_at, total_amount, -total_amount]",
                other
            )))
        }
    };
    Ok(query.order_by_desc(order::Column::Id))
}

fn apply_filter(
    mut query: Select<order::Entity>,
    filter: &AdminOrderFilter,
) -> Result<Select<order::Entity>, ServiceError> {
    if let Some(name) = filter.customer.as_deref().filter(|s| !s.trim().is_empty()) {
        let customers = customer::Entity::find()
            .select_only()
            .column(customer::Column::Id)
            .filter(
                Expr::expr(Func::lower(Expr::col((
                    customer::Entity,
                    customer::Column::Username,
                ))))
                .like(contains_pattern(name)),
            )
            .into_query();
        query = query.filter(order::Column::CustomerId.in_subquery(customers));
    }

    if let Some(status) = filter.status.as_deref().filter(|s| !s.trim().is_empty()) {
        query = query.filter(order::Column::Status.eq(status.trim().to_lowercase()));
    }

    if let Some(flower) = filter.flower_name.as_deref().filter(|s| !s.trim().is_empty()) {
        let orders_with_flower = order_item::Entity::find()
            .select_only()
            .column(order_item::Column::OrderId)
            .filter(
                Expr::expr(Func::lower(Expr::col((
                    order_item::Entity,
                    order_item::Column::FlowerName,
                ))))
                .like(contains_pattern(flower)),
            )
            .into_query();
        query = query.filter(order::Column::Id.in_subquery(orders_with_flower));
    }

    if let Some(raw) = filter.date_from.as_deref().filter(|s| !s.trim().is_empty()) {
        let from = start_of_day(parse_date("date_from", raw)?);
        query = query.filter(order::Column::CreatedAt.gte(from));
    }
    if let Some(raw) = filter.date_to.as_deref().filter(|s| !s.trim().is_empty()) {
        let until = start_of_day(parse_date("date_to", raw)?) + ChronoDuration::days(1);
        query = query.filter(order::Column::CreatedAt.lt(until));
    }

    if let Some(min) = filter.total_min {
        query = query.filter(order::Column::TotalAmount.gte(min));
    }
    if let Some(max) = filter.total_max {
        query = query.filter(order::Column::TotalAmount.lte(max));
    }

    apply_ordering(query, filter.ordering.as_deref())
}

/// Attaches items and customer names to `orders`, preserving their order.
async fn load_views<C: ConnectionTrait>(
    conn: &C,
    orders: Vec<order::Model>,
) -> Result<Vec<OrderView>, ServiceError> {
    if orders.is_empty() {
        return Ok(Vec::new());
    }

    let order_ids: Vec<Uuid> = orders.iter().map(|o| o.id).collect();
    let customer_ids: Vec<Uuid> = orders.iter().map(|o| o.customer_id).collect();

    let mut items: HashMap<Uuid, Vec<OrderItemView>> = HashMap::new();
    for item in order_item::Entity::find()
        .filter(order_item::Column::OrderId.is_in(order_ids))
        .order_by_asc(order_item::Column::FlowerId)
        .all(conn)
        .await
        .map_err(ServiceError::db_error)?
    {
        items.entry(item.order_id).or_default().push(OrderItemView {
            flower_id: item.flower_id,
            flower_name: item.flower_name,
            quantity: item.quantity,
            unit_price: round_money(item.unit_price),
        });
    }

    let usernames: HashMap<Uuid, String> = customer::Entity::find()
        .filter(customer::Column::Id.is_in(customer_ids))
        .all(conn)
        .await
        .map_err(ServiceError::db_error)?
        .into_iter()
        .map(|c| (c.id, c.username))
        .collect();

    Ok(orders
        .into_iter()
        .map(|o| OrderView {
            items: items.remove(&o.id).unwrap_or_default(),
            customer_username: usernames.get(&o.customer_id).cloned(),
            id: o.id,
            customer_id: o.customer_id,
            status: o.status,
            payment_status: o.payment_status,
            payment_method: o.payment_method,
            total_amount: round_money(o.total_amount),
            currency: o.currency,
            gateway_order_id: o.gateway_order_id,
            gateway_payment_id: o.gateway_payment_id,
            created_at: o.created_at,
            updated_at: o.updated_at,
        })
        .collect())
}

/// Order queries, customer cancellation and the administrative override.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    gateway: Arc<dyn PaymentGateway>,
}

impl OrderService {
    pub fn new(db: Arc<DatabaseConnection>, gateway: Arc<dyn PaymentGateway>) -> Self {
        Self { db, gateway }
    }

    #[instrument(skip(self, user), fields(user_id = %user.user_id))]
    pub async fn list_customer_orders(&self, user: &AuthUser) -> Result<Vec<OrderView>, ServiceError> {
        let customer = CustomerService::provision_on(&*self.db, user).await?;
        let orders = order::Entity::find()
            .filter(order::Column::CustomerId.eq(customer.id))
            .order_by_desc(order::Column::CreatedAt)
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;
        load_views(&*self.db, orders).await
    }

    #[instrument(skip(self, user), fields(user_id = %user.user_id, order_id = %order_id))]
    pub async fn get_customer_order(
        &self,
        user: &AuthUser,
        order_id: Uuid,
    ) -> Result<OrderView, ServiceError> {
        let customer = CustomerService::provision_on(&*self.db, user).await?;
        let order = order::Entity::find_by_id(order_id)
            .filter(order::Column::CustomerId.eq(customer.id))
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;
        Ok(load_views(&*self.db, vec![order]).await?.remove(0))
    }

    /// Customer cancellation. Only `confirmed` orders qualify; online orders
    /// are refunded in full before the cancellation commits.
    #[instrument(skip(self, user), fields(user_id = %user.user_id, order_id = %order_id))]
    pub async fn cancel_order(
        &self,
        user: &AuthUser,
        order_id: Uuid,
    ) -> Result<CancelResult, ServiceError> {
        let txn = self.db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start cancellation transaction");
            ServiceError::DatabaseError(e)
        })?;

        let customer = CustomerService::provision_on(&txn, user).await?;
        let order = lock_for_update(order::Entity::find_by_id(order_id), txn.get_database_backend())
            .one(&txn)
            .await
            .map_err(ServiceError::db_error)?
            .filter(|o| o.customer_id == customer.id)
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        if order.status != OrderStatus::Confirmed {
            return Err(ServiceError::Conflict(format!(
                "Order cannot be cancelled. Current status: {}",
                order.status
            )));
        }

        let (payment_status, refund_id) = match order.payment_method {
            PaymentMethod::CashOnDelivery => (order.payment_status, None),
            PaymentMethod::Online => {
                let payment_ref = order.gateway_payment_id.clone().ok_or_else(|| {
                    ServiceError::Conflict("Payment ID not found, contact support".to_string())
                })?;
                let amount_minor = to_minor_units(round_money(order.total_amount))?;
                let refund = self
                    .gateway
                    .refund(&payment_ref, amount_minor)
                    .await
                    .map_err(|e| {
                        error!(error = %e, "Refund failed; cancellation aborted");
                        ServiceError::from(e)
                    })?;
                counter!("bloomhaven_payments.refunds", 1);
                info!(refund_id = %refund.refund_id, amount_minor, "Refund issued");
                (PaymentStatus::Refunded, Some(refund.refund_id))
            }
        };

        let payment_method = order.payment_method;
        let mut active: order::ActiveModel = order.into();
        active.status = Set(OrderStatus::Cancelled);
        active.payment_status = Set(payment_status);
        active.updated_at = Set(Utc::now());
        let order = active.update(&txn).await.map_err(|e| {
            error!(error = %e, "Failed to mark order cancelled");
            ServiceError::DatabaseError(e)
        })?;

        restore_stock(&txn, order.id).await?;
        outbox::enqueue(&txn, order.id, NotificationKind::Cancellation).await?;

        txn.commit().await.map_err(|e| {
            if refund_id.is_some() {
                error!(error = %e, "Cancellation commit failed after refund; needs reconciliation");
            }
            ServiceError::DatabaseError(e)
        })?;

        info!(payment_method = %payment_method, "Order cancelled");
        counter!("bloomhaven_orders.cancelled", 1);
        Ok(CancelResult {
            message: "Order cancelled successfully".to_string(),
            order_id: order.id,
            status: order.status,
            payment_status: order.payment_status,
            payment_method,
            refund_id,
        })
    }

    #[instrument(skip(self, filter))]
    pub async fn admin_list(&self, filter: AdminOrderFilter) -> Result<OrderPage, ServiceError> {
        let page = filter.page.unwrap_or(1).max(1);
        let per_page = filter
            .per_page
            .unwrap_or(DEFAULT_PER_PAGE)
            .clamp(1, MAX_PER_PAGE);

        let query = apply_filter(order::Entity::find(), &filter)?;
        let paginator = query.paginate(&*self.db, per_page);
        let total = paginator.num_items().await.map_err(|e| {
            error!(error = %e, "Failed to count orders");
            ServiceError::DatabaseError(e)
        })?;
        let orders = paginator
            .fetch_page(page - 1)
            .await
            .map_err(ServiceError::db_error)?;

        Ok(OrderPage {
            orders: load_views(&*self.db, orders).await?,
            total,
            page,
            per_page,
        })
    }

    pub async fn admin_get(&self, order_id: Uuid) -> Result<OrderView, ServiceError> {
        let order = order::Entity::find_by_id(order_id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;
        Ok(load_views(&*self.db, vec![order]).await?.remove(0))
    }

    /// Administrative override: sets `status` to any allowed value regardless
    /// of the current one. Payment status, stock and notifications are untouched.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn admin_set_status(
        &self,
        order_id: Uuid,
        raw_status: Option<&str>,
    ) -> Result<StatusChange, ServiceError> {
        let status = parse_admin_status(raw_status)?;

        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;
        let order = lock_for_update(order::Entity::find_by_id(order_id), txn.get_database_backend())
            .one(&txn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let previous = order.status;
        let mut active: order::ActiveModel = order.into();
        active.status = Set(status);
        active.updated_at = Set(Utc::now());
        active.update(&txn).await.map_err(ServiceError::db_error)?;
        txn.commit().await.map_err(ServiceError::db_error)?;

        if !super::order_status::can_transition(previous, status) && previous != status {
            warn!(
                from = %previous,
                to = %status,
                reopened = super::order_status::is_terminal(previous),
                "Administrative status override outside lifecycle"
            );
        } else {
            info!(from = %previous, to = %status, "Order status set by admin");
        }

        Ok(StatusChange {
            id: order_id,
            status,
        })
    }
}

/// Puts the quantities of `order_id`'s items back on the shelf.
pub(crate) async fn restore_stock<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
) -> Result<(), ServiceError> {
    let items = order_item::Entity::find()
        .filter(order_item::Column::OrderId.eq(order_id))
        .all(conn)
        .await
        .map_err(ServiceError::db_error)?;
    for item in items {
        CatalogService::release_stock(conn, item.flower_id, item.quantity).await?;
    }
    Ok(())
}
