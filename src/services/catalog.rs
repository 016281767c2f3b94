use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait,
    DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};
use validator::Validate;

use crate::{
    entities::{category, flower},
    errors::ServiceError,
    payments::round_money,
};

/// Query parameters of the public flower listing
#[derive(Debug, Default, Clone, Deserialize)]
pub struct FlowerFilter {
    pub category: Option<i32>,
    /// `"min-max"`
    pub price: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewFlower {
    #[validate(length(min = 1, max = 100, message = "Name must be between 1 and 100 characters"))]
    pub name: String,
    #[validate(length(max = 200))]
    #[serde(default)]
    pub description: String,
    #[validate(custom = "validate_price")]
    pub price: Decimal,
    #[validate(range(min = 0, message = "Stock cannot be negative"))]
    #[serde(default)]
    pub stock: i32,
    pub category_id: Option<i32>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewCategory {
    #[validate(length(min = 1, max = 100, message = "Name must be between 1 and 100 characters"))]
    pub name: String,
    #[validate(length(max = 200))]
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FlowerView {
    pub id: i32,
    pub name: String,
    pub description: String,
    pub price: Decimal,
    pub stock: i32,
    pub category_id: Option<i32>,
    pub category_name: Option<String>,
}

impl FlowerView {
    fn from_parts(flower: flower::Model, category: Option<category::Model>) -> Self {
        Self {
            id: flower.id,
            name: flower.name,
            description: flower.description,
            price: round_money(flower.price),
            stock: flower.stock,
            category_id: flower.category_id,
            category_name: category.map(|c| c.name),
        }
    }
}

fn validate_price(price: &Decimal) -> Result<(), validator::ValidationError> {
    if price.is_sign_negative() || price.round_dp(2) != *price {
        return Err(validator::ValidationError::new("invalid_price"));
    }
    Ok(())
}

/// Parses `"min-max"` into an inclusive price range.
pub fn parse_price_range(raw: &str) -> Result<(Decimal, Decimal), ServiceError> {
    let invalid = || ServiceError::ValidationError(format!("Invalid price range: {}", raw));
    let (min, max) = raw.trim().split_once('-').ok_or_else(invalid)?;
    let min: Decimal = min.trim().parse().map_err(|_| invalid())?;
    let max: Decimal = max.trim().parse().map_err(|_| invalid())?;
    if min > max {
        return Err(invalid());
    }
    Ok((min, max))
}

/// Catalog reads and the stock counters the order core mutates.
#[derive(Clone)]
pub struct CatalogService {
    db: Arc<DatabaseConnection>,
}

impl CatalogService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[instrument(skip(self))]
    pub async fn list_flowers(&self, filter: FlowerFilter) -> Result<Vec<FlowerView>, ServiceError> {
        let mut query = flower::Entity::find().find_also_related(category::Entity);

        if let Some(category_id) = filter.category {
            query = query.filter(flower::Column::CategoryId.eq(category_id));
        }
        if let Some(range) = filter.price.as_deref().filter(|r| !r.trim().is_empty()) {
            let (min, max) = parse_price_range(range)?;
            query = query.filter(flower::Column::Price.between(min, max));
        }

        let rows = query
            .order_by_asc(flower::Column::Id)
            .all(&*self.db)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to list flowers");
                ServiceError::DatabaseError(e)
            })?;

        Ok(rows
            .into_iter()
            .map(|(flower, category)| FlowerView::from_parts(flower, category))
            .collect())
    }

    /// Single flower with its category name.
    pub async fn flower_detail(&self, id: i32) -> Result<FlowerView, ServiceError> {
        let (flower, category) = flower::Entity::find_by_id(id)
            .find_also_related(category::Entity)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Flower {} not found", id)))?;
        Ok(FlowerView::from_parts(flower, category))
    }

    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create_flower(&self, input: NewFlower) -> Result<FlowerView, ServiceError> {
        input.validate()?;

        let category = match input.category_id {
            Some(id) => Some(
                category::Entity::find_by_id(id)
                    .one(&*self.db)
                    .await
                    .map_err(ServiceError::db_error)?
                    .ok_or_else(|| ServiceError::NotFound(format!("Category {} not found", id)))?,
            ),
            None => None,
        };

        let model = flower::ActiveModel {
            name: Set(input.name),
            description: Set(input.description),
            price: Set(input.price),
            stock: Set(input.stock),
            category_id: Set(input.category_id),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(&*self.db)
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to create flower");
            ServiceError::DatabaseError(e)
        })?;

        info!(flower_id = model.id, "Flower created");
        Ok(FlowerView::from_parts(model, category))
    }

    pub async fn list_categories(&self) -> Result<Vec<category::Model>, ServiceError> {
        category::Entity::find()
            .order_by_asc(category::Column::Id)
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)
    }

    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create_category(&self, input: NewCategory) -> Result<category::Model, ServiceError> {
        input.validate()?;

        let exists = category::Entity::find()
            .filter(category::Column::Name.eq(input.name.as_str()))
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;
        if exists.is_some() {
            return Err(ServiceError::Conflict(format!(
                "Category {} already exists",
                input.name
            )));
        }

        let model = category::ActiveModel {
            name: Set(input.name),
            description: Set(input.description),
            ..Default::default()
        }
        .insert(&*self.db)
        .await
        .map_err(ServiceError::db_error)?;

        info!(category_id = model.id, "Category created");
        Ok(model)
    }

    /// Batch lookup keyed by id. Unknown ids are absent from the result.
    pub async fn get_items_by_ids<C: ConnectionTrait>(
        conn: &C,
        ids: &[i32],
    ) -> Result<HashMap<i32, flower::Model>, ServiceError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let flowers = flower::Entity::find()
            .filter(flower::Column::Id.is_in(ids.iter().copied()))
            .all(conn)
            .await
            .map_err(|e| {
                error!(error = %e, "Catalog batch lookup failed");
                ServiceError::DatabaseError(e)
            })?;

        Ok(flowers.into_iter().map(|f| (f.id, f)).collect())
    }

    /// Decrements stock only if enough units remain. Concurrent reservations
    /// of the same flower serialize on the row.
    pub async fn reserve_stock<C: ConnectionTrait>(
        conn: &C,
        flower: &flower::Model,
        quantity: i32,
    ) -> Result<(), ServiceError> {
        let result = flower::Entity::update_many()
            .col_expr(
                flower::Column::Stock,
                Expr::col(flower::Column::Stock).sub(quantity),
            )
            .filter(flower::Column::Id.eq(flower.id))
            .filter(flower::Column::Stock.gte(quantity))
            .exec(conn)
            .await
            .map_err(ServiceError::db_error)?;

        if result.rows_affected == 0 {
            warn!(flower_id = flower.id, quantity, "Insufficient stock");
            return Err(ServiceError::InsufficientStock(format!(
                "Not enough stock for {} (requested {})",
                flower.name, quantity
            )));
        }
        Ok(())
    }

    pub async fn release_stock<C: ConnectionTrait>(
        conn: &C,
        flower_id: i32,
        quantity: i32,
    ) -> Result<(), ServiceError> {
        flower::Entity::update_many()
            .col_expr(
                flower::Column::Stock,
                Expr::col(flower::Column::Stock).add(quantity),
            )
            .filter(flower::Column::Id.eq(flower_id))
            .exec(conn)
            .await
            .map_err(ServiceError::db_error)?;
        Ok(())
    }
}
