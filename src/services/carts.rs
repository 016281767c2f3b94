use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::OnConflict, ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait,
    DatabaseConnection, EntityTrait, ModelTrait, QueryFilter, QueryOrder,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};
use uuid::Uuid;
use validator::Validate;

use super::customers::CustomerService;
use crate::{
    auth::AuthUser,
    entities::{cart, cart_item, flower},
    errors::ServiceError,
    payments::round_money,
};

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AddCartItem {
    pub flower_id: i32,
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    #[serde(default = "default_quantity")]
    pub quantity: i32,
}

fn default_quantity() -> i32 {
    1
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateCartItem {
    pub quantity: Option<i32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CartLine {
    pub id: Uuid,
    pub flower_id: i32,
    pub flower_name: String,
    pub unit_price: Decimal,
    pub quantity: i32,
    pub line_total: Decimal,
}

impl CartLine {
    fn new(item: cart_item::Model, flower: &flower::Model) -> Self {
        let unit_price = round_money(flower.price);
        Self {
            id: item.id,
            flower_id: item.flower_id,
            flower_name: flower.name.clone(),
            unit_price,
            quantity: item.quantity,
            line_total: unit_price * Decimal::from(item.quantity),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CartView {
    pub id: Uuid,
    pub items: Vec<CartLine>,
    pub total: Decimal,
}

fn stock_error(stock: i32, in_cart: i32) -> ServiceError {
    ServiceError::InsufficientStock(format!(
        "Only {} units available. You already have {} in cart.",
        stock, in_cart
    ))
}

/// One cart per customer, created on first use.
#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
}

impl CartService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    async fn cart_for<C: ConnectionTrait>(
        conn: &C,
        customer_id: Uuid,
    ) -> Result<cart::Model, ServiceError> {
        let now = Utc::now();
        cart::Entity::insert(cart::ActiveModel {
            id: Set(Uuid::new_v4()),
            customer_id: Set(customer_id),
            created_at: Set(now),
            updated_at: Set(now),
        })
        .on_conflict(
            OnConflict::column(cart::Column::CustomerId)
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(conn)
        .await
        .map_err(ServiceError::db_error)?;

        cart::Entity::find()
            .filter(cart::Column::CustomerId.eq(customer_id))
            .one(conn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::InternalError("Cart could not be created".to_string()))
    }

    async fn owned_item(
        &self,
        cart: &cart::Model,
        item_id: Uuid,
    ) -> Result<(cart_item::Model, flower::Model), ServiceError> {
        let found = cart_item::Entity::find_by_id(item_id)
            .filter(cart_item::Column::CartId.eq(cart.id))
            .find_also_related(flower::Entity)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;

        match found {
            Some((item, Some(flower))) => Ok((item, flower)),
            _ => Err(ServiceError::NotFound(format!(
                "Cart item {} not found",
                item_id
            ))),
        }
    }

    #[instrument(skip(self, user), fields(user_id = %user.user_id))]
    pub async fn view(&self, user: &AuthUser) -> Result<CartView, ServiceError> {
        let customer = CustomerService::provision_on(&*self.db, user).await?;
        let cart = Self::cart_for(&*self.db, customer.id).await?;

        let rows = cart_item::Entity::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .find_also_related(flower::Entity)
            .order_by_asc(cart_item::Column::AddedAt)
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;

        let items: Vec<CartLine> = rows
            .into_iter()
            .filter_map(|(item, flower)| flower.map(|f| CartLine::new(item, &f)))
            .collect();
        let total = round_money(items.iter().map(|l| l.line_total).sum());

        Ok(CartView {
            id: cart.id,
            items,
            total,
        })
    }

    /// Adds `quantity` of a flower, merging with an existing line.
    #[instrument(skip(self, user, input), fields(user_id = %user.user_id, flower_id = input.flower_id))]
    pub async fn add_item(
        &self,
        user: &AuthUser,
        input: AddCartItem,
    ) -> Result<CartLine, ServiceError> {
        input.validate()?;

        let flower = flower::Entity::find_by_id(input.flower_id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Flower {} not found", input.flower_id)))?;

        let customer = CustomerService::provision_on(&*self.db, user).await?;
        let cart = Self::cart_for(&*self.db, customer.id).await?;

        let existing = cart_item::Entity::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .filter(cart_item::Column::FlowerId.eq(flower.id))
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;

        let in_cart = existing.as_ref().map(|i| i.quantity).unwrap_or(0);
        if in_cart + input.quantity > flower.stock {
            return Err(stock_error(flower.stock, in_cart));
        }

        let item = match existing {
            Some(item) => {
                let mut active: cart_item::ActiveModel = item.into();
                active.quantity = Set(in_cart + input.quantity);
                active.update(&*self.db).await
            }
            None => {
                cart_item::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    cart_id: Set(cart.id),
                    flower_id: Set(flower.id),
                    quantity: Set(input.quantity),
                    added_at: Set(Utc::now()),
                }
                .insert(&*self.db)
                .await
            }
        }
        .map_err(ServiceError::db_error)?;

        info!(cart_id = %cart.id, quantity = item.quantity, "Cart item saved");
        Ok(CartLine::new(item, &flower))
    }

    /// Sets the absolute quantity of a line. `None` is returned when the
    /// quantity was zero or negative and the line was removed.
    #[instrument(skip(self, user), fields(user_id = %user.user_id, item_id = %item_id))]
    pub async fn update_item(
        &self,
        user: &AuthUser,
        item_id: Uuid,
        quantity: i32,
    ) -> Result<Option<CartLine>, ServiceError> {
        let customer = CustomerService::provision_on(&*self.db, user).await?;
        let cart = Self::cart_for(&*self.db, customer.id).await?;
        let (item, flower) = self.owned_item(&cart, item_id).await?;

        if quantity <= 0 {
            item.delete(&*self.db).await.map_err(ServiceError::db_error)?;
            debug!("Cart item removed by zero quantity");
            return Ok(None);
        }

        if quantity > flower.stock {
            return Err(stock_error(flower.stock, item.quantity));
        }

        let mut active: cart_item::ActiveModel = item.into();
        active.quantity = Set(quantity);
        let item = active
            .update(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;

        Ok(Some(CartLine::new(item, &flower)))
    }

    #[instrument(skip(self, user), fields(user_id = %user.user_id, item_id = %item_id))]
    pub async fn remove_item(&self, user: &AuthUser, item_id: Uuid) -> Result<(), ServiceError> {
        let customer = CustomerService::provision_on(&*self.db, user).await?;
        let cart = Self::cart_for(&*self.db, customer.id).await?;
        let (item, _) = self.owned_item(&cart, item_id).await?;
        item.delete(&*self.db).await.map_err(ServiceError::db_error)?;
        Ok(())
    }

    /// Empties the customer's cart on `conn`. Returns the number of lines removed.
    pub async fn clear<C: ConnectionTrait>(conn: &C, customer_id: Uuid) -> Result<u64, ServiceError> {
        let cart = cart::Entity::find()
            .filter(cart::Column::CustomerId.eq(customer_id))
            .one(conn)
            .await
            .map_err(ServiceError::db_error)?;

        let Some(cart) = cart else {
            return Ok(0);
        };

        let result = cart_item::Entity::delete_many()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .exec(conn)
            .await
            .map_err(ServiceError::db_error)?;
        Ok(result.rows_affected)
    }
}
