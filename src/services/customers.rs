use std::sync::Arc;

use chrono::Utc;
use sea_orm::{
    sea_query::OnConflict, ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait,
    DatabaseConnection, EntityTrait, QueryFilter,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};
use uuid::Uuid;
use validator::Validate;

use super::delivery_zones::DeliveryZones;
use crate::{
    auth::{AuthUser, Role},
    entities::customer,
    errors::ServiceError,
};

/// Delivery details a customer may attach to their profile or to a checkout.
#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate)]
pub struct DeliveryInfo {
    #[validate(length(max = 500, message = "Address is too long"))]
    pub address: Option<String>,
    #[serde(alias = "phone")]
    #[validate(length(min = 5, max = 15, message = "Phone number must be 5-15 characters"))]
    pub phone_number: Option<String>,
    #[validate(length(equal = 6, message = "Pincode must be 6 digits"))]
    pub pincode: Option<String>,
}

impl DeliveryInfo {
    fn is_empty(&self) -> bool {
        non_blank(&self.address).is_none()
            && non_blank(&self.phone_number).is_none()
            && non_blank(&self.pincode).is_none()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Profile {
    pub customer_id: Uuid,
    pub username: String,
    pub email: Option<String>,
    pub role: Role,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub pincode: Option<String>,
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Customer profiles keyed by the identity provider's user id.
#[derive(Clone)]
pub struct CustomerService {
    db: Arc<DatabaseConnection>,
    zones: Arc<DeliveryZones>,
}

impl CustomerService {
    pub fn new(db: Arc<DatabaseConnection>, zones: Arc<DeliveryZones>) -> Self {
        Self { db, zones }
    }

    /// Post-registration provisioning: returns the customer row for `user`,
    /// creating it on first call.
    #[instrument(skip(self, user), fields(user_id = %user.user_id))]
    pub async fn provision(&self, user: &AuthUser) -> Result<customer::Model, ServiceError> {
        Self::provision_on(&*self.db, user).await
    }

    /// [`provision`](Self::provision) on an explicit connection or transaction.
    pub async fn provision_on<C: ConnectionTrait>(
        conn: &C,
        user: &AuthUser,
    ) -> Result<customer::Model, ServiceError> {
        if let Some(existing) = Self::find_by_user(conn, user.user_id).await? {
            return Self::sync_identity(conn, existing, user).await;
        }

        let now = Utc::now();
        let row = customer::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user.user_id),
            username: Set(user.username.clone()),
            email: Set(user.email.clone()),
            phone_number: Set(None),
            address: Set(None),
            pincode: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };

        // A concurrent first request may have inserted the row already
        let inserted = customer::Entity::insert(row)
            .on_conflict(
                OnConflict::column(customer::Column::UserId)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(conn)
            .await
            .map_err(|e| {
                error!(user_id = %user.user_id, error = %e, "Failed to provision customer");
                ServiceError::DatabaseError(e)
            })?;

        if inserted > 0 {
            info!(user_id = %user.user_id, "Customer provisioned");
        }

        Self::find_by_user(conn, user.user_id).await?.ok_or_else(|| {
            ServiceError::InternalError(format!("Customer for user {} vanished", user.user_id))
        })
    }

    async fn find_by_user<C: ConnectionTrait>(
        conn: &C,
        user_id: Uuid,
    ) -> Result<Option<customer::Model>, ServiceError> {
        customer::Entity::find()
            .filter(customer::Column::UserId.eq(user_id))
            .one(conn)
            .await
            .map_err(ServiceError::db_error)
    }

    async fn sync_identity<C: ConnectionTrait>(
        conn: &C,
        existing: customer::Model,
        user: &AuthUser,
    ) -> Result<customer::Model, ServiceError> {
        let email_changed = user.email.is_some() && existing.email != user.email;
        if existing.username == user.username && !email_changed {
            return Ok(existing);
        }

        let mut active: customer::ActiveModel = existing.into();
        active.username = Set(user.username.clone());
        if email_changed {
            active.email = Set(user.email.clone());
        }
        active.updated_at = Set(Utc::now());
        active.update(conn).await.map_err(ServiceError::db_error)
    }

    #[instrument(skip(self, user), fields(user_id = %user.user_id))]
    pub async fn profile(&self, user: &AuthUser) -> Result<Profile, ServiceError> {
        let customer = self.provision(user).await?;
        Ok(Profile {
            customer_id: customer.id,
            username: customer.username,
            email: customer.email,
            role: user.role,
            phone: customer.phone_number,
            address: customer.address,
            pincode: customer.pincode,
        })
    }

    #[instrument(skip(self, user, info), fields(user_id = %user.user_id))]
    pub async fn update_delivery(
        &self,
        user: &AuthUser,
        info: DeliveryInfo,
    ) -> Result<customer::Model, ServiceError> {
        let customer = self.provision(user).await?;
        Self::apply_delivery(&*self.db, customer, &info, &self.zones).await
    }

    /// Persists the non-blank fields of `info` on `customer`.
    pub async fn apply_delivery<C: ConnectionTrait>(
        conn: &C,
        customer: customer::Model,
        info: &DeliveryInfo,
        zones: &DeliveryZones,
    ) -> Result<customer::Model, ServiceError> {
        if info.is_empty() {
            return Ok(customer);
        }
        let info = DeliveryInfo {
            address: non_blank(&info.address),
            phone_number: non_blank(&info.phone_number),
            pincode: non_blank(&info.pincode),
        };
        info.validate()?;

        if let Some(pin) = info.pincode.as_deref() {
            if !zones.is_deliverable(pin) {
                return Err(ServiceError::ValidationError(format!(
                    "pincode: we do not deliver to {} yet",
                    pin
                )));
            }
        }

        let mut active: customer::ActiveModel = customer.into();
        if info.address.is_some() {
            active.address = Set(info.address);
        }
        if info.phone_number.is_some() {
            active.phone_number = Set(info.phone_number);
        }
        if info.pincode.is_some() {
            active.pincode = Set(info.pincode);
        }
        active.updated_at = Set(Utc::now());

        active.update(conn).await.map_err(|e| {
            error!(error = %e, "Failed to update delivery details");
            ServiceError::DatabaseError(e)
        })
    }
}
