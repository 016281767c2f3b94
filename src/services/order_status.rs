use std::str::FromStr;

use sea_orm::Iterable;

use crate::{entities::OrderStatus, errors::ServiceError};

/// Natural lifecycle edges. The administrative override does not consult this.
pub fn can_transition(from: OrderStatus, to: OrderStatus) -> bool {
    use OrderStatus::*;
    matches!(
        (from, to),
        (PaymentPending, Confirmed)
            | (PaymentPending, PaymentFailed)
            | (Confirmed, Processing)
            | (Confirmed, Cancelled)
            | (Processing, Shipped)
            | (Shipped, Delivered)
    )
}

pub fn is_terminal(status: OrderStatus) -> bool {
    !OrderStatus::iter().any(|to| can_transition(status, to))
}

/// Statuses an administrator may assign, in display order.
pub fn admin_assignable() -> Vec<String> {
    OrderStatus::iter().map(|s| s.to_string()).collect()
}

/// Case-insensitive parse of an administrator-supplied status.
pub fn parse_admin_status(raw: Option<&str>) -> Result<OrderStatus, ServiceError> {
    let invalid = || {
        ServiceError::ValidationError(format!(
            "Invalid status. Choose from [{}]",
            admin_assignable().join(", ")
        ))
    };

    let raw = raw.map(str::trim).filter(|s| !s.is_empty()).ok_or_else(invalid)?;
    OrderStatus::from_str(raw).map_err(|_| invalid())
}
