/*!
 * # Role-Based Access Control
 *
 * Roles are a closed set resolved once, when the bearer token is validated.
 * Route guards ask [`Role::can`] about a [`Capability`] instead of probing
 * individual user attributes.
 */

use serde::{Deserialize, Serialize};

/// Role carried in the `role` claim.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Role {
    Customer,
    #[strum(to_string = "superadmin", serialize = "super_admin")]
    #[serde(alias = "super_admin")]
    SuperAdmin,
}

/// Something a route requires of the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum Capability {
    /// Cart, checkout, own orders and profile
    Shop,
    ManageCatalog,
    ViewAllOrders,
    OverrideOrderStatus,
}

impl Role {
    pub fn can(self, capability: Capability) -> bool {
        match self {
            Role::SuperAdmin => true,
            Role::Customer => matches!(capability, Capability::Shop),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::str::FromStr;

    #[rstest]
    #[case(Role::Customer, Capability::Shop, true)]
    #[case(Role::Customer, Capability::ManageCatalog, false)]
    #[case(Role::Customer, Capability::ViewAllOrders, false)]
    #[case(Role::Customer, Capability::OverrideOrderStatus, false)]
    #[case(Role::SuperAdmin, Capability::Shop, true)]
    #[case(Role::SuperAdmin, Capability::ManageCatalog, true)]
    #[case(Role::SuperAdmin, Capability::ViewAllOrders, true)]
    #[case(Role::SuperAdmin, Capability::OverrideOrderStatus, true)]
    fn capability_matrix(#[case] role: Role, #[case] capability: Capability, #[case] allowed: bool) {
        assert_eq!(role.can(capability), allowed);
    }

    #[test]
    fn parses_role_claims() {
        assert_eq!(Role::from_str("customer").unwrap(), Role::Customer);
        assert_eq!(Role::from_str("SuperAdmin").unwrap(), Role::SuperAdmin);
        assert_eq!(Role::from_str("super_admin").unwrap(), Role::SuperAdmin);
        assert!(Role::from_str("admin").is_err());
        assert_eq!(Role::SuperAdmin.to_string(), "superadmin");
    }
}
