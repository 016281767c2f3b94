// Catalog and shoppers
pub mod carts;
pub mod catalog;
pub mod customers;
pub mod delivery_zones;

// Order core
pub mod checkout;
pub mod order_status;
pub mod orders;
pub mod payment_reconciliation;
