// Core services
pub mod addresses;
pub mod inventory;
pub mod orders;
pub mod payments;

// Status changes and the audit trail
pub mod order_status;

// Cart, catalog, coupons and checkout
pub mod commerce;
