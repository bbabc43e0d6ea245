pub mod carts;
pub mod checkout;
pub mod coupons;

pub use carts::carts_routes;
pub use coupons::coupons_routes;
