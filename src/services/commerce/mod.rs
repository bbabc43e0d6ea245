/// Commerce services module - cart, catalog, coupons and checkout
pub mod cart_service;
pub mod catalog_service;
pub mod checkout_service;
pub mod coupon_service;

// Re-export services for convenience
pub use cart_service::{CartOwner, CartService, CartView, PricedLine};
pub use catalog_service::{CatalogEntry, CatalogService};
pub use checkout_service::{CheckoutInput, CheckoutService};
pub use coupon_service::{AppliedCoupon, CouponService, CreateCouponInput, UpdateCouponInput};
