/// Commerce entities module
pub mod cart;
pub mod cart_item;
pub mod coupon;
pub mod customer_address;
pub mod product_variant;

// Re-export entities
pub use super::product::{Entity as Product, Model as ProductModel};
pub use cart::{Entity as Cart, Model as CartModel};
pub use cart_item::{Entity as CartItem, Model as CartItemModel};
pub use coupon::{DiscountType, Entity as Coupon, Model as CouponModel};
pub use customer_address::{AddressType, Entity as CustomerAddress, Model as CustomerAddressModel};
pub use product_variant::{Entity as ProductVariant, Model as ProductVariantModel};
