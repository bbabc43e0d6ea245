pub mod commerce;
pub mod inventory_record;
pub mod order;
pub mod order_item;
pub mod order_status_history;
pub mod payment;
pub mod product;
pub mod reference;

pub use order::{OrderStatus, PaymentStatus};
pub use reference::{CatalogKind, CatalogReference};
