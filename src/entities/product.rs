use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Product entity
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "products")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub name: String,
    #[sea_orm(unique)]
    pub sku: String,
    #[sea_orm(column_type = "Decimal(Some((10, 2)))")]
    pub price: Decimal,
    #[sea_orm(column_type = "Decimal(Some((10, 2)))", nullable)]
    pub sale_price: Option<Decimal>,
    pub is_on_sale: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::commerce::product_variant::Entity")]
    Variants,
}

impl Related<super::commerce::product_variant::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Variants.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Sale price while on sale, list price otherwise
    pub fn current_price(&self) -> Decimal {
        current_price(self.price, self.sale_price, self.is_on_sale)
    }

    /// Percentage knocked off the list price, rounded to two places
    pub fn discount_percentage(&self) -> Decimal {
        match (self.is_on_sale, self.sale_price) {
            (true, Some(sale)) if self.price > Decimal::ZERO => {
                ((self.price - sale) / self.price * Decimal::ONE_HUNDRED)
                    .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
            }
            _ => Decimal::ZERO,
        }
    }
}

/// Shared price rule for products and variants. A sale flag without a sale
/// price falls back to the list price.
pub fn current_price(price: Decimal, sale_price: Option<Decimal>, is_on_sale: bool) -> Decimal {
    match sale_price {
        Some(sale) if is_on_sale => sale,
        _ => price,
    }
}
