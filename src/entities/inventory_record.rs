use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::reference::{CatalogKind, CatalogReference};

pub const DEFAULT_LOW_STOCK_THRESHOLD: i32 = 5;

/// Stock level for a single product or variant
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "inventory")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub reference_kind: CatalogKind,
    pub reference_id: Uuid,
    pub quantity: i32,
    pub low_stock_threshold: i32,
    pub last_checked: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn reference(&self) -> CatalogReference {
        CatalogReference::from_parts(self.reference_kind, self.reference_id)
    }

    pub fn is_low_stock(&self) -> bool {
        self.quantity <= self.low_stock_threshold
    }

    pub fn is_in_stock(&self) -> bool {
        self.quantity > 0
    }
}
