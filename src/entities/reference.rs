use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::errors::ServiceError;

/// Discriminator column for rows that point at either a product or a variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(10))")]
#[serde(rename_all = "lowercase")]
pub enum CatalogKind {
    #[sea_orm(string_value = "product")]
    Product,
    #[sea_orm(string_value = "variant")]
    Variant,
}

/// A sellable catalog entry: a standalone product or one of its variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum CatalogReference {
    Product(Uuid),
    Variant(Uuid),
}

impl CatalogReference {
    pub fn from_parts(kind: CatalogKind, id: Uuid) -> Self {
        match kind {
            CatalogKind::Product => Self::Product(id),
            CatalogKind::Variant => Self::Variant(id),
        }
    }

    /// Builds a reference from the loose `product_id` / `variant_id` pair used by
    /// request payloads. Exactly one of the two must be present.
    pub fn from_ids(product_id: Option<Uuid>, variant_id: Option<Uuid>) -> Result<Self, ServiceError> {
        match (product_id, variant_id) {
            (Some(id), None) => Ok(Self::Product(id)),
            (None, Some(id)) => Ok(Self::Variant(id)),
            (Some(_), Some(_)) => Err(ServiceError::InvalidReference(
                "an item cannot reference both a product and a variant".to_string(),
            )),
            (None, None) => Err(ServiceError::InvalidReference(
                "an item must reference either a product or a variant".to_string(),
            )),
        }
    }

    pub fn kind(&self) -> CatalogKind {
        match self {
            Self::Product(_) => CatalogKind::Product,
            Self::Variant(_) => CatalogKind::Variant,
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            Self::Product(id) | Self::Variant(id) => *id,
        }
    }
}

impl fmt::Display for CatalogReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Product(id) => write!(f, "product {}", id),
            Self::Variant(id) => write!(f, "variant {}", id),
        }
    }
}
