use crate::{
    entities::{
        commerce::{product_variant, Product, ProductVariant},
        product, CatalogReference,
    },
    errors::ServiceError,
};
use rust_decimal::Decimal;
use sea_orm::{ConnectionTrait, DatabaseConnection, DbErr, EntityTrait};
use serde::Serialize;
use std::sync::Arc;
use tracing::instrument;

/// Pricing and naming facts for a single catalog reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogEntry {
    pub reference: CatalogReference,
    /// Product name; for variants, the parent product's name
    pub name: String,
    pub variant_name: Option<String>,
    pub sku: String,
    pub price: Decimal,
    pub sale_price: Option<Decimal>,
    pub is_on_sale: bool,
    pub is_active: bool,
}

impl CatalogEntry {
    pub fn current_price(&self) -> Decimal {
        product::current_price(self.price, self.sale_price, self.is_on_sale)
    }

    fn from_product(model: product::Model) -> Self {
        Self {
            reference: CatalogReference::Product(model.id),
            name: model.name,
            variant_name: None,
            sku: model.sku,
            price: model.price,
            sale_price: model.sale_price,
            is_on_sale: model.is_on_sale,
            is_active: model.is_active,
        }
    }

    fn from_variant(model: product_variant::Model, parent: Option<product::Model>) -> Self {
        let parent_active = parent.as_ref().map_or(false, |p| p.is_active);
        Self {
            reference: CatalogReference::Variant(model.id),
            name: parent.map(|p| p.name).unwrap_or_else(|| model.name.clone()),
            variant_name: Some(model.name),
            sku: model.sku,
            price: model.price,
            sale_price: model.sale_price,
            is_on_sale: model.is_on_sale,
            is_active: model.is_active && parent_active,
        }
    }
}

/// Looks up a catalog entry on any connection, including an open transaction.
/// The active flag is not checked.
pub async fn find_entry_on<C>(
    conn: &C,
    reference: CatalogReference,
) -> Result<Option<CatalogEntry>, DbErr>
where
    C: ConnectionTrait,
{
    match reference {
        CatalogReference::Product(id) => Ok(Product::find_by_id(id)
            .one(conn)
            .await?
            .map(CatalogEntry::from_product)),
        CatalogReference::Variant(id) => {
            let found = ProductVariant::find_by_id(id)
                .find_also_related(Product)
                .one(conn)
                .await?;
            Ok(found.map(|(variant, parent)| CatalogEntry::from_variant(variant, parent)))
        }
    }
}

/// Like [`find_entry_on`] but rejects missing and inactive entries.
pub async fn get_active_on<C>(
    conn: &C,
    reference: CatalogReference,
) -> Result<CatalogEntry, ServiceError>
where
    C: ConnectionTrait,
{
    let entry = find_entry_on(conn, reference)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Catalog entry {} not found", reference)))?;

    if !entry.is_active {
        return Err(ServiceError::Inactive(format!(
            "Catalog entry {} is not available",
            reference
        )));
    }

    Ok(entry)
}

/// Read-only view over products and variants
#[derive(Clone)]
pub struct CatalogService {
    db: Arc<DatabaseConnection>,
}

impl CatalogService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Returns the entry if it exists and is purchasable.
    #[instrument(skip(self))]
    pub async fn get_active(&self, reference: CatalogReference) -> Result<CatalogEntry, ServiceError> {
        get_active_on(&*self.db, reference).await
    }

    #[instrument(skip(self))]
    pub async fn find_entry(
        &self,
        reference: CatalogReference,
    ) -> Result<Option<CatalogEntry>, ServiceError> {
        Ok(find_entry_on(&*self.db, reference).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn parent(is_active: bool) -> product::Model {
        product::Model {
            id: Uuid::new_v4(),
            name: "T-Shirt".into(),
            sku: "TS".into(),
            price: dec!(20),
            sale_price: None,
            is_on_sale: false,
            is_active,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn variant(parent_id: Uuid) -> product_variant::Model {
        product_variant::Model {
            id: Uuid::new_v4(),
            product_id: parent_id,
            name: "Large".into(),
            sku: "TS-L".into(),
            price: dec!(25),
            sale_price: Some(dec!(22)),
            is_on_sale: true,
            is_default: false,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn variant_entry_takes_parent_name_and_own_price() {
        let p = parent(true);
        let v = variant(p.id);
        let entry = CatalogEntry::from_variant(v.clone(), Some(p));

        assert_eq!(entry.reference, CatalogReference::Variant(v.id));
        assert_eq!(entry.name, "T-Shirt");
        assert_eq!(entry.variant_name.as_deref(), Some("Large"));
        assert_eq!(entry.sku, "TS-L");
        assert_eq!(entry.current_price(), dec!(22));
        assert!(entry.is_active);
    }

    #[test]
    fn variant_of_inactive_product_is_inactive() {
        let p = parent(false);
        let v = variant(p.id);
        assert!(!CatalogEntry::from_variant(v, Some(p)).is_active);
    }
}
