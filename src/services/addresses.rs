use crate::{
    entities::commerce::customer_address::{self, AddressType, Entity as CustomerAddress},
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, IntoActiveModel, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateAddressInput {
    pub address_type: AddressType,
    #[serde(default)]
    pub is_default: bool,
    #[validate(length(min = 1, max = 255))]
    pub full_name: String,
    #[validate(length(min = 1, max = 255))]
    pub address_line_1: String,
    #[serde(default)]
    pub address_line_2: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub city: String,
    #[validate(length(min = 1, max = 100))]
    pub state: String,
    #[validate(length(min = 1, max = 20))]
    pub postal_code: String,
    #[validate(length(min = 1, max = 100))]
    pub country: String,
    #[serde(default)]
    pub phone: Option<String>,
}

/// Clears the default flag on the user's other addresses of one type.
async fn clear_defaults_on<C>(
    conn: &C,
    user_id: Uuid,
    address_type: AddressType,
    keep: Uuid,
) -> Result<(), ServiceError>
where
    C: ConnectionTrait,
{
    CustomerAddress::update_many()
        .col_expr(customer_address::Column::IsDefault, Expr::value(false))
        .col_expr(customer_address::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(customer_address::Column::UserId.eq(user_id))
        .filter(customer_address::Column::AddressType.eq(address_type))
        .filter(customer_address::Column::IsDefault.eq(true))
        .filter(customer_address::Column::Id.ne(keep))
        .exec(conn)
        .await?;
    Ok(())
}

/// Per-user address book with at most one default per address type
#[derive(Clone)]
pub struct AddressService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl AddressService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    #[instrument(skip(self, input))]
    pub async fn create(
        &self,
        user_id: Uuid,
        input: CreateAddressInput,
    ) -> Result<customer_address::Model, ServiceError> {
        input.validate()?;

        let now = Utc::now();
        let address_id = Uuid::new_v4();
        let txn = self.db.begin().await?;

        if input.is_default {
            clear_defaults_on(&txn, user_id, input.address_type, address_id).await?;
        }

        let address = customer_address::ActiveModel {
            id: Set(address_id),
            user_id: Set(user_id),
            address_type: Set(input.address_type),
            is_default: Set(input.is_default),
            full_name: Set(input.full_name),
            address_line_1: Set(input.address_line_1),
            address_line_2: Set(input.address_line_2),
            city: Set(input.city),
            state: Set(input.state),
            postal_code: Set(input.postal_code),
            country: Set(input.country),
            phone: Set(input.phone),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        txn.commit().await?;

        info!(%user_id, address_id = %address.id, "address created");
        self.event_sender
            .send_or_log(Event::AddressCreated {
                user_id,
                address_id: address.id,
            })
            .await;

        Ok(address)
    }

    /// Defaults first, then newest
    #[instrument(skip(self))]
    pub async fn list(
        &self,
        user_id: Uuid,
        address_type: Option<AddressType>,
    ) -> Result<Vec<customer_address::Model>, ServiceError> {
        let mut query =
            CustomerAddress::find().filter(customer_address::Column::UserId.eq(user_id));
        if let Some(address_type) = address_type {
            query = query.filter(customer_address::Column::AddressType.eq(address_type));
        }
        Ok(query
            .order_by_desc(customer_address::Column::IsDefault)
            .order_by_desc(customer_address::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }

    #[instrument(skip(self))]
    pub async fn default_for(
        &self,
        user_id: Uuid,
        address_type: AddressType,
    ) -> Result<customer_address::Model, ServiceError> {
        CustomerAddress::find()
            .filter(customer_address::Column::UserId.eq(user_id))
            .filter(customer_address::Column::AddressType.eq(address_type))
            .filter(customer_address::Column::IsDefault.eq(true))
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("No default {:?} address", address_type).to_lowercase())
            })
    }

    #[instrument(skip(self))]
    pub async fn set_default(
        &self,
        user_id: Uuid,
        address_id: Uuid,
    ) -> Result<customer_address::Model, ServiceError> {
        let txn = self.db.begin().await?;

        let address = CustomerAddress::find_by_id(address_id)
            .filter(customer_address::Column::UserId.eq(user_id))
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Address {} not found", address_id)))?;

        clear_defaults_on(&txn, user_id, address.address_type, address_id).await?;

        let mut active = address.into_active_model();
        active.is_default = Set(true);
        active.updated_at = Set(Utc::now());
        let address = active.update(&txn).await?;

        txn.commit().await?;
        Ok(address)
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, user_id: Uuid, address_id: Uuid) -> Result<(), ServiceError> {
        let result = CustomerAddress::delete_many()
            .filter(customer_address::Column::Id.eq(address_id))
            .filter(customer_address::Column::UserId.eq(user_id))
            .exec(&*self.db)
            .await?;

        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound(format!(
                "Address {} not found",
                address_id
            )));
        }
        Ok(())
    }
}
