use crate::{
    entities::commerce::coupon::{self, DiscountType, Entity as Coupon},
    errors::{is_unique_violation, ServiceError},
};
use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait,
    DatabaseConnection, EntityTrait, IntoActiveModel, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateCouponInput {
    #[validate(length(min = 1, max = 50))]
    pub code: String,
    #[serde(default)]
    #[validate(length(max = 255))]
    pub description: String,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
    #[serde(default)]
    pub minimum_order_amount: Decimal,
    #[serde(default = "default_active")]
    pub is_active: bool,
    pub valid_from: DateTime<Utc>,
    pub valid_to: DateTime<Utc>,
    /// 0 means unlimited
    #[serde(default)]
    pub max_uses: i32,
}

fn default_active() -> bool {
    true
}

/// Partial update; absent fields keep their stored value.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct UpdateCouponInput {
    #[validate(length(max = 255))]
    pub description: Option<String>,
    pub discount_type: Option<DiscountType>,
    pub discount_value: Option<Decimal>,
    pub minimum_order_amount: Option<Decimal>,
    pub is_active: Option<bool>,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_to: Option<DateTime<Utc>>,
    pub max_uses: Option<i32>,
}

/// Rules every stored coupon satisfies
fn check_terms(
    discount_type: DiscountType,
    discount_value: Decimal,
    minimum_order_amount: Decimal,
    valid_from: DateTime<Utc>,
    valid_to: DateTime<Utc>,
    max_uses: i32,
) -> Result<(), ServiceError> {
    if discount_value < Decimal::ZERO {
        return Err(ServiceError::ValidationError(
            "discount_value cannot be negative".to_string(),
        ));
    }
    if discount_type == DiscountType::Percentage && discount_value > Decimal::ONE_HUNDRED {
        return Err(ServiceError::ValidationError(
            "a percentage discount cannot exceed 100".to_string(),
        ));
    }
    if minimum_order_amount < Decimal::ZERO {
        return Err(ServiceError::ValidationError(
            "minimum_order_amount cannot be negative".to_string(),
        ));
    }
    if valid_from > valid_to {
        return Err(ServiceError::ValidationError(
            "valid_from must not be after valid_to".to_string(),
        ));
    }
    if max_uses < 0 {
        return Err(ServiceError::ValidationError(
            "max_uses cannot be negative".to_string(),
        ));
    }
    Ok(())
}

/// A coupon that passed validation together with the discount it yields
#[derive(Debug, Clone, Serialize)]
pub struct AppliedCoupon {
    pub coupon: coupon::Model,
    pub discount: Decimal,
}

/// Checks a coupon code against its active flag, window, usage cap and the
/// optional minimum order amount. A zero total counts as no total, so the
/// minimum is only checked against a positive amount. Never writes.
pub async fn validate_on<C>(
    conn: &C,
    code: &str,
    order_total: Option<Decimal>,
) -> Result<coupon::Model, ServiceError>
where
    C: ConnectionTrait,
{
    let coupon = Coupon::find()
        .filter(coupon::Column::Code.eq(code.trim()))
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Coupon {} not found", code)))?;

    if !coupon.is_valid() {
        return Err(ServiceError::InvalidCoupon(format!(
            "{} is no longer valid",
            coupon.code
        )));
    }

    if let Some(total) = order_total.filter(|total| !total.is_zero()) {
        if total < coupon.minimum_order_amount {
            debug!(%total, minimum = %coupon.minimum_order_amount, "coupon minimum not met");
            return Err(ServiceError::MinimumNotMet(format!(
                "{} requires a minimum order of {}",
                coupon.code, coupon.minimum_order_amount
            )));
        }
    }

    Ok(coupon)
}

/// Increments `times_used` in a single statement. The cap is re-checked in the
/// same statement so concurrent redemptions cannot overshoot it.
pub async fn redeem_on<C>(conn: &C, coupon_id: Uuid) -> Result<(), ServiceError>
where
    C: ConnectionTrait,
{
    let times_used = Expr::col((Coupon, coupon::Column::TimesUsed));
    let result = Coupon::update_many()
        .col_expr(coupon::Column::TimesUsed, times_used.clone().add(1))
        .filter(coupon::Column::Id.eq(coupon_id))
        .filter(
            Condition::any()
                .add(coupon::Column::MaxUses.eq(0))
                .add(times_used.lt(Expr::col((Coupon, coupon::Column::MaxUses)))),
        )
        .exec(conn)
        .await?;

    if result.rows_affected == 0 {
        return Err(ServiceError::InvalidCoupon(
            "coupon usage limit reached".to_string(),
        ));
    }
    Ok(())
}

#[derive(Clone)]
pub struct CouponService {
    db: Arc<DatabaseConnection>,
}

impl CouponService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[instrument(skip(self))]
    pub async fn validate(
        &self,
        code: &str,
        order_total: Option<Decimal>,
    ) -> Result<coupon::Model, ServiceError> {
        validate_on(&*self.db, code, order_total).await
    }

    /// Percentage coupons take `value`% of the total, rounded half away from
    /// zero to cents, and yield nothing without a total. Fixed coupons are
    /// worth their face value.
    pub fn compute_discount(coupon: &coupon::Model, order_total: Option<Decimal>) -> Decimal {
        match coupon.discount_type {
            DiscountType::Percentage => order_total
                .map(|total| {
                    (total * coupon.discount_value / Decimal::ONE_HUNDRED)
                        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
                })
                .unwrap_or(Decimal::ZERO),
            DiscountType::Fixed => coupon.discount_value,
        }
    }

    /// Validate and price a coupon in one call.
    #[instrument(skip(self))]
    pub async fn apply(
        &self,
        code: &str,
        order_total: Option<Decimal>,
    ) -> Result<AppliedCoupon, ServiceError> {
        let coupon = self.validate(code, order_total).await?;
        let discount = Self::compute_discount(&coupon, order_total);
        info!(code = %coupon.code, %discount, "coupon applied");
        Ok(AppliedCoupon { coupon, discount })
    }

    #[instrument(skip(self))]
    pub async fn redeem(&self, coupon_id: Uuid) -> Result<(), ServiceError> {
        redeem_on(&*self.db, coupon_id).await
    }

    /// Creates a coupon. Codes are unique; a taken code is a `Conflict`.
    #[instrument(skip(self, input), fields(code = %input.code))]
    pub async fn create(&self, input: CreateCouponInput) -> Result<coupon::Model, ServiceError> {
        input.validate()?;
        let code = input.code.trim().to_string();
        if code.is_empty() {
            return Err(ServiceError::ValidationError(
                "code cannot be blank".to_string(),
            ));
        }
        check_terms(
            input.discount_type,
            input.discount_value,
            input.minimum_order_amount,
            input.valid_from,
            input.valid_to,
            input.max_uses,
        )?;

        let created = coupon::ActiveModel {
            id: Set(Uuid::new_v4()),
            code: Set(code.clone()),
            description: Set(input.description.trim().to_string()),
            discount_type: Set(input.discount_type),
            discount_value: Set(input.discount_value),
            minimum_order_amount: Set(input.minimum_order_amount),
            is_active: Set(input.is_active),
            valid_from: Set(input.valid_from),
            valid_to: Set(input.valid_to),
            max_uses: Set(input.max_uses),
            times_used: Set(0),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await
        .map_err(|err| {
            if is_unique_violation(&err) {
                ServiceError::Conflict(format!("Coupon {} already exists", code))
            } else {
                err.into()
            }
        })?;

        info!(coupon_id = %created.id, code = %created.code, "coupon created");
        Ok(created)
    }

    /// All coupons, newest first
    #[instrument(skip(self))]
    pub async fn list(&self) -> Result<Vec<coupon::Model>, ServiceError> {
        Ok(Coupon::find()
            .order_by_desc(coupon::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }

    #[instrument(skip(self))]
    pub async fn get(&self, coupon_id: Uuid) -> Result<coupon::Model, ServiceError> {
        Coupon::find_by_id(coupon_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Coupon {} not found", coupon_id)))
    }

    /// Applies the given fields and re-checks the resulting terms. The code
    /// and usage count are not editable.
    #[instrument(skip(self, input))]
    pub async fn update(
        &self,
        coupon_id: Uuid,
        input: UpdateCouponInput,
    ) -> Result<coupon::Model, ServiceError> {
        input.validate()?;
        let current = self.get(coupon_id).await?;

        let discount_type = input.discount_type.unwrap_or(current.discount_type);
        let discount_value = input.discount_value.unwrap_or(current.discount_value);
        let minimum_order_amount = input
            .minimum_order_amount
            .unwrap_or(current.minimum_order_amount);
        let valid_from = input.valid_from.unwrap_or(current.valid_from);
        let valid_to = input.valid_to.unwrap_or(current.valid_to);
        let max_uses = input.max_uses.unwrap_or(current.max_uses);
        check_terms(
            discount_type,
            discount_value,
            minimum_order_amount,
            valid_from,
            valid_to,
            max_uses,
        )?;

        let mut model = current.into_active_model();
        if let Some(description) = input.description {
            model.description = Set(description.trim().to_string());
        }
        if let Some(is_active) = input.is_active {
            model.is_active = Set(is_active);
        }
        model.discount_type = Set(discount_type);
        model.discount_value = Set(discount_value);
        model.minimum_order_amount = Set(minimum_order_amount);
        model.valid_from = Set(valid_from);
        model.valid_to = Set(valid_to);
        model.max_uses = Set(max_uses);

        let updated = model.update(&*self.db).await?;
        info!(%coupon_id, "coupon updated");
        Ok(updated)
    }

    /// Switches a coupon off without deleting it
    #[instrument(skip(self))]
    pub async fn deactivate(&self, coupon_id: Uuid) -> Result<coupon::Model, ServiceError> {
        self.update(
            coupon_id,
            UpdateCouponInput {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await
    }

    /// Orders keep the redeemed code as text, so deleting a coupon never
    /// touches them.
    #[instrument(skip(self))]
    pub async fn delete(&self, coupon_id: Uuid) -> Result<(), ServiceError> {
        let result = Coupon::delete_by_id(coupon_id).exec(&*self.db).await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound(format!(
                "Coupon {} not found",
                coupon_id
            )));
        }
        info!(%coupon_id, "coupon deleted");
        Ok(())
    }
}
