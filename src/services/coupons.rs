use crate::{
    entities::coupon::{self, DiscountType, Entity as Coupon},
    errors::{CouponError, ServiceError},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter,
};
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::db::DbPool;

/// Validated discount, ready to be applied to an order. Redemption (the
/// usage-count increment) is deferred to the order commit.
#[derive(Debug, Clone, PartialEq)]
pub struct CouponDiscount {
    pub code: String,
    pub discount_amount: Decimal,
}

#[derive(Clone)]
pub struct CouponService {
    db: Arc<DbPool>,
}

impl CouponService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    /// Checks a code against the subtotal and returns the computed
    /// discount. No side effect: the usage count is untouched until the
    /// order is durably committed.
    #[instrument(skip(self))]
    pub async fn validate(
        &self,
        code: &str,
        subtotal: Decimal,
    ) -> Result<CouponDiscount, ServiceError> {
        let coupon = Coupon::find()
            .filter(coupon::Column::Code.eq(code))
            .one(&*self.db)
            .await?
            .filter(|c| c.is_active)
            .ok_or_else(|| CouponError::NotFound(code.to_string()))?;

        Self::check_usable(&coupon, subtotal, Utc::now())?;

        let discount_amount = Self::compute_discount(&coupon, subtotal);
        debug!(code = %code, %discount_amount, "Coupon validated");

        Ok(CouponDiscount {
            code: coupon.code,
            discount_amount,
        })
    }

    /// Consumes one use of the coupon on the given connection, typically
    /// the transaction that commits the order. The increment is a single
    /// conditional UPDATE guarded by `used_count < max_uses`; under
    /// concurrent checkouts the losers see zero affected rows and fail
    /// with `UsageExceeded`.
    pub async fn redeem_on<C: ConnectionTrait>(conn: &C, code: &str) -> Result<(), ServiceError> {
        let result = Coupon::update_many()
            .col_expr(
                coupon::Column::UsedCount,
                Expr::col(coupon::Column::UsedCount).add(1),
            )
            .col_expr(coupon::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(coupon::Column::Code.eq(code))
            .filter(coupon::Column::IsActive.eq(true))
            .filter(Expr::col(coupon::Column::UsedCount).lt(Expr::col(coupon::Column::MaxUses)))
            .exec(conn)
            .await?;

        if result.rows_affected == 0 {
            return Err(CouponError::UsageExceeded(code.to_string()).into());
        }
        Ok(())
    }

    /// Rule checks: expiry, then usage cap, then minimum purchase.
    fn check_usable(
        coupon: &coupon::Model,
        subtotal: Decimal,
        now: DateTime<Utc>,
    ) -> Result<(), CouponError> {
        if now >= coupon.expires_at {
            return Err(CouponError::Expired(coupon.code.clone()));
        }
        if coupon.used_count >= coupon.max_uses {
            return Err(CouponError::UsageExceeded(coupon.code.clone()));
        }
        if subtotal < coupon.min_purchase_amount {
            return Err(CouponError::MinimumNotMet {
                code: coupon.code.clone(),
                subtotal,
                min_purchase: coupon.min_purchase_amount,
            });
        }
        Ok(())
    }

    /// Discount amount for a subtotal; never exceeds the subtotal and
    /// never goes negative.
    fn compute_discount(coupon: &coupon::Model, subtotal: Decimal) -> Decimal {
        let raw = match coupon.discount_type {
            DiscountType::Percentage => subtotal * coupon.discount_value / Decimal::from(100),
            DiscountType::FixedAmount => coupon.discount_value,
        };
        raw.min(subtotal).max(Decimal::ZERO)
    }
}
