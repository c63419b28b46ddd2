use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::{distributions::Alphanumeric, Rng};
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set, SqlErr,
};
use std::sync::Arc;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::entities::coupon::{ActiveModel as CouponActiveModel, Column, Entity as CouponEntity};
use crate::errors::ServiceError;
use crate::models::Coupon;
use crate::repositories::{BaseRepository, CouponStore, Repository};

/// Prefix of generated coupon codes
pub const GIFT_CODE_PREFIX: &str = "GIFT";
const GIFT_CODE_SUFFIX_LEN: usize = 6;
const MAX_CODE_ATTEMPTS: usize = 3;

/// `GIFT` followed by six upper-case alphanumerics.
pub fn generate_gift_code() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(GIFT_CODE_SUFFIX_LEN)
        .map(|b| char::from(b).to_ascii_uppercase())
        .collect();
    format!("{}{}", GIFT_CODE_PREFIX, suffix)
}

/// Repository for coupons
#[derive(Debug, Clone)]
pub struct CouponRepository {
    base: BaseRepository,
}

impl CouponRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            base: BaseRepository::new(db),
        }
    }

    /// Insert a coupon with an explicit code.
    pub async fn create_with_code(
        &self,
        code: &str,
        user_id: Uuid,
        discount_percent: u8,
        expires_at: DateTime<Utc>,
    ) -> Result<Coupon, ServiceError> {
        if discount_percent > 100 {
            return Err(ServiceError::InvalidRequest(format!(
                "discount percent {} exceeds 100",
                discount_percent
            )));
        }

        let model = CouponActiveModel {
            id: Set(Uuid::new_v4()),
            code: Set(code.to_string()),
            discount_percent: Set(i16::from(discount_percent)),
            owner_user_id: Set(user_id),
            active: Set(true),
            expires_at: Set(expires_at),
            created_at: Set(Utc::now()),
        };

        Ok(model.insert(self.base.get_db()).await?.into())
    }
}

#[async_trait]
impl CouponStore for CouponRepository {
    #[instrument(skip(self))]
    async fn find_active(&self, code: &str, user_id: Uuid) -> Result<Option<Coupon>, ServiceError> {
        let coupon = CouponEntity::find()
            .filter(Column::Code.eq(code))
            .filter(Column::OwnerUserId.eq(user_id))
            .filter(Column::Active.eq(true))
            .filter(Column::ExpiresAt.gt(Utc::now()))
            .one(self.base.get_db())
            .await?;

        Ok(coupon.map(Coupon::from))
    }

    #[instrument(skip(self))]
    async fn deactivate(&self, code: &str, user_id: Uuid) -> Result<bool, ServiceError> {
        let result = CouponEntity::update_many()
            .col_expr(Column::Active, Expr::value(false))
            .filter(Column::Code.eq(code))
            .filter(Column::OwnerUserId.eq(user_id))
            .filter(Column::Active.eq(true))
            .exec(self.base.get_db())
            .await?;

        debug!(rows_affected = result.rows_affected, "coupon deactivation");
        Ok(result.rows_affected > 0)
    }

    #[instrument(skip(self))]
    async fn create(
        &self,
        user_id: Uuid,
        discount_percent: u8,
        expires_at: DateTime<Utc>,
    ) -> Result<Coupon, ServiceError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let code = generate_gift_code();
            match self
                .create_with_code(&code, user_id, discount_percent, expires_at)
                .await
            {
                Err(ServiceError::PersistenceFailure(err))
                    if attempt < MAX_CODE_ATTEMPTS
                        && matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) =>
                {
                    warn!(attempt, "generated coupon code collided, retrying");
                }
                other => return other,
            }
        }
    }

    #[instrument(skip(self))]
    async fn latest_active(&self, user_id: Uuid) -> Result<Option<Coupon>, ServiceError> {
        let coupon = CouponEntity::find()
            .filter(Column::OwnerUserId.eq(user_id))
            .filter(Column::Active.eq(true))
            .filter(Column::ExpiresAt.gt(Utc::now()))
            .order_by_desc(Column::CreatedAt)
            .one(self.base.get_db())
            .await?;

        Ok(coupon.map(Coupon::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gift_codes_have_expected_shape() {
        for _ in 0..50 {
            let code = generate_gift_code();
            assert_eq!(code.len(), GIFT_CODE_PREFIX.len() + GIFT_CODE_SUFFIX_LEN);
            assert!(code.starts_with(GIFT_CODE_PREFIX));
            assert!(code[GIFT_CODE_PREFIX.len()..]
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
        }
    }
}
