use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::models::Coupon;
use crate::repositories::CouponStore;

/// Read-side coupon operations for the coupon routes.
#[derive(Clone)]
pub struct CouponService {
    coupons: Arc<dyn CouponStore>,
}

impl CouponService {
    pub fn new(coupons: Arc<dyn CouponStore>) -> Self {
        Self { coupons }
    }

    /// The caller's newest active, unexpired coupon.
    #[instrument(skip(self))]
    pub async fn active_coupon(&self, user_id: Uuid) -> Result<Option<Coupon>, ServiceError> {
        self.coupons.latest_active(user_id).await
    }

    /// `NotFound` unless the code is active, unexpired and owned by `user_id`.
    #[instrument(skip(self))]
    pub async fn validate(&self, user_id: Uuid, code: &str) -> Result<Coupon, ServiceError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(ServiceError::InvalidRequest("coupon code is required".into()));
        }
        self.coupons
            .find_active(code, user_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Coupon not found".into()))
    }
}
