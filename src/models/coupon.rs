use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entities::coupon;

/// A per-user discount code.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Coupon {
    pub id: Uuid,
    #[schema(example = "GIFT7QX2KD")]
    pub code: String,
    /// Whole percent, 0 to 100
    #[schema(example = 10)]
    pub discount_percent: u8,
    pub owner_user_id: Uuid,
    pub active: bool,
    pub expires_at: DateTime<Utc>,
}

impl From<coupon::Model> for Coupon {
    fn from(model: coupon::Model) -> Self {
        Self {
            id: model.id,
            code: model.code,
            // the column is written from a u8 and never exceeds 100
            discount_percent: u8::try_from(model.discount_percent.clamp(0, 100)).unwrap_or(0),
            owner_user_id: model.owner_user_id,
            active: model.active,
            expires_at: model.expires_at,
        }
    }
}
