use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// One priced line of a cart. Never persisted; lives for a single checkout request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub product_id: Uuid,
    /// Price per unit in minor currency units
    pub unit_price_minor_units: i64,
    pub quantity: i64,
}

impl CartLine {
    pub fn new(product_id: Uuid, unit_price_minor_units: i64, quantity: i64) -> Self {
        Self {
            product_id,
            unit_price_minor_units,
            quantity,
        }
    }
}
