use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entities::{order, order_item};
use crate::models::CartLine;

/// A line of a completed purchase, captured at session-creation prices.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderLine {
    pub product_id: Uuid,
    pub quantity: i64,
    pub unit_price_minor_units: i64,
}

impl From<CartLine> for OrderLine {
    fn from(line: CartLine) -> Self {
        Self {
            product_id: line.product_id,
            quantity: line.quantity,
            unit_price_minor_units: line.unit_price_minor_units,
        }
    }
}

impl From<order_item::Model> for OrderLine {
    fn from(item: order_item::Model) -> Self {
        Self {
            product_id: item.product_id,
            quantity: item.quantity,
            unit_price_minor_units: item.unit_price_minor_units,
        }
    }
}

/// A completed purchase. Created once per paid session and immutable afterwards.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub lines: Vec<OrderLine>,
    /// Amount the gateway confirmed as paid
    #[schema(example = 2000)]
    pub total_minor_units: i64,
    #[schema(example = "usd")]
    pub currency: String,
    /// Gateway session id
    pub payment_reference: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coupon_code: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Order {
    pub fn from_models(order: order::Model, items: Vec<order_item::Model>) -> Self {
        let mut items = items;
        items.sort_by_key(|item| item.line_no);
        Self {
            id: order.id,
            user_id: order.user_id,
            lines: items.into_iter().map(OrderLine::from).collect(),
            total_minor_units: order.total_minor_units,
            currency: order.currency,
            payment_reference: order.payment_reference,
            coupon_code: order.coupon_code,
            created_at: order.created_at,
        }
    }
}

/// Input for [`crate::repositories::OrderStore::insert`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewOrder {
    pub user_id: Uuid,
    pub lines: Vec<OrderLine>,
    pub total_minor_units: i64,
    pub currency: String,
    pub payment_reference: String,
    pub coupon_code: Option<String>,
}
