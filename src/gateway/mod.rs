//! Hosted payment sessions.
//!
//! The gateway is the only durable link between session creation and
//! confirmation, so everything the reconciler needs later travels in the
//! session metadata as a flat string map.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;
use tracing::warn;
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::models::CartLine;

pub mod stripe;
pub mod webhook;

pub use stripe::StripeGateway;

const META_USER_ID: &str = "userId";
const META_COUPON_CODE: &str = "couponCode";
const META_PRODUCTS_PREFIX: &str = "products_";

/// Stripe caps metadata at 50 keys with values of at most 500 characters.
pub const MAX_METADATA_KEYS: usize = 50;
pub const MAX_METADATA_VALUE_LEN: usize = 500;
const MAX_SNAPSHOT_CHUNKS: usize = MAX_METADATA_KEYS - 2;

/// Gateway session ids look like `cs_test_a1B2`. Anything else never reaches a gateway URL.
pub fn is_valid_session_id(session_id: &str) -> bool {
    session_id.len() > 3
        && session_id.len() <= 255
        && session_id.starts_with("cs_")
        && session_id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

/// Splits `raw` into pieces of at most `max_len` bytes on char boundaries.
fn chunk_str(raw: &str, max_len: usize) -> Vec<&str> {
    let mut chunks = Vec::new();
    let mut rest = raw;
    while !rest.is_empty() {
        let mut end = rest.len().min(max_len);
        while !rest.is_char_boundary(end) {
            end -= 1;
        }
        let (head, tail) = rest.split_at(end);
        chunks.push(head);
        rest = tail;
    }
    chunks
}

/// Payment state reported by the gateway. Only `Paid` completes a purchase.
#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display, strum::EnumString, strum::AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum PaymentStatus {
    Paid,
    Unpaid,
    NoPaymentRequired,
}

impl PaymentStatus {
    /// Unknown values are treated as not paid.
    pub fn parse(raw: &str) -> Self {
        PaymentStatus::from_str(raw).unwrap_or_else(|_| {
            warn!(status = raw, "unknown gateway payment status");
            PaymentStatus::Unpaid
        })
    }

    pub fn is_paid(self) -> bool {
        self == PaymentStatus::Paid
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
struct SnapshotLine {
    id: Uuid,
    quantity: i64,
    price: i64,
}

/// Data attached to a session at creation and read back on confirmation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionMetadata {
    pub user_id: Uuid,
    pub coupon_code: Option<String>,
    /// Lines at the prices charged when the session was created
    pub cart_snapshot: Vec<CartLine>,
}

impl SessionMetadata {
    pub fn to_map(&self) -> Result<BTreeMap<String, String>, ServiceError> {
        let snapshot: Vec<SnapshotLine> = self
            .cart_snapshot
            .iter()
            .map(|line| SnapshotLine {
                id: line.product_id,
                quantity: line.quantity,
                price: line.unit_price_minor_units,
            })
            .collect();

        let coupon_code = self.coupon_code.clone().unwrap_or_default();
        if coupon_code.len() > MAX_METADATA_VALUE_LEN {
            return Err(ServiceError::InvalidRequest("coupon code is too long".into()));
        }

        let products = serde_json::to_string(&snapshot)?;
        let chunks = chunk_str(&products, MAX_METADATA_VALUE_LEN);
        if chunks.len() > MAX_SNAPSHOT_CHUNKS {
            return Err(ServiceError::InvalidRequest(format!(
                "cart has too many lines to check out ({})",
                self.cart_snapshot.len()
            )));
        }

        let mut map = BTreeMap::new();
        map.insert(META_USER_ID.to_string(), self.user_id.to_string());
        map.insert(META_COUPON_CODE.to_string(), coupon_code);
        for (i, chunk) in chunks.into_iter().enumerate() {
            map.insert(format!("{}{}", META_PRODUCTS_PREFIX, i), chunk.to_string());
        }
        Ok(map)
    }

    /// Rebuilds the metadata written by [`SessionMetadata::to_map`].
    ///
    /// A map with neither a user id nor snapshot keys belongs to a session
    /// some other integration created and yields `ForeignSession`.
    pub fn from_map(map: &HashMap<String, String>) -> Result<Self, ServiceError> {
        let has_snapshot = map.contains_key(&format!("{}0", META_PRODUCTS_PREFIX));
        if !map.contains_key(META_USER_ID) && !has_snapshot {
            return Err(ServiceError::ForeignSession(
                "session carries no checkout metadata".into(),
            ));
        }

        let user_id = map
            .get(META_USER_ID)
            .ok_or_else(|| ServiceError::Internal("session metadata lacks userId".into()))
            .and_then(|raw| {
                Uuid::parse_str(raw).map_err(|e| {
                    ServiceError::Internal(format!("session metadata userId is invalid: {}", e))
                })
            })?;

        let coupon_code = map
            .get(META_COUPON_CODE)
            .map(|code| code.trim())
            .filter(|code| !code.is_empty())
            .map(str::to_string);

        if !has_snapshot {
            return Err(ServiceError::Internal(
                "session metadata lacks products".into(),
            ));
        }
        let mut products = String::new();
        for i in 0..MAX_SNAPSHOT_CHUNKS {
            match map.get(&format!("{}{}", META_PRODUCTS_PREFIX, i)) {
                Some(chunk) => products.push_str(chunk),
                None => break,
            }
        }
        let snapshot: Vec<SnapshotLine> = serde_json::from_str(&products).map_err(|e| {
            ServiceError::Internal(format!("session metadata products are invalid: {}", e))
        })?;

        Ok(Self {
            user_id,
            coupon_code,
            cart_snapshot: snapshot
                .into_iter()
                .map(|line| CartLine::new(line.id, line.price, line.quantity))
                .collect(),
        })
    }
}

/// Everything needed to open a hosted checkout session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreateSessionRequest {
    pub line_items: Vec<CartLine>,
    /// Sum of the lines before discount
    pub subtotal_minor_units: i64,
    pub discount_minor_units: i64,
    /// Amount the customer will be charged
    pub total_minor_units: i64,
    pub currency: String,
    pub success_url: String,
    pub cancel_url: String,
    pub metadata: SessionMetadata,
    pub idempotency_key: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreatedSession {
    pub session_id: String,
    pub redirect_url: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionStatus {
    pub session_id: String,
    pub status: PaymentStatus,
    pub amount_paid_minor_units: i64,
    pub currency: Option<String>,
    pub metadata: SessionMetadata,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Opens a hosted session. Never retried internally.
    async fn create_session(
        &self,
        request: CreateSessionRequest,
    ) -> Result<CreatedSession, ServiceError>;

    async fn get_session_status(&self, session_id: &str) -> Result<SessionStatus, ServiceError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn metadata() -> SessionMetadata {
        SessionMetadata {
            user_id: Uuid::new_v4(),
            coupon_code: Some("SAVE10".into()),
            cart_snapshot: vec![
                CartLine::new(Uuid::new_v4(), 500, 2),
                CartLine::new(Uuid::new_v4(), 1000, 1),
            ],
        }
    }

    #[test]
    fn metadata_survives_the_string_map() {
        let meta = metadata();
        let map: HashMap<String, String> = meta.to_map().unwrap().into_iter().collect();
        assert_eq!(SessionMetadata::from_map(&map).unwrap(), meta);
    }

    #[test]
    fn empty_coupon_code_is_written_and_read_as_none() {
        let meta = SessionMetadata {
            coupon_code: None,
            ..metadata()
        };
        let map = meta.to_map().unwrap();
        assert_eq!(map.get("couponCode").map(String::as_str), Some(""));

        let map: HashMap<String, String> = map.into_iter().collect();
        assert_eq!(SessionMetadata::from_map(&map).unwrap().coupon_code, None);
    }

    #[test]
    fn snapshot_uses_compact_line_shape() {
        let product = Uuid::new_v4();
        let meta = SessionMetadata {
            cart_snapshot: vec![CartLine::new(product, 750, 3)],
            ..metadata()
        };
        let map = meta.to_map().unwrap();
        let products: serde_json::Value = serde_json::from_str(&map["products_0"]).unwrap();
        assert_eq!(
            products,
            serde_json::json!([{ "id": product, "quantity": 3, "price": 750 }])
        );
    }

    #[test]
    fn missing_user_id_is_rejected() {
        let mut map: HashMap<String, String> = metadata().to_map().unwrap().into_iter().collect();
        map.remove("userId");
        assert_matches!(SessionMetadata::from_map(&map), Err(ServiceError::Internal(_)));
    }

    #[test]
    fn large_carts_spread_across_keys_within_gateway_limits() {
        let meta = SessionMetadata {
            cart_snapshot: (0..12)
                .map(|_| CartLine::new(Uuid::new_v4(), 12_345, 2))
                .collect(),
            ..metadata()
        };
        let map = meta.to_map().unwrap();

        assert!(map.len() <= MAX_METADATA_KEYS);
        assert!(map.values().all(|v| v.len() <= MAX_METADATA_VALUE_LEN));
        assert!(map.contains_key("products_1"));

        let map: HashMap<String, String> = map.into_iter().collect();
        assert_eq!(SessionMetadata::from_map(&map).unwrap(), meta);
    }

    #[test]
    fn carts_beyond_the_metadata_budget_are_invalid() {
        let meta = SessionMetadata {
            cart_snapshot: (0..400)
                .map(|_| CartLine::new(Uuid::new_v4(), 12_345, 2))
                .collect(),
            ..metadata()
        };
        assert_matches!(meta.to_map(), Err(ServiceError::InvalidRequest(_)));
    }

    #[test]
    fn metadata_without_checkout_keys_is_foreign() {
        let mut map = HashMap::new();
        map.insert("order_ref".to_string(), "payment-link-7".to_string());
        assert_matches!(
            SessionMetadata::from_map(&map),
            Err(ServiceError::ForeignSession(_))
        );
        assert_matches!(
            SessionMetadata::from_map(&HashMap::new()),
            Err(ServiceError::ForeignSession(_))
        );
    }

    #[test]
    fn chunks_respect_char_boundaries() {
        let raw = "aé".repeat(300);
        let chunks = chunk_str(&raw, 500);
        assert!(chunks.iter().all(|c| c.len() <= 500));
        assert_eq!(chunks.concat(), raw);
    }

    #[test]
    fn session_id_shape() {
        assert!(is_valid_session_id("cs_test_a1B2c3"));
        assert!(!is_valid_session_id("cs_"));
        assert!(!is_valid_session_id("cs_test/../../v1/charges"));
        assert!(!is_valid_session_id("pi_123"));
        assert!(!is_valid_session_id(" cs_test_1"));
    }

    #[test]
    fn payment_status_parsing() {
        assert_eq!(PaymentStatus::parse("paid"), PaymentStatus::Paid);
        assert_eq!(
            PaymentStatus::parse("no_payment_required"),
            PaymentStatus::NoPaymentRequired
        );
        assert_eq!(PaymentStatus::parse("something_new"), PaymentStatus::Unpaid);
        assert!(!PaymentStatus::NoPaymentRequired.is_paid());
        assert_eq!(PaymentStatus::Unpaid.to_string(), "unpaid");
    }
}
