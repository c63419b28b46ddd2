use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "Stripe-Signature";
pub const DEFAULT_TOLERANCE_SECS: u64 = 300;

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("signature header is malformed")]
    Malformed,
    #[error("signature timestamp outside tolerance")]
    Expired,
    #[error("no signature matched the payload")]
    Mismatch,
}

/// Checks a `t=<unix>,v1=<hex>[,v1=<hex>]` header against
/// HMAC-SHA256 of `"{t}.{payload}"` keyed with `secret`.
pub fn verify_signature(
    header: &str,
    payload: &[u8],
    secret: &str,
    tolerance_secs: u64,
    now_unix: i64,
) -> Result<(), SignatureError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = Some(value),
            Some(("v1", value)) => signatures.push(value),
            _ => {}
        }
    }

    let ts = timestamp.ok_or(SignatureError::Malformed)?;
    if signatures.is_empty() {
        return Err(SignatureError::Malformed);
    }
    let ts_i: i64 = ts.parse().map_err(|_| SignatureError::Malformed)?;
    if (now_unix - ts_i).unsigned_abs() > tolerance_secs {
        return Err(SignatureError::Expired);
    }

    let expected = sign(ts, payload, secret).ok_or(SignatureError::Malformed)?;
    if signatures.iter().any(|sig| constant_time_eq(&expected, sig)) {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

/// Hex HMAC-SHA256 of `"{timestamp}.{payload}"`.
pub fn sign(timestamp: &str, payload: &[u8], secret: &str) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload);
    Some(hex::encode(mac.finalize().into_bytes()))
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut res = 0u8;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) {
        res |= x ^ y;
    }
    res == 0
}

/// The parts of a gateway event this service reads.
#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: WebhookEventData,
}

#[derive(Debug, Deserialize)]
pub struct WebhookEventData {
    pub object: WebhookObject,
}

#[derive(Debug, Deserialize)]
pub struct WebhookObject {
    pub id: Option<String>,
}

impl WebhookEvent {
    /// Session id for events that mean a checkout session may now be paid.
    pub fn completed_session_id(&self) -> Option<&str> {
        match self.event_type.as_str() {
            "checkout.session.completed" | "checkout.session.async_payment_succeeded" => {
                self.data.object.id.as_deref()
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test";
    const NOW: i64 = 1_700_000_000;

    fn header_for(payload: &[u8], ts: i64) -> String {
        let sig = sign(&ts.to_string(), payload, SECRET).unwrap();
        format!("t={},v1={}", ts, sig)
    }

    #[test]
    fn valid_signature_is_accepted() {
        let payload = br#"{"type":"checkout.session.completed"}"#;
        let header = header_for(payload, NOW);
        assert_eq!(
            verify_signature(&header, payload, SECRET, DEFAULT_TOLERANCE_SECS, NOW),
            Ok(())
        );
    }

    #[test]
    fn any_of_several_v1_entries_may_match() {
        let payload = b"{}";
        let good = sign(&NOW.to_string(), payload, SECRET).unwrap();
        let header = format!("t={},v1=deadbeef,v1={}", NOW, good);
        assert!(verify_signature(&header, payload, SECRET, 300, NOW).is_ok());
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let header = header_for(b"{\"a\":1}", NOW);
        assert_eq!(
            verify_signature(&header, b"{\"a\":2}", SECRET, 300, NOW),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn stale_timestamp_is_rejected() {
        let payload = b"{}";
        let header = header_for(payload, NOW - 301);
        assert_eq!(
            verify_signature(&header, payload, SECRET, 300, NOW),
            Err(SignatureError::Expired)
        );
    }

    #[test]
    fn malformed_headers_are_rejected() {
        assert_eq!(
            verify_signature("v1=abc", b"{}", SECRET, 300, NOW),
            Err(SignatureError::Malformed)
        );
        assert_eq!(
            verify_signature("t=notanumber,v1=abc", b"{}", SECRET, 300, NOW),
            Err(SignatureError::Malformed)
        );
        assert_eq!(
            verify_signature(&format!("t={}", NOW), b"{}", SECRET, 300, NOW),
            Err(SignatureError::Malformed)
        );
    }

    #[test]
    fn only_checkout_completion_events_carry_a_session() {
        let event: WebhookEvent = serde_json::from_value(serde_json::json!({
            "id": "evt_1",
            "type": "checkout.session.completed",
            "data": { "object": { "id": "cs_1" } }
        }))
        .unwrap();
        assert_eq!(event.completed_session_id(), Some("cs_1"));

        let other: WebhookEvent = serde_json::from_value(serde_json::json!({
            "type": "charge.refunded",
            "data": { "object": { "id": "ch_1" } }
        }))
        .unwrap();
        assert_eq!(other.completed_session_id(), None);
    }
}
