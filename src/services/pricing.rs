//! Integer money arithmetic. Every discount in the service goes through
//! [`discount_amount`] so the rounding rule is defined once.

use crate::errors::ServiceError;
use crate::models::CartLine;

/// Rejects empty carts, non-positive quantities and negative prices.
pub fn validate_lines(lines: &[CartLine]) -> Result<(), ServiceError> {
    if lines.is_empty() {
        return Err(ServiceError::InvalidRequest(
            "cart must contain at least one line".into(),
        ));
    }
    for (idx, line) in lines.iter().enumerate() {
        if line.quantity <= 0 {
            return Err(ServiceError::InvalidRequest(format!(
                "line {}: quantity must be positive",
                idx
            )));
        }
        if line.unit_price_minor_units < 0 {
            return Err(ServiceError::InvalidRequest(format!(
                "line {}: unit price must not be negative",
                idx
            )));
        }
    }
    Ok(())
}

/// Σ(unit price × quantity). Overflow is an invalid request.
pub fn subtotal(lines: &[CartLine]) -> Result<i64, ServiceError> {
    lines.iter().try_fold(0i64, |acc, line| {
        line.unit_price_minor_units
            .checked_mul(line.quantity)
            .and_then(|amount| acc.checked_add(amount))
            .ok_or_else(|| ServiceError::InvalidRequest("cart total overflows".into()))
    })
}

/// `round_half_up(total × percent / 100)` for non-negative totals.
pub fn discount_amount(total: i64, discount_percent: u8) -> Result<i64, ServiceError> {
    if total < 0 {
        return Err(ServiceError::InvalidRequest(
            "total must not be negative".into(),
        ));
    }
    if discount_percent > 100 {
        return Err(ServiceError::InvalidRequest(format!(
            "discount percent {} exceeds 100",
            discount_percent
        )));
    }
    total
        .checked_mul(i64::from(discount_percent))
        .and_then(|scaled| scaled.checked_add(50))
        .map(|scaled| scaled / 100)
        .ok_or_else(|| ServiceError::InvalidRequest("cart total overflows".into()))
}

/// Total after the discount; never negative.
pub fn apply_discount(total: i64, discount_percent: u8) -> Result<i64, ServiceError> {
    Ok(total - discount_amount(total, discount_percent)?)
}
