use chrono::{Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::CheckoutPolicy;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::gateway::{CreateSessionRequest, PaymentGateway, SessionMetadata};
use crate::models::{CartLine, Coupon};
use crate::repositories::CouponStore;
use crate::services::pricing;

/// What a client needs to continue to the hosted payment page.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionHandle {
    #[schema(example = "cs_test_a1b2c3")]
    pub session_id: String,
    /// Hosted payment page URL
    pub redirect_handle: String,
    /// Amount the customer will be charged, in minor units
    #[schema(example = 2000)]
    pub total_minor_units: i64,
    pub subtotal_minor_units: i64,
    pub discount_minor_units: i64,
    /// Coupon that was applied, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub applied_coupon: Option<String>,
}

/// Prices a cart, applies the caller's coupon and opens a gateway session.
#[derive(Clone)]
pub struct CheckoutSessionBuilder {
    coupons: Arc<dyn CouponStore>,
    gateway: Arc<dyn PaymentGateway>,
    policy: CheckoutPolicy,
    events: EventSender,
}

impl CheckoutSessionBuilder {
    pub fn new(
        coupons: Arc<dyn CouponStore>,
        gateway: Arc<dyn PaymentGateway>,
        policy: CheckoutPolicy,
        events: EventSender,
    ) -> Self {
        Self {
            coupons,
            gateway,
            policy,
            events,
        }
    }

    /// A coupon that does not apply is logged and the session proceeds at full price.
    async fn resolve_coupon(
        &self,
        user_id: Uuid,
        coupon_code: Option<&str>,
    ) -> Result<Option<Coupon>, ServiceError> {
        let Some(code) = coupon_code.map(str::trim).filter(|c| !c.is_empty()) else {
            return Ok(None);
        };

        match self.coupons.find_active(code, user_id).await? {
            Some(coupon) => Ok(Some(coupon)),
            None => {
                let err = ServiceError::CouponNotApplicable(code.to_string());
                info!(error = %err, "proceeding at full price");
                Ok(None)
            }
        }
    }

    #[instrument(skip(self, lines, idempotency_key), fields(lines = lines.len()))]
    pub async fn build_session(
        &self,
        user_id: Uuid,
        lines: Vec<CartLine>,
        coupon_code: Option<&str>,
        idempotency_key: Option<String>,
    ) -> Result<SessionHandle, ServiceError> {
        pricing::validate_lines(&lines)?;
        let subtotal = pricing::subtotal(&lines)?;

        let coupon = self.resolve_coupon(user_id, coupon_code).await?;
        let discount = match &coupon {
            Some(c) => pricing::discount_amount(subtotal, c.discount_percent)?,
            None => 0,
        };
        let total = subtotal - discount;
        let applied_coupon = coupon.map(|c| c.code);

        let request = CreateSessionRequest {
            line_items: lines.clone(),
            subtotal_minor_units: subtotal,
            discount_minor_units: discount,
            total_minor_units: total,
            currency: self.policy.currency.clone(),
            success_url: self.policy.success_url.clone(),
            cancel_url: self.policy.cancel_url.clone(),
            metadata: SessionMetadata {
                user_id,
                coupon_code: applied_coupon.clone(),
                cart_snapshot: lines,
            },
            idempotency_key,
        };
        // reject snapshots the gateway metadata cannot hold
        request.metadata.to_map()?;

        let created = self.gateway.create_session(request).await?;
        info!(session_id = %created.session_id, total, "checkout session created");

        self.events.publish(Event::CheckoutSessionCreated {
            session_id: created.session_id.clone(),
            user_id,
            total_minor_units: total,
            coupon_code: applied_coupon.clone(),
        });

        if total >= self.policy.loyalty_threshold_minor_units {
            self.issue_loyalty_coupon(user_id).await;
        }

        Ok(SessionHandle {
            session_id: created.session_id,
            redirect_handle: created.redirect_url,
            total_minor_units: total,
            subtotal_minor_units: subtotal,
            discount_minor_units: discount,
            applied_coupon,
        })
    }

    /// Never fails the session.
    async fn issue_loyalty_coupon(&self, user_id: Uuid) {
        let expires_at = Utc::now() + Duration::days(i64::from(self.policy.loyalty_validity_days));
        match self
            .coupons
            .create(user_id, self.policy.loyalty_discount_percent, expires_at)
            .await
        {
            Ok(coupon) => {
                info!(code = %coupon.code, "loyalty coupon issued");
                self.events.publish(Event::LoyaltyCouponIssued {
                    user_id,
                    code: coupon.code,
                    discount_percent: coupon.discount_percent,
                });
            }
            Err(e) => warn!(error = %e, "failed to issue loyalty coupon"),
        }
    }
}
