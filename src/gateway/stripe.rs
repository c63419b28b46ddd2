//! Stripe Checkout implementation of [`PaymentGateway`].

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, error, instrument};

use super::{
    is_valid_session_id, CreateSessionRequest, CreatedSession, PaymentGateway, PaymentStatus,
    SessionMetadata, SessionStatus,
};
use crate::errors::ServiceError;

pub const DEFAULT_STRIPE_API_BASE: &str = "https://api.stripe.com/v1";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Deserialize)]
struct StripeCheckoutSession {
    id: String,
    url: Option<String>,
    payment_status: String,
    amount_total: Option<i64>,
    currency: Option<String>,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct StripeCoupon {
    id: String,
}

/// Stripe payment gateway
#[derive(Clone)]
pub struct StripeGateway {
    client: Client,
    secret_key: String,
    api_base: String,
}

impl StripeGateway {
    pub fn new(secret_key: impl Into<String>, api_base: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            secret_key: secret_key.into(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
        }
    }

    /// Make authenticated request to Stripe
    async fn stripe_request<T: for<'de> Deserialize<'de>>(
        &self,
        method: reqwest::Method,
        endpoint: &str,
        form: Option<&[(String, String)]>,
        idempotency_key: Option<&str>,
    ) -> Result<T, ServiceError> {
        let url = format!("{}{}", self.api_base, endpoint);

        let mut request = self
            .client
            .request(method, &url)
            .basic_auth(&self.secret_key, Option::<&str>::None);

        if let Some(key) = idempotency_key {
            request = request.header("Idempotency-Key", key);
        }
        if let Some(form_data) = form {
            request = request.form(form_data);
        }

        let response = request.send().await.map_err(|e| {
            error!(error = %e, "Stripe API request failed");
            ServiceError::GatewayUnavailable(e.to_string())
        })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ServiceError::NotFound(format!("Stripe resource {}", endpoint)));
        }
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %error_body, "Stripe API error");
            return Err(error_for_status(status));
        }

        response.json::<T>().await.map_err(|e| {
            error!(error = %e, "Failed to parse Stripe response");
            ServiceError::GatewayUnavailable(format!("malformed Stripe response: {}", e))
        })
    }

    /// One-off coupon worth exactly the discount already computed for the cart.
    async fn create_discount_coupon(
        &self,
        amount_off: i64,
        currency: &str,
        idempotency_key: Option<&str>,
    ) -> Result<String, ServiceError> {
        let form = vec![
            ("amount_off".to_string(), amount_off.to_string()),
            ("currency".to_string(), currency.to_string()),
            ("duration".to_string(), "once".to_string()),
        ];
        let key = idempotency_key.map(|k| format!("{}-discount", k));

        let coupon: StripeCoupon = self
            .stripe_request(
                reqwest::Method::POST,
                "/coupons",
                Some(&form),
                key.as_deref(),
            )
            .await?;
        Ok(coupon.id)
    }
}

/// Only outages are retriable. Other 4xx responses (bad request, bad key)
/// will fail the same way every time.
fn error_for_status(status: StatusCode) -> ServiceError {
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        ServiceError::GatewayUnavailable(format!("Stripe API error: {}", status))
    } else {
        ServiceError::Internal(format!("Stripe rejected the request: {}", status))
    }
}

fn session_form(
    request: &CreateSessionRequest,
    discount_coupon: Option<&str>,
) -> Result<Vec<(String, String)>, ServiceError> {
    let mut form = vec![
        ("mode".to_string(), "payment".to_string()),
        ("payment_method_types[0]".to_string(), "card".to_string()),
        ("success_url".to_string(), request.success_url.clone()),
        ("cancel_url".to_string(), request.cancel_url.clone()),
    ];

    for (i, line) in request.line_items.iter().enumerate() {
        let prefix = format!("line_items[{}]", i);
        form.push((
            format!("{}[price_data][currency]", prefix),
            request.currency.clone(),
        ));
        form.push((
            format!("{}[price_data][unit_amount]", prefix),
            line.unit_price_minor_units.to_string(),
        ));
        form.push((
            format!("{}[price_data][product_data][name]", prefix),
            format!("Product {}", line.product_id),
        ));
        form.push((
            format!("{}[price_data][product_data][metadata][productId]", prefix),
            line.product_id.to_string(),
        ));
        form.push((format!("{}[quantity]", prefix), line.quantity.to_string()));
    }

    if let Some(coupon) = discount_coupon {
        form.push(("discounts[0][coupon]".to_string(), coupon.to_string()));
    }

    for (key, value) in request.metadata.to_map()? {
        form.push((format!("metadata[{}]", key), value));
    }

    Ok(form)
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    #[instrument(skip(self, request), fields(lines = request.line_items.len(), total = request.total_minor_units))]
    async fn create_session(
        &self,
        request: CreateSessionRequest,
    ) -> Result<CreatedSession, ServiceError> {
        debug!("Creating Stripe checkout session");

        let discount_coupon = if request.discount_minor_units > 0 {
            Some(
                self.create_discount_coupon(
                    request.discount_minor_units,
                    &request.currency,
                    request.idempotency_key.as_deref(),
                )
                .await?,
            )
        } else {
            None
        };

        let form = session_form(&request, discount_coupon.as_deref())?;
        let session: StripeCheckoutSession = self
            .stripe_request(
                reqwest::Method::POST,
                "/checkout/sessions",
                Some(&form),
                request.idempotency_key.as_deref(),
            )
            .await?;

        Ok(CreatedSession {
            redirect_url: session.url.unwrap_or_default(),
            session_id: session.id,
        })
    }

    #[instrument(skip(self))]
    async fn get_session_status(&self, session_id: &str) -> Result<SessionStatus, ServiceError> {
        debug!("Retrieving Stripe checkout session");
        if !is_valid_session_id(session_id) {
            return Err(ServiceError::InvalidRequest(
                "malformed checkout session id".into(),
            ));
        }

        let session: StripeCheckoutSession = self
            .stripe_request(
                reqwest::Method::GET,
                &format!("/checkout/sessions/{}", session_id),
                None,
                None,
            )
            .await?;

        Ok(SessionStatus {
            status: PaymentStatus::parse(&session.payment_status),
            amount_paid_minor_units: session.amount_total.unwrap_or(0),
            currency: session.currency,
            metadata: SessionMetadata::from_map(&session.metadata)?,
            session_id: session.id,
        })
    }
}
