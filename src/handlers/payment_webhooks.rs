use axum::{body::Bytes, extract::State, http::HeaderMap, http::StatusCode, response::IntoResponse};
use tracing::{error, info, warn};

use crate::errors::ServiceError;
use crate::gateway::webhook::{
    verify_signature, WebhookEvent, DEFAULT_TOLERANCE_SECS, SIGNATURE_HEADER,
};
use crate::AppState;

// POST /api/v1/payments/webhook
#[utoipa::path(
    post,
    path = "/api/v1/payments/webhook",
    request_body = String,
    responses(
        (status = 200, description = "Webhook accepted"),
        (status = 400, description = "Invalid payload", body = crate::errors::ErrorResponse),
        (status = 401, description = "Invalid signature", body = crate::errors::ErrorResponse),
        (status = 500, description = "Persistence failure; gateway should redeliver", body = crate::errors::ErrorResponse),
        (status = 503, description = "Gateway unavailable; gateway should redeliver", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ServiceError> {
    // Verify signature if configured
    if let Some(secret) = state
        .config
        .payment_webhook_secret
        .as_deref()
        .filter(|s| !s.is_empty())
    {
        let header = headers
            .get(SIGNATURE_HEADER)
            .and_then(|h| h.to_str().ok())
            .unwrap_or_default();
        let tolerance = state
            .config
            .payment_webhook_tolerance_secs
            .unwrap_or(DEFAULT_TOLERANCE_SECS);
        if let Err(e) = verify_signature(
            header,
            &body,
            secret,
            tolerance,
            chrono::Utc::now().timestamp(),
        ) {
            warn!(error = %e, "Payment webhook signature verification failed");
            return Err(ServiceError::Unauthorized(
                "invalid webhook signature".to_string(),
            ));
        }
    }

    let event: WebhookEvent = serde_json::from_slice(&body)
        .map_err(|e| ServiceError::InvalidRequest(format!("invalid webhook payload: {}", e)))?;

    let Some(session_id) = event.completed_session_id() else {
        info!(event_type = %event.event_type, "Unhandled payment webhook type");
        return Ok((StatusCode::OK, "ok"));
    };

    match state.services.reconciler.confirm_session(session_id).await {
        Ok(order) => {
            info!(order_id = %order.id, event_id = ?event.id, "webhook confirmed session");
            Ok((StatusCode::OK, "ok"))
        }
        // a later event (async_payment_succeeded) will arrive once funds settle
        Err(ServiceError::PaymentNotCompleted { status, .. }) => {
            info!(%session_id, %status, "webhook for unpaid session acknowledged");
            Ok((StatusCode::OK, "ok"))
        }
        Err(ServiceError::ForeignSession(reason)) => {
            warn!(%session_id, %reason, "webhook for a session this storefront did not create");
            Ok((StatusCode::OK, "ok"))
        }
        Err(e) => {
            if e.is_retriable() {
                warn!(%session_id, error = %e, "webhook processing failed; expecting redelivery");
            } else {
                error!(%session_id, error = %e, "webhook processing failed permanently");
            }
            Err(e)
        }
    }
}
