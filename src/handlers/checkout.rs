use axum::{extract::State, http::HeaderMap, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;
use validator::{Validate, ValidationError};

use super::common::{idempotency_key, validate_input};
use crate::auth::{AuthUser, ADMIN_ROLE};
use crate::errors::ServiceError;
use crate::gateway::is_valid_session_id;
use crate::models::Order;
use crate::services::cart::CartItemInput;
use crate::services::checkout::SessionHandle;
use crate::{ApiResponse, AppState};

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    #[validate(length(min = 1, message = "cart must contain at least one item"))]
    pub items: Vec<CartItemInput>,
    #[schema(example = "GIFT7QX2KD")]
    pub coupon_code: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmSessionRequest {
    #[validate(custom = "validate_session_id")]
    #[schema(example = "cs_test_a1b2c3")]
    pub session_id: String,
}

fn validate_session_id(session_id: &str) -> Result<(), ValidationError> {
    if is_valid_session_id(session_id) {
        Ok(())
    } else {
        let mut err = ValidationError::new("invalid_session_id");
        err.message = Some("must be a checkout session id (cs_...)".into());
        Err(err)
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ConfirmSessionResponse {
    pub order: Order,
}

/// Create a hosted checkout session for the caller's cart
#[utoipa::path(
    post,
    path = "/api/v1/checkout/session",
    summary = "Create checkout session",
    description = "Prices the cart from the catalog, applies the caller's coupon and opens a payment session",
    request_body = CreateSessionRequest,
    params(
        ("Idempotency-Key" = Option<String>, Header, description = "Forwarded to the payment gateway"),
    ),
    responses(
        (status = 201, description = "Session created", body = ApiResponse<SessionHandle>,
            headers(("X-Request-Id" = String, description = "Unique request id"))
        ),
        (status = 400, description = "Invalid cart", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 503, description = "Payment gateway unavailable", body = crate::errors::ErrorResponse),
    ),
    tag = "Checkout"
)]
pub async fn create_checkout_session(
    State(state): State<AppState>,
    auth_user: AuthUser,
    headers: HeaderMap,
    Json(request): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<ApiResponse<SessionHandle>>), ServiceError> {
    validate_input(&request)?;
    let key = idempotency_key(&headers)?;

    let lines = state.services.cart.assemble(&request.items).await?;
    let handle = state
        .services
        .checkout
        .build_session(
            auth_user.user_id,
            lines,
            request.coupon_code.as_deref(),
            key,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::success(handle))))
}

/// Confirm a paid session and return its order
#[utoipa::path(
    post,
    path = "/api/v1/checkout/confirm",
    summary = "Confirm checkout session",
    description = "Idempotent: repeated confirmations of the same session return the same order",
    request_body = ConfirmSessionRequest,
    responses(
        (status = 200, description = "Order for the paid session", body = ApiResponse<ConfirmSessionResponse>),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Session belongs to another user", body = crate::errors::ErrorResponse),
        (status = 404, description = "Session unknown or not created by this storefront", body = crate::errors::ErrorResponse),
        (status = 409, description = "Payment not completed yet", body = crate::errors::ErrorResponse),
        (status = 500, description = "Persistence failure, safe to retry", body = crate::errors::ErrorResponse),
        (status = 503, description = "Payment gateway unavailable", body = crate::errors::ErrorResponse),
    ),
    tag = "Checkout"
)]
pub async fn confirm_checkout_session(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(request): Json<ConfirmSessionRequest>,
) -> Result<Json<ApiResponse<ConfirmSessionResponse>>, ServiceError> {
    validate_input(&request)?;

    let order = state
        .services
        .reconciler
        .confirm_session(&request.session_id)
        .await?;

    if order.user_id != auth_user.user_id && !auth_user.has_role(ADMIN_ROLE) {
        info!(order_id = %order.id, "confirmation by a different user");
        return Err(ServiceError::Forbidden(
            "session belongs to another user".into(),
        ));
    }

    Ok(Json(ApiResponse::success(ConfirmSessionResponse { order })))
}
