use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use super::common::validate_input;
use crate::auth::AuthUser;
use crate::errors::ServiceError;
use crate::models::Coupon;
use crate::{ApiResponse, AppState};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ValidateCouponRequest {
    #[validate(length(min = 1, max = 64, message = "code is required"))]
    pub code: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ValidCoupon {
    pub code: String,
    pub discount_percent: u8,
}

/// The caller's newest active coupon, or null
#[utoipa::path(
    get,
    path = "/api/v1/coupons",
    summary = "Get active coupon",
    responses(
        (status = 200, description = "Active coupon; data is null when the caller has none", body = ApiResponse<Coupon>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
    ),
    tag = "Coupons"
)]
pub async fn get_coupon(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> Result<Json<ApiResponse<Option<Coupon>>>, ServiceError> {
    let coupon = state.services.coupons.active_coupon(auth_user.user_id).await?;
    Ok(Json(ApiResponse::success(coupon)))
}

/// Check that a code is usable by the caller
#[utoipa::path(
    post,
    path = "/api/v1/coupons/validate",
    summary = "Validate coupon",
    request_body = ValidateCouponRequest,
    responses(
        (status = 200, description = "Coupon is valid", body = ApiResponse<ValidCoupon>),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "Coupon not found", body = crate::errors::ErrorResponse),
    ),
    tag = "Coupons"
)]
pub async fn validate_coupon(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(request): Json<ValidateCouponRequest>,
) -> Result<Json<ApiResponse<ValidCoupon>>, ServiceError> {
    validate_input(&request)?;
    let coupon = state
        .services
        .coupons
        .validate(auth_user.user_id, &request.code)
        .await?;

    Ok(Json(ApiResponse::success(ValidCoupon {
        code: coupon.code,
        discount_percent: coupon.discount_percent,
    })))
}
