use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use utoipa::IntoParams;

use crate::auth::AdminUser;
use crate::errors::ServiceError;
use crate::services::analytics::{AnalyticsReport, DEFAULT_DAYS};
use crate::{ApiResponse, AppState};

#[derive(Debug, Deserialize, IntoParams)]
pub struct AnalyticsQuery {
    /// Number of days to report, 1 to 365
    #[param(value_type = Option<u32>)]
    pub days: Option<String>,
}

impl AnalyticsQuery {
    /// Parsed here so malformed values get the JSON error envelope.
    pub fn days(&self) -> Result<u32, ServiceError> {
        match self.days.as_deref().map(str::trim) {
            None | Some("") => Ok(DEFAULT_DAYS),
            Some(raw) => raw.parse().map_err(|_| {
                ServiceError::InvalidRequest(format!("days must be a whole number, got {:?}", raw))
            }),
        }
    }
}

/// Sales summary and zero-filled daily sales
#[utoipa::path(
    get,
    path = "/api/v1/analytics",
    summary = "Sales analytics",
    params(AnalyticsQuery),
    responses(
        (status = 200, description = "Analytics report", body = ApiResponse<AnalyticsReport>),
        (status = 400, description = "Invalid window", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Admin role required", body = crate::errors::ErrorResponse),
    ),
    tag = "Analytics"
)]
pub async fn get_analytics(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Query(query): Query<AnalyticsQuery>,
) -> Result<Json<ApiResponse<AnalyticsReport>>, ServiceError> {
    let report = state.services.analytics.report(query.days()?).await?;
    Ok(Json(ApiResponse::success(report)))
}
