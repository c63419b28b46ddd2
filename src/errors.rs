use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::error::DbErr;
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;

fn current_request_id() -> Option<String> {
    crate::tracing::current_request_id().map(|rid| rid.as_str().to_string())
}

/// Simplified error structure for OpenAPI documentation
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "error": "Bad Request",
    "message": "Invalid request: cart must contain at least one line",
    "request_id": "req-abc123xyz",
    "timestamp": "2025-03-01T10:30:00.000Z"
}))]
pub struct ErrorResponse {
    /// HTTP status category (e.g., "Not Found", "Bad Request", "Internal Server Error")
    #[schema(example = "Bad Request")]
    pub error: String,
    /// Human-readable error description
    #[schema(example = "Invalid request: cart must contain at least one line")]
    pub message: String,
    /// Additional error details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// Unique request identifier for support and debugging
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(example = "req-abc123xyz")]
    pub request_id: Option<String>,
    /// ISO 8601 timestamp when error occurred
    #[schema(example = "2025-03-01T10:30:00.000Z")]
    pub timestamp: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Malformed cart, quantity or payload. No side effects happened.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The supplied coupon is unknown, inactive, expired or owned by someone else.
    #[error("Coupon not applicable: {0}")]
    CouponNotApplicable(String),

    /// Transient gateway outage: transport failure, 5xx or rate limiting.
    #[error("Payment gateway unavailable: {0}")]
    GatewayUnavailable(String),

    /// The gateway has not (yet) marked the session as paid.
    #[error("Payment not completed for session {session_id} (status: {status})")]
    PaymentNotCompleted { session_id: String, status: String },

    /// An order already exists for this payment reference.
    #[error("Duplicate confirmation for payment reference {0}")]
    DuplicateConfirmation(String),

    /// The gateway session was created by another integration and carries no checkout metadata.
    #[error("Session not created by this storefront: {0}")]
    ForeignSession(String),

    #[error("Persistence failure: {0}")]
    PersistenceFailure(#[from] DbErr),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::InvalidRequest(err.to_string())
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::Internal(format!("serialization failed: {}", err))
    }
}

impl ServiceError {
    /// Convenience constructor for wrapping string-based database errors.
    pub fn persistence(message: impl Into<String>) -> Self {
        ServiceError::PersistenceFailure(DbErr::Custom(message.into()))
    }

    /// Whether the caller may retry the same call and expect convergence.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::GatewayUnavailable(_)
                | Self::PaymentNotCompleted { .. }
                | Self::PersistenceFailure(_)
        )
    }

    /// Returns the HTTP status code for this error.
    /// This is the single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::CouponNotApplicable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::GatewayUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::PaymentNotCompleted { .. } | Self::DuplicateConfirmation(_) => {
                StatusCode::CONFLICT
            }
            Self::NotFound(_) | Self::ForeignSession(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::PersistenceFailure(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the error message suitable for HTTP responses.
    /// Internal errors return generic messages to avoid leaking implementation details.
    pub fn response_message(&self) -> String {
        match self {
            Self::PersistenceFailure(_) => "Database error".to_string(),
            Self::Internal(_) => "Internal server error".to_string(),
            Self::GatewayUnavailable(_) => "Payment gateway temporarily unavailable".to_string(),
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let error_message = self.response_message();

        let request_id = current_request_id();
        let err = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message: error_message,
            details: None,
            request_id,
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(err)).into_response()
    }
}
