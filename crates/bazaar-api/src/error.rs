//! Maps domain `AppError` to HTTP responses.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use bazaar_core::error::{AppError, ErrorKind};

/// Standard API error response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    /// Machine-readable error code.
    pub error: String,
    /// Human-readable message.
    pub message: String,
}

/// Status code and machine-readable code for an error kind.
pub fn status_for(kind: ErrorKind) -> (StatusCode, &'static str) {
    match kind {
        ErrorKind::Unauthorized => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
        ErrorKind::MfaRequired => (StatusCode::FORBIDDEN, "MFA_REQUIRED"),
        ErrorKind::Forbidden => (StatusCode::FORBIDDEN, "FORBIDDEN"),
        ErrorKind::Conflict => (StatusCode::CONFLICT, "CONFLICT"),
        ErrorKind::NotFound => (StatusCode::NOT_FOUND, "NOT_FOUND"),
        ErrorKind::Validation => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
        ErrorKind::Cancelled => (StatusCode::REQUEST_TIMEOUT, "REQUEST_CANCELLED"),
        ErrorKind::Database
        | ErrorKind::Configuration
        | ErrorKind::Serialization
        | ErrorKind::ExternalService
        | ErrorKind::Internal => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
    }
}

impl From<&AppError> for ApiErrorResponse {
    fn from(err: &AppError) -> Self {
        let (_, code) = status_for(err.kind);
        let message = if err.kind.is_internal() {
            "An internal error occurred".to_string()
        } else {
            err.message.clone()
        };
        Self {
            error: code.to_string(),
            message,
        }
    }
}

/// Wrapper so `AppError` can be returned from handlers.
#[derive(Debug)]
pub struct ApiError(pub AppError);

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = self.0;
        let (status, _) = status_for(err.kind);
        if err.kind.is_internal() {
            tracing::error!(kind = %err.kind, error = %err.message, "Internal server error");
        }
        (status, Json(ApiErrorResponse::from(&err))).into_response()
    }
}

/// Result type returned by handlers.
pub type ApiResult<T> = Result<T, ApiError>;
