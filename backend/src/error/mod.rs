//! Centralized API error handling
//!
//! One error type for every handler, mapped to an HTTP status and a JSON
//! body of the form `{"error": {"code", "message", "details"?}}`.

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::auth::AuthError;
use crate::lineage::LineageError;
use crate::store::StoreError;

/// API error type with HTTP status code mapping
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal server error: {0}")]
    InternalError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// JSON error response body
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetails,
}

/// Error details in the response
#[derive(Serialize)]
pub struct ErrorDetails {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ApiError {
    /// Get the error code string
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::InternalError(_) => "INTERNAL_ERROR",
            ApiError::DatabaseError(_) => "DATABASE_ERROR",
            ApiError::ValidationError(_) => "VALIDATION_ERROR",
        }
    }

    /// Get the HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::ValidationError(_) => StatusCode::BAD_REQUEST,
        }
    }

    fn is_server_error(&self) -> bool {
        matches!(self, ApiError::InternalError(_) | ApiError::DatabaseError(_))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_code = self.error_code();

        // Server-side detail stays in the log
        let message = if self.is_server_error() {
            tracing::error!(error = %self, code = %error_code, "Server error occurred");
            "An internal error occurred".to_string()
        } else {
            tracing::debug!(error = %self, code = %error_code, "Client error occurred");
            self.to_string()
        };

        let body = ErrorResponse {
            error: ErrorDetails {
                code: error_code.to_string(),
                message,
                details: None,
            },
        };

        (status, Json(body)).into_response()
    }
}

// Conversions from domain errors

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            // one message for every credential failure
            AuthError::InvalidCredentials => {
                ApiError::Unauthorized("Invalid username or password".to_string())
            }
            AuthError::InvalidRefreshToken | AuthError::RefreshTokenExpired => {
                ApiError::Unauthorized("Invalid or expired refresh token".to_string())
            }
            AuthError::UsernameTaken => ApiError::Conflict(err.to_string()),
            AuthError::Storage(e) => ApiError::from(e),
            AuthError::Token(e) => ApiError::InternalError(e.to_string()),
            AuthError::Password(e) => ApiError::InternalError(e.to_string()),
        }
    }
}

impl From<LineageError> for ApiError {
    fn from(err: LineageError) -> Self {
        match err {
            LineageError::Validation(e) => ApiError::from(e),
            LineageError::InvalidReference(_) => ApiError::BadRequest(err.to_string()),
            LineageError::NotFound { .. } => ApiError::NotFound(err.to_string()),
            LineageError::AlreadyRecorded { .. } | LineageError::MutuallyExclusive { .. } => {
                ApiError::Conflict(err.to_string())
            }
            LineageError::Storage(e) => ApiError::from(e),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::DatabaseError(err.to_string())
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(err: validator::ValidationErrors) -> Self {
        ApiError::ValidationError(err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

/// Result type alias using ApiError
pub type ApiResult<T> = Result<T, ApiError>;
