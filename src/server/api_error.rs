//! Standardized API error responses.
//!
//! Business-logic denials are not errors: `Verify` returns 200 with a
//! deny-type status in the body. This type covers the genuinely erroneous
//! cases only: malformed requests, missing or bad admin credentials,
//! unknown license ids on admin routes, and internal failures.
//!
//! # Response Format
//!
//! ```json
//! {
//!   "error": {
//!     "code": "MISSING_TOKEN",
//!     "message": "Authorization header is required"
//!   }
//! }
//! ```

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Machine-readable error codes for API responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Request payload is invalid or malformed
    InvalidRequest,
    /// No authentication token provided
    MissingToken,
    /// Authentication token is invalid
    InvalidToken,
    /// License id was not found (admin routes only)
    LicenseNotFound,
    /// Internal server error
    InternalError,
}

impl ErrorCode {
    fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::InvalidRequest => StatusCode::BAD_REQUEST,
            ErrorCode::MissingToken => StatusCode::UNAUTHORIZED,
            ErrorCode::InvalidToken => StatusCode::FORBIDDEN,
            ErrorCode::LicenseNotFound => StatusCode::NOT_FOUND,
            ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// API error response body.
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: &'a ApiError,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.code.status_code();
        (status, Json(ErrorBody { error: &self })).into_response()
    }
}
