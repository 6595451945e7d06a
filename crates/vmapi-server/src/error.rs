//! API error types with HTTP status mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use vmapi_core::CoreError;

/// Message returned for every operational failure. The cause is logged.
pub const INTERNAL_MESSAGE: &str = "Internal server error";

/// API error type with HTTP status code mapping.
#[derive(Debug)]
pub enum ApiError {
    /// Bad request - malformed body, failed validation or bad identifier (400).
    BadRequest(String),
    /// Resource not found (404).
    NotFound(String),
    /// Internal server error (500).
    Internal,
}

/// JSON error response body.
#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetails,
}

#[derive(Serialize)]
struct ErrorDetails {
    code: u16,
    message: String,
}

impl ApiError {
    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            ApiError::BadRequest(msg) | ApiError::NotFound(msg) => msg,
            ApiError::Internal => INTERNAL_MESSAGE.to_string(),
        };

        let body = Json(ErrorResponse {
            error: ErrorDetails {
                code: status.as_u16(),
                message,
            },
        });

        (status, body).into_response()
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::NotFound(_) => ApiError::NotFound("VM not found".into()),
            CoreError::Validation(msg) => ApiError::BadRequest(msg),
            CoreError::Config(_) | CoreError::Operation { .. } => ApiError::Internal,
        }
    }
}
