//! API error types and responses
//!
//! Request-level problems are answered with a status inside a normal response
//! body; only infrastructure faults reach this type. They are reported as an
//! unsigned, generic `FAILURE` without internal detail.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::issuance::IssuanceFault;

/// API error type
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// A dependency of the authority is unreachable
    #[error("Service unavailable: {0}")]
    Unavailable(String),
}

/// API error response body
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            ApiError::Unavailable(msg) => {
                error!(error = %msg, "Infrastructure fault");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "FAILURE",
                    "Attribute authority temporarily unavailable".to_string(),
                )
            }
        };

        let body = ErrorResponse {
            error: message,
            code: code.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

impl From<IssuanceFault> for ApiError {
    fn from(err: IssuanceFault) -> Self {
        ApiError::Unavailable(err.to_string())
    }
}
