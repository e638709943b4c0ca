//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use inventory::StockError;
use orders::OrderError;
use payment::PaymentError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// The requested change conflicts with the resource's current state.
    Conflict(String),
    /// A collaborator (cart service) could not be reached.
    Unavailable(String),
    /// Internal server error.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Unavailable(msg) => (StatusCode::BAD_GATEWAY, msg),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

impl From<OrderError> for ApiError {
    fn from(err: OrderError) -> Self {
        match &err {
            OrderError::InvalidUser | OrderError::EmptyCart => {
                ApiError::BadRequest(err.to_string())
            }
            OrderError::CartUnavailable(_) => ApiError::Unavailable(err.to_string()),
            OrderError::NotFound(_) => ApiError::NotFound(err.to_string()),
            OrderError::TerminalState { .. } => ApiError::Conflict(err.to_string()),
            OrderError::Database(_) | OrderError::Corrupt(_) => {
                ApiError::Internal(err.to_string())
            }
        }
    }
}

impl From<StockError> for ApiError {
    fn from(err: StockError) -> Self {
        // Availability is the only stock call the API makes directly;
        // anything that surfaces here is a storage problem.
        ApiError::Internal(err.to_string())
    }
}

impl From<PaymentError> for ApiError {
    fn from(err: PaymentError) -> Self {
        ApiError::Internal(err.to_string())
    }
}
