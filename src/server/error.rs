//! JSON error responses
//!
//! Every user-visible failure is `{"error": "..."}` with a matching status.
//! Internal detail never reaches the body; it travels to the error-reporting
//! middleware as a response extension and is logged there.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Route not found")]
    NotFound,

    #[error("Server is shutting down")]
    ShuttingDown,

    #[error("Internal server error")]
    Internal(String),
}

/// Detail of an internal failure, attached to the 500 response for logging
#[derive(Debug, Clone)]
pub struct ErrorDetail(pub String);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut response = (self.status(), Json(json!({ "error": self.to_string() }))).into_response();
        if let ApiError::Internal(detail) = self {
            response.extensions_mut().insert(ErrorDetail(detail));
        }
        response
    }
}
