use crate::config::ValidationError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

#[derive(thiserror::Error, Debug)]
pub enum GatewayError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid gateway config: {0}")]
    Config(#[from] ValidationError),
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Errors returned to the storefront. Messages are part of the public contract and never
/// carry upstream details.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ApiError {
    #[error("Email is required.")]
    MissingCheckEmail,

    #[error("Missing email")]
    MissingPurchaseEmail,

    #[error("Something went wrong")]
    CheckFailed,

    #[error("Failed to sync purchase status")]
    PurchaseFailed,

    #[error("Invalid JSON body: {0}")]
    InvalidBody(String),

    #[error("Method not allowed")]
    MethodNotAllowed,

    #[error("Service is shutting down")]
    ShuttingDown,
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::MissingCheckEmail
            | ApiError::MissingPurchaseEmail
            | ApiError::InvalidBody(_) => StatusCode::BAD_REQUEST,
            ApiError::CheckFailed | ApiError::PurchaseFailed => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = self.status_code();
        let body = ErrorBody {
            error: self.to_string(),
        };
        (code, Json(body)).into_response()
    }
}
