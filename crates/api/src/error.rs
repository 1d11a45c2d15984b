//! API error types with HTTP response mapping.
//!
//! Every error renders as `{"error": {"message": ..., "status": ...}}`.

use axum::extract::multipart::MultipartError;
use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::{DomainError, OrderError};
use reporting::ReportError;

use crate::auth::TokenError;

/// Message sent for every 500; the detail goes to the log only.
const INTERNAL_MESSAGE: &str = "Internal server error";

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource or route not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Missing or invalid credentials.
    Unauthorized(String),
    /// Authenticated but not allowed.
    Forbidden(String),
    /// Domain logic error.
    Domain(DomainError),
    /// Report query error.
    Report(ReportError),
    /// Internal server error.
    Internal(String),
}

impl ApiError {
    pub fn forbidden() -> Self {
        ApiError::Forbidden("You are not allowed to access this resource".to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::Domain(err) => domain_error_to_response(err),
            ApiError::Report(err) => report_error_to_response(err),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_MESSAGE.to_string())
            }
        };

        let body = serde_json::json!({
            "error": { "message": message, "status": status.as_u16() }
        });
        (status, axum::Json(body)).into_response()
    }
}

fn domain_error_to_response(err: DomainError) -> (StatusCode, String) {
    let status = match &err {
        DomainError::Order(order_err) => match order_err {
            OrderError::ModelNotFound { .. } | OrderError::UnknownPaymentReference { .. } => {
                StatusCode::NOT_FOUND
            }
            OrderError::StockNotFound { .. }
            | OrderError::InsufficientStock { .. }
            | OrderError::ItemExhausted { .. }
            | OrderError::StateChanged { .. } => StatusCode::CONFLICT,
            OrderError::NoItems
            | OrderError::InvalidQuantity { .. }
            | OrderError::InvalidCurve { .. }
            | OrderError::InvalidDiscount { .. } => StatusCode::BAD_REQUEST,
        },
        DomainError::Validation(_) => StatusCode::BAD_REQUEST,
        DomainError::ImageStorage(domain::services::ImageStorageError::UnsupportedType(_))
        | DomainError::ImageStorage(domain::services::ImageStorageError::Empty(_)) => {
            StatusCode::BAD_REQUEST
        }
        DomainError::NotFound { .. } => StatusCode::NOT_FOUND,
        DomainError::Conflict(_) => StatusCode::CONFLICT,
        DomainError::InvalidCredentials => StatusCode::UNAUTHORIZED,
        DomainError::ImageStorage(_) => {
            tracing::error!(error = %err, "image storage failed");
            return (StatusCode::BAD_GATEWAY, "Image storage unavailable".to_string());
        }
        DomainError::PasswordHash(_) | DomainError::Store(_) | DomainError::Mailer(_) => {
            tracing::error!(error = %err, "internal server error");
            return (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_MESSAGE.to_string());
        }
    };
    (status, err.to_string())
}

fn report_error_to_response(err: ReportError) -> (StatusCode, String) {
    match &err {
        ReportError::InvalidRange { .. } => (StatusCode::BAD_REQUEST, err.to_string()),
        ReportError::Store(_) => {
            tracing::error!(error = %err, "internal server error");
            (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_MESSAGE.to_string())
        }
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        ApiError::Domain(err)
    }
}

impl From<ReportError> for ApiError {
    fn from(err: ReportError) -> Self {
        ApiError::Report(err)
    }
}

impl From<TokenError> for ApiError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Encode(e) => ApiError::Internal(format!("failed to issue token: {e}")),
            other => ApiError::Unauthorized(other.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(rejection: MultipartRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        ApiError::BadRequest(err.body_text())
    }
}
