//! HTTP route handlers.
//!
//! Successful responses are wrapped as `{"data": ..., "meta"?: ..., "message"?: ...}`.

pub mod directions;
pub mod health;
pub mod images;
pub mod metrics;
pub mod models;
pub mod orders;
pub mod payments;
pub mod products;
pub mod reports;
pub mod stocks;
pub mod users;

use std::str::FromStr;

use axum::Json;
use axum::http::StatusCode;
use serde::Serialize;

use crate::error::ApiError;

/// Success response body.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> Envelope<T> {
    pub fn new(data: T) -> Self {
        Self {
            data,
            meta: None,
            message: None,
        }
    }

    pub fn with_meta(mut self, meta: serde_json::Value) -> Self {
        self.meta = Some(meta);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

pub type ApiResult<T> = Result<Json<Envelope<T>>, ApiError>;

pub type Created<T> = Result<(StatusCode, Json<Envelope<T>>), ApiError>;

pub(crate) fn ok<T>(data: T) -> ApiResult<T> {
    Ok(Json(Envelope::new(data)))
}

pub(crate) fn created<T>(data: T) -> Created<T> {
    Ok((StatusCode::CREATED, Json(Envelope::new(data))))
}

/// Parses a path segment into a typed id.
pub(crate) fn parse_id<T>(raw: &str, entity: &str) -> Result<T, ApiError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid {entity} id '{raw}': {e}")))
}
