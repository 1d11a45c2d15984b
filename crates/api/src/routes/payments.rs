//! Payment provider webhook.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::post;
use axum::{Json, Router};
use domain::{PaymentEvent, verify_signature};
use secrecy::ExposeSecret;
use store::{OrderDetail, Store};

use super::{ApiResult, Envelope};
use crate::AppState;
use crate::error::ApiError;

/// Header carrying the hex HMAC-SHA256 of the raw body.
pub const SIGNATURE_HEADER: &str = "x-signature";

pub fn router<S: Store + Clone + 'static>() -> Router<Arc<AppState<S>>> {
    Router::new().route("/webhook", post(webhook::<S>))
}

/// POST /api/v1/payments/webhook: applies a signed payment notification.
#[tracing::instrument(skip(state, headers, body), fields(bytes = body.len()))]
pub async fn webhook<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<OrderDetail> {
    let Some(secret) = &state.webhook_secret else {
        tracing::warn!("payment webhook called but no secret is configured");
        return Err(ApiError::Unauthorized(
            "Payment webhook is not configured".to_string(),
        ));
    };

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized("Missing payment signature".to_string()))?;
    if !verify_signature(secret.expose_secret().as_bytes(), &body, signature) {
        metrics::counter!("payment_webhook_rejected_total").increment(1);
        return Err(ApiError::Unauthorized(
            "Invalid payment signature".to_string(),
        ));
    }

    let event: PaymentEvent = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("Invalid payment event: {e}")))?;
    let detail = state.orders.apply_payment_event(event).await?;
    Ok(Json(
        Envelope::new(detail).with_message("Payment event applied"),
    ))
}
