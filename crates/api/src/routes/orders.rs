//! Order placement, cancellation and item-level edits.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use common::{Money, OrderId, OrderItemId, UserId};
use domain::{OrderLines, PlaceOrder};
use serde::Deserialize;
use store::{Order, OrderDetail, OrderPatch, Store};

use super::{ApiResult, Created, Envelope, created, ok, parse_id};
use crate::AppState;
use crate::auth::AuthUser;
use crate::error::ApiError;

pub fn router<S: Store + Clone + 'static>() -> Router<Arc<AppState<S>>> {
    Router::new()
        .route("/", get(list::<S>).post(create::<S>))
        .route(
            "/{id}",
            get(show::<S>).patch(update::<S>).delete(cancel::<S>),
        )
        .route("/{id}/items/{item_id}", delete(remove_item::<S>))
        .route(
            "/{id}/items/{item_id}/decrement",
            post(remove_one_unit::<S>),
        )
        .route("/{id}/discount", put(discount::<S>))
}

// -- Request types --

/// Body of `POST /orders`: `{"kind": "normal"|"curve", "lines": [...], ...}`.
#[derive(Deserialize)]
pub struct PlaceOrderRequest {
    #[serde(flatten)]
    pub lines: OrderLines,
    #[serde(default)]
    pub comments: Option<String>,
    /// Client-computed total in cents, only compared with the server's.
    #[serde(default)]
    pub total: Option<Money>,
    /// Owner of the order. Only admins may place orders for someone else
    /// or, by leaving this empty, as a guest order.
    #[serde(default)]
    pub user_id: Option<UserId>,
}

/// Optional body of the decrement endpoint.
#[derive(Deserialize, Default)]
pub struct TotalHint {
    #[serde(default)]
    pub total: Option<Money>,
}

#[derive(Deserialize)]
pub struct DiscountRequest {
    pub discount: Money,
}

// -- Helpers --

/// Loads an order the caller owns, or any order for admins.
async fn owned_order<S: Store + Clone + 'static>(
    state: &AppState<S>,
    auth: &AuthUser,
    raw_id: &str,
) -> Result<OrderDetail, ApiError> {
    let id: OrderId = parse_id(raw_id, "order")?;
    let detail = state.orders.get_order(id).await?;
    auth.require_self_or_admin(detail.order.user_id)?;
    Ok(detail)
}

fn parse_item(raw: &str) -> Result<OrderItemId, ApiError> {
    parse_id(raw, "order item")
}

fn log_total_hint(hint: Option<Money>, detail: &OrderDetail) {
    if let Some(hint) = hint
        && hint != detail.order.total
    {
        tracing::debug!(
            order_id = %detail.order.id,
            client_total = %hint,
            total = %detail.order.total,
            "client total differs from recomputed total"
        );
    }
}

// -- Handlers --

/// GET /api/v1/orders: admins see every order, others their own.
#[tracing::instrument(skip(state))]
pub async fn list<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    auth: AuthUser,
) -> ApiResult<Vec<Order>> {
    let owner = (!auth.is_admin()).then_some(auth.user_id);
    ok(state.orders.list_orders(owner).await?)
}

/// POST /api/v1/orders: validates stock, decrements it and records the order.
#[tracing::instrument(skip(state, payload))]
pub async fn create<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    auth: AuthUser,
    payload: Result<Json<PlaceOrderRequest>, JsonRejection>,
) -> Created<OrderDetail> {
    let Json(req) = payload?;

    let owner = if auth.is_admin() {
        req.user_id
    } else {
        match req.user_id {
            Some(id) if id != auth.user_id => return Err(ApiError::forbidden()),
            _ => Some(auth.user_id),
        }
    };

    let mut request = PlaceOrder::new(owner, req.lines);
    if let Some(comments) = req.comments {
        request = request.with_comments(comments);
    }
    if let Some(total) = req.total {
        request = request.with_client_total(total);
    }

    created(state.orders.place_order(request).await?)
}

/// GET /api/v1/orders/:id
#[tracing::instrument(skip(state))]
pub async fn show<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<OrderDetail> {
    ok(owned_order(&state, &auth, &id).await?)
}

/// PATCH /api/v1/orders/:id: state, comments, payment link (admin only).
#[tracing::instrument(skip(state, payload))]
pub async fn update<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    auth: AuthUser,
    Path(id): Path<String>,
    payload: Result<Json<OrderPatch>, JsonRejection>,
) -> ApiResult<OrderDetail> {
    auth.require_admin()?;
    let id: OrderId = parse_id(&id, "order")?;
    let Json(patch) = payload?;
    ok(state.orders.update_order(id, patch).await?)
}

/// DELETE /api/v1/orders/:id: deletes the order and restores its stock.
#[tracing::instrument(skip(state))]
pub async fn cancel<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<OrderDetail> {
    let detail = owned_order(&state, &auth, &id).await?;
    let cancelled = state.orders.cancel_order(detail.order.id).await?;
    Ok(Json(Envelope::new(cancelled).with_message("Order cancelled")))
}

/// DELETE /api/v1/orders/:id/items/:item_id
#[tracing::instrument(skip(state))]
pub async fn remove_item<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    auth: AuthUser,
    Path((id, item_id)): Path<(String, String)>,
) -> ApiResult<OrderDetail> {
    let detail = owned_order(&state, &auth, &id).await?;
    let item_id = parse_item(&item_id)?;
    ok(state.orders.remove_item(detail.order.id, item_id).await?)
}

/// POST /api/v1/orders/:id/items/:item_id/decrement: returns one unit to stock.
///
/// Accepts an optional `{"total": cents}` body; it is only compared with the
/// recomputed total.
#[tracing::instrument(skip(state, body))]
pub async fn remove_one_unit<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    auth: AuthUser,
    Path((id, item_id)): Path<(String, String)>,
    body: Bytes,
) -> ApiResult<OrderDetail> {
    let hint: TotalHint = if body.is_empty() {
        TotalHint::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::BadRequest(format!("Invalid JSON body: {e}")))?
    };

    let detail = owned_order(&state, &auth, &id).await?;
    let item_id = parse_item(&item_id)?;
    let updated = state.orders.remove_one_unit(detail.order.id, item_id).await?;
    log_total_hint(hint.total, &updated);
    ok(updated)
}

/// PUT /api/v1/orders/:id/discount (admin only)
#[tracing::instrument(skip(state, payload))]
pub async fn discount<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    auth: AuthUser,
    Path(id): Path<String>,
    payload: Result<Json<DiscountRequest>, JsonRejection>,
) -> ApiResult<OrderDetail> {
    auth.require_admin()?;
    let id: OrderId = parse_id(&id, "order")?;
    let Json(req) = payload?;
    ok(state.orders.apply_discount(id, req.discount).await?)
}
