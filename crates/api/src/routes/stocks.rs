//! Stock rows: one per model and size.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use common::{ModelId, StockId};
use serde::{Deserialize, Serialize};
use store::{NewStock, Stock, Store};

use super::{ApiResult, Created, Envelope, created, ok, parse_id};
use crate::AppState;
use crate::auth::AuthUser;

pub fn router<S: Store + Clone + 'static>() -> Router<Arc<AppState<S>>> {
    Router::new()
        .route("/", get(list::<S>).post(create::<S>))
        .route("/total", get(total::<S>))
        .route(
            "/{id}",
            get(show::<S>)
                .put(adjust::<S>)
                .patch(adjust::<S>)
                .delete(remove::<S>),
        )
}

#[derive(Deserialize)]
pub struct CreateStockRequest {
    pub model_id: ModelId,
    pub size: i32,
    pub quantity: i32,
}

/// Signed change applied to a stock row.
#[derive(Deserialize)]
pub struct AdjustStockRequest {
    pub quantity: i32,
}

#[derive(Serialize)]
pub struct StockTotal {
    pub total: i64,
}

/// GET /api/v1/stocks
#[tracing::instrument(skip(state))]
pub async fn list<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> ApiResult<Vec<Stock>> {
    ok(state.catalog.list_stocks().await?)
}

/// GET /api/v1/stocks/total: units across every stock row.
#[tracing::instrument(skip(state))]
pub async fn total<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> ApiResult<StockTotal> {
    ok(StockTotal {
        total: state.reports.stock_total().await?,
    })
}

/// POST /api/v1/stocks
#[tracing::instrument(skip(state, payload))]
pub async fn create<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    auth: AuthUser,
    payload: Result<Json<CreateStockRequest>, JsonRejection>,
) -> Created<Stock> {
    auth.require_admin()?;
    let Json(req) = payload?;
    created(
        state
            .catalog
            .create_stock(NewStock {
                model_id: req.model_id,
                size: req.size,
                quantity: req.quantity,
            })
            .await?,
    )
}

/// GET /api/v1/stocks/:id
#[tracing::instrument(skip(state))]
pub async fn show<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> ApiResult<Stock> {
    let id: StockId = parse_id(&id, "stock")?;
    ok(state.catalog.get_stock(id).await?)
}

/// PUT|PATCH /api/v1/stocks/:id: adds `quantity` (may be negative) to the row.
#[tracing::instrument(skip(state, payload))]
pub async fn adjust<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    auth: AuthUser,
    Path(id): Path<String>,
    payload: Result<Json<AdjustStockRequest>, JsonRejection>,
) -> ApiResult<Stock> {
    auth.require_admin()?;
    let id: StockId = parse_id(&id, "stock")?;
    let Json(req) = payload?;
    ok(state.catalog.adjust_stock(id, req.quantity).await?)
}

/// DELETE /api/v1/stocks/:id
#[tracing::instrument(skip(state))]
pub async fn remove<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<StockId> {
    auth.require_admin()?;
    let id: StockId = parse_id(&id, "stock")?;
    state.catalog.delete_stock(id).await?;
    Ok(Json(Envelope::new(id).with_message("Stock deleted")))
}
