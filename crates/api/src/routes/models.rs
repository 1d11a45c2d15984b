//! Model (colorway) endpoints.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use common::{ModelId, ProductId};
use serde::Deserialize;
use store::{Model, ModelPatch, ModelWithStock, NewModel, PriceTiers, Store};

use super::{ApiResult, Created, Envelope, created, ok, parse_id};
use crate::AppState;
use crate::auth::AuthUser;

pub fn router<S: Store + Clone + 'static>() -> Router<Arc<AppState<S>>> {
    Router::new()
        .route("/", get(list::<S>).post(create::<S>))
        .route(
            "/{id}",
            get(show::<S>)
                .put(update::<S>)
                .patch(update::<S>)
                .delete(remove::<S>),
        )
}

#[derive(Deserialize)]
pub struct CreateModelRequest {
    pub product_id: ProductId,
    pub name: String,
    pub color: String,
    #[serde(default)]
    pub description: Option<String>,
    pub prices: PriceTiers,
    #[serde(default)]
    pub on_promotion: bool,
}

impl From<CreateModelRequest> for NewModel {
    fn from(req: CreateModelRequest) -> Self {
        NewModel {
            product_id: req.product_id,
            name: req.name,
            color: req.color,
            description: req.description,
            prices: req.prices,
            on_promotion: req.on_promotion,
        }
    }
}

/// GET /api/v1/models: every model with its stock rows and total units.
#[tracing::instrument(skip(state))]
pub async fn list<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> ApiResult<Vec<ModelWithStock>> {
    ok(state.catalog.list_models().await?)
}

/// POST /api/v1/models
#[tracing::instrument(skip(state, payload))]
pub async fn create<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    auth: AuthUser,
    payload: Result<Json<CreateModelRequest>, JsonRejection>,
) -> Created<Model> {
    auth.require_admin()?;
    let Json(req) = payload?;
    created(state.catalog.create_model(req.into()).await?)
}

/// GET /api/v1/models/:id
#[tracing::instrument(skip(state))]
pub async fn show<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> ApiResult<Model> {
    let id: ModelId = parse_id(&id, "model")?;
    ok(state.catalog.get_model(id).await?)
}

/// PUT|PATCH /api/v1/models/:id
#[tracing::instrument(skip(state, payload))]
pub async fn update<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    auth: AuthUser,
    Path(id): Path<String>,
    payload: Result<Json<ModelPatch>, JsonRejection>,
) -> ApiResult<Model> {
    auth.require_admin()?;
    let id: ModelId = parse_id(&id, "model")?;
    let Json(patch) = payload?;
    ok(state.catalog.update_model(id, patch).await?)
}

/// DELETE /api/v1/models/:id
#[tracing::instrument(skip(state))]
pub async fn remove<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<ModelId> {
    auth.require_admin()?;
    let id: ModelId = parse_id(&id, "model")?;
    state.catalog.delete_model(id).await?;
    Ok(Json(Envelope::new(id).with_message("Model deleted")))
}
