//! Product catalog endpoints. Reads are public, writes are admin only.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use common::ProductId;
use serde::Deserialize;
use store::{NewProduct, Product, ProductDetail, ProductPatch, ProductWithModels, Store};

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
pub struct CreateProductRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// GET /api/v1/products: every product with its models.
#[tracing::instrument(skip(state))]
pub async fn list<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> ApiResult<Vec<ProductWithModels>> {
    ok(state.catalog.list_products().await?)
}

/// POST /api/v1/products
#[tracing::instrument(skip(state, payload))]
pub async fn create<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    auth: AuthUser,
    payload: Result<Json<CreateProductRequest>, JsonRejection>,
) -> Created<Product> {
    auth.require_admin()?;
    let Json(req) = payload?;
    created(
        state
            .catalog
            .create_product(NewProduct {
                name: req.name,
                description: req.description,
            })
            .await?,
    )
}

/// GET /api/v1/products/:id: the product with stock and images per model.
#[tracing::instrument(skip(state))]
pub async fn show<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> ApiResult<ProductDetail> {
    let id: ProductId = parse_id(&id, "product")?;
    ok(state.catalog.get_product(id).await?)
}

/// PUT|PATCH /api/v1/products/:id
#[tracing::instrument(skip(state, payload))]
pub async fn update<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    auth: AuthUser,
    Path(id): Path<String>,
    payload: Result<Json<ProductPatch>, JsonRejection>,
) -> ApiResult<Product> {
    auth.require_admin()?;
    let id: ProductId = parse_id(&id, "product")?;
    let Json(patch) = payload?;
    ok(state.catalog.update_product(id, patch).await?)
}

/// DELETE /api/v1/products/:id: also removes its models.
#[tracing::instrument(skip(state))]
pub async fn remove<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<ProductId> {
    auth.require_admin()?;
    let id: ProductId = parse_id(&id, "product")?;
    state.catalog.delete_product(id).await?;
    Ok(Json(Envelope::new(id).with_message("Product deleted")))
}
