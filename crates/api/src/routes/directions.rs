//! Saved shipping addresses.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use common::DirectionId;
use domain::DirectionInput;
use store::{Direction, DirectionPatch, Store};

use super::{ApiResult, Created, created, ok, parse_id};
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

/// Loads a direction the caller may touch.
async fn owned<S: Store + Clone + 'static>(
    state: &AppState<S>,
    auth: &AuthUser,
    raw_id: &str,
) -> Result<Direction, crate::error::ApiError> {
    let id: DirectionId = parse_id(raw_id, "direction")?;
    let direction = state.users.get_direction(id).await?;
    auth.require_self_or_admin(Some(direction.user_id))?;
    Ok(direction)
}

/// GET /api/v1/directions: admins see all, others their own.
#[tracing::instrument(skip(state))]
pub async fn list<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    auth: AuthUser,
) -> ApiResult<Vec<Direction>> {
    let owner = (!auth.is_admin()).then_some(auth.user_id);
    ok(state.users.list_directions(owner).await?)
}

/// POST /api/v1/directions
#[tracing::instrument(skip(state, payload))]
pub async fn create<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    auth: AuthUser,
    payload: Result<Json<DirectionInput>, JsonRejection>,
) -> Created<Direction> {
    let Json(input) = payload?;
    created(state.users.create_direction(auth.user_id, input).await?)
}

/// GET /api/v1/directions/:id
#[tracing::instrument(skip(state))]
pub async fn show<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Direction> {
    ok(owned(&state, &auth, &id).await?)
}

/// PUT|PATCH /api/v1/directions/:id
#[tracing::instrument(skip(state, payload))]
pub async fn update<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    auth: AuthUser,
    Path(id): Path<String>,
    payload: Result<Json<DirectionPatch>, JsonRejection>,
) -> ApiResult<Direction> {
    let direction = owned(&state, &auth, &id).await?;
    let Json(patch) = payload?;
    ok(state.users.update_direction(direction.id, patch).await?)
}

/// DELETE /api/v1/directions/:id
#[tracing::instrument(skip(state))]
pub async fn remove<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Direction> {
    let direction = owned(&state, &auth, &id).await?;
    state.users.delete_direction(direction.id).await?;
    ok(direction)
}
