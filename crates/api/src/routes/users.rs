//! Registration, sign-in and user administration.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use common::UserId;
use domain::Signup;
use serde::Deserialize;
use store::{Store, User, UserPatch};

use super::{ApiResult, Created, Envelope, ok, parse_id};
use crate::AppState;
use crate::auth::AuthUser;
use crate::error::ApiError;

pub fn router<S: Store + Clone + 'static>() -> Router<Arc<AppState<S>>> {
    Router::new()
        .route("/", get(list::<S>))
        .route("/signup", post(signup::<S>))
        .route("/signin", post(signin::<S>))
        .route("/{id}", get(show::<S>).put(update::<S>))
}

#[derive(Deserialize)]
pub struct SigninRequest {
    pub email: String,
    pub password: String,
}

fn with_token<S: Store>(
    state: &AppState<S>,
    user: User,
) -> Result<Envelope<User>, ApiError> {
    let token = state.tokens.issue(&user)?;
    Ok(Envelope::new(user).with_meta(serde_json::json!({ "token": token })))
}

/// POST /api/v1/users/signup: register and receive a token.
#[tracing::instrument(skip(state, payload))]
pub async fn signup<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    payload: Result<Json<Signup>, JsonRejection>,
) -> Created<User> {
    let Json(req) = payload?;
    let user = state.users.signup(req).await?;
    let envelope = with_token(&state, user)?.with_message("User registered");
    Ok((StatusCode::CREATED, Json(envelope)))
}

/// POST /api/v1/users/signin: exchange credentials for a token.
#[tracing::instrument(skip(state, payload))]
pub async fn signin<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    payload: Result<Json<SigninRequest>, JsonRejection>,
) -> ApiResult<User> {
    let Json(req) = payload?;
    let user = state.users.signin(&req.email, &req.password).await?;
    tracing::info!(user_id = %user.id, "user signed in");
    Ok(Json(with_token(&state, user)?))
}

/// GET /api/v1/users: every non-admin user (admin only).
#[tracing::instrument(skip(state))]
pub async fn list<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    auth: AuthUser,
) -> ApiResult<Vec<User>> {
    auth.require_admin()?;
    ok(state.users.list().await?)
}

/// GET /api/v1/users/:id
#[tracing::instrument(skip(state))]
pub async fn show<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<User> {
    let id: UserId = parse_id(&id, "user")?;
    auth.require_self_or_admin(Some(id))?;
    ok(state.users.get(id).await?)
}

/// PUT /api/v1/users/:id: only admins may change a role.
#[tracing::instrument(skip(state, payload))]
pub async fn update<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    auth: AuthUser,
    Path(id): Path<String>,
    payload: Result<Json<UserPatch>, JsonRejection>,
) -> ApiResult<User> {
    let id: UserId = parse_id(&id, "user")?;
    auth.require_self_or_admin(Some(id))?;
    let Json(patch) = payload?;
    if patch.role.is_some() {
        auth.require_admin()?;
    }
    ok(state.users.update(id, patch).await?)
}
