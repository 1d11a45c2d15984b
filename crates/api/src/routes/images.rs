//! Model photos, uploaded as multipart forms.

use std::sync::Arc;

use axum::extract::multipart::MultipartRejection;
use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::routing::get;
use axum::{Json, Router};
use common::{ImageId, ModelId};
use domain::services::ImageUpload;
use store::{Image, Store};

use super::{ApiResult, Created, Envelope, created, ok, parse_id};
use crate::AppState;
use crate::auth::AuthUser;
use crate::error::ApiError;

/// Largest accepted multipart body.
pub const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

pub fn router<S: Store + Clone + 'static>() -> Router<Arc<AppState<S>>> {
    Router::new()
        .route("/", get(list::<S>).post(upload::<S>))
        .route(
            "/{id}",
            get(show::<S>)
                .put(replace::<S>)
                .patch(replace::<S>)
                .delete(remove::<S>),
        )
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
}

/// Fields read from an image form.
#[derive(Default)]
struct ImageForm {
    model_id: Option<String>,
    files: Vec<ImageUpload>,
}

async fn read_form(mut multipart: Multipart) -> Result<ImageForm, ApiError> {
    let mut form = ImageForm::default();
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("model_id") => form.model_id = Some(field.text().await?),
            Some("file") => {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let content_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await?;
                form.files.push(ImageUpload {
                    file_name,
                    content_type,
                    bytes: bytes.to_vec(),
                });
            }
            other => tracing::debug!(field = ?other, "ignoring multipart field"),
        }
    }
    Ok(form)
}

/// GET /api/v1/images
#[tracing::instrument(skip(state))]
pub async fn list<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> ApiResult<Vec<Image>> {
    ok(state.catalog.list_images().await?)
}

/// POST /api/v1/images: a `model_id` field plus one or more `file` parts.
#[tracing::instrument(skip(state, multipart))]
pub async fn upload<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    auth: AuthUser,
    multipart: Result<Multipart, MultipartRejection>,
) -> Created<Vec<Image>> {
    auth.require_admin()?;
    let form = read_form(multipart?).await?;
    let raw = form
        .model_id
        .ok_or_else(|| ApiError::BadRequest("model_id field is required".to_string()))?;
    let model_id: ModelId = parse_id(raw.trim(), "model")?;
    created(state.catalog.upload_images(model_id, form.files).await?)
}

/// GET /api/v1/images/:id
#[tracing::instrument(skip(state))]
pub async fn show<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> ApiResult<Image> {
    let id: ImageId = parse_id(&id, "image")?;
    ok(state.catalog.get_image(id).await?)
}

/// PUT|PATCH /api/v1/images/:id: swaps the stored file, keeping the row.
#[tracing::instrument(skip(state, multipart))]
pub async fn replace<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    auth: AuthUser,
    Path(id): Path<String>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Image> {
    auth.require_admin()?;
    let id: ImageId = parse_id(&id, "image")?;
    let mut form = read_form(multipart?).await?;
    if form.files.len() != 1 {
        return Err(ApiError::BadRequest(
            "exactly one file part is required".to_string(),
        ));
    }
    let upload = form.files.remove(0);
    ok(state.catalog.replace_image(id, upload).await?)
}

/// DELETE /api/v1/images/:id
#[tracing::instrument(skip(state))]
pub async fn remove<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<ImageId> {
    auth.require_admin()?;
    let id: ImageId = parse_id(&id, "image")?;
    state.catalog.delete_image(id).await?;
    Ok(Json(Envelope::new(id).with_message("Image deleted")))
}
