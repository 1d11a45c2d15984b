//! Image storage: uploads model photos and returns their public URL.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::Mutex;

/// Errors that can occur when uploading an image.
#[derive(Debug, Error)]
pub enum ImageStorageError {
    /// The HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The storage provider answered with an error status.
    #[error("Upload rejected ({status}): {body}")]
    Rejected { status: u16, body: String },

    /// The upload is not an image.
    #[error("Unsupported content type: {0}")]
    UnsupportedType(String),

    /// The upload has no bytes.
    #[error("Empty upload: {0}")]
    Empty(String),
}

/// A file received from a client.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl ImageUpload {
    /// Rejects empty files and non-image content types.
    pub fn validate(&self) -> Result<(), ImageStorageError> {
        if self.bytes.is_empty() {
            return Err(ImageStorageError::Empty(self.file_name.clone()));
        }
        match &self.content_type {
            Some(ct) if !ct.starts_with("image/") => {
                Err(ImageStorageError::UnsupportedType(ct.clone()))
            }
            _ => Ok(()),
        }
    }
}

/// Stores image files and hands back their public URLs.
#[async_trait]
pub trait ImageStorage: Send + Sync {
    async fn upload(&self, upload: ImageUpload) -> Result<String, ImageStorageError>;
}

/// Cloudinary account settings for unsigned uploads.
#[derive(Debug, Clone)]
pub struct CloudinarySettings {
    pub cloud_name: String,
    pub upload_preset: String,
    pub folder: Option<String>,
}

#[derive(Deserialize)]
struct UploadResponse {
    secure_url: String,
}

/// Uploads to Cloudinary with an unsigned upload preset.
#[derive(Clone)]
pub struct CloudinaryStorage {
    client: reqwest::Client,
    settings: CloudinarySettings,
}

impl CloudinaryStorage {
    pub fn new(settings: CloudinarySettings) -> Self {
        Self {
            client: reqwest::Client::new(),
            settings,
        }
    }

    fn upload_url(&self) -> String {
        format!(
            "https://api.cloudinary.com/v1_1/{}/image/upload",
            self.settings.cloud_name
        )
    }
}

#[async_trait]
impl ImageStorage for CloudinaryStorage {
    #[tracing::instrument(skip(self, upload), fields(file_name = %upload.file_name, bytes = upload.bytes.len()))]
    async fn upload(&self, upload: ImageUpload) -> Result<String, ImageStorageError> {
        upload.validate()?;

        let mut part = reqwest::multipart::Part::bytes(upload.bytes).file_name(upload.file_name);
        if let Some(content_type) = &upload.content_type {
            part = part.mime_str(content_type)?;
        }

        let mut form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("upload_preset", self.settings.upload_preset.clone());
        if let Some(folder) = &self.settings.folder {
            form = form.text("folder", folder.clone());
        }

        let resp = self
            .client
            .post(self.upload_url())
            .multipart(form)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            tracing::warn!(status, "image upload rejected");
            return Err(ImageStorageError::Rejected { status, body });
        }

        let uploaded: UploadResponse = resp.json().await?;
        Ok(uploaded.secure_url)
    }
}

#[derive(Debug, Default)]
struct InMemoryImageState {
    uploads: Vec<ImageUpload>,
    fail: bool,
}

/// In-memory image storage for testing and local runs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryImageStorage {
    state: Arc<Mutex<InMemoryImageState>>,
}

impl InMemoryImageStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following upload fail.
    pub async fn set_fail(&self, fail: bool) {
        self.state.lock().await.fail = fail;
    }

    /// Returns the number of files uploaded.
    pub async fn upload_count(&self) -> usize {
        self.state.lock().await.uploads.len()
    }
}

#[async_trait]
impl ImageStorage for InMemoryImageStorage {
    async fn upload(&self, upload: ImageUpload) -> Result<String, ImageStorageError> {
        upload.validate()?;
        let mut state = self.state.lock().await;
        if state.fail {
            return Err(ImageStorageError::Rejected {
                status: 503,
                body: "storage unavailable".to_string(),
            });
        }
        let url = format!(
            "memory://images/{}/{}",
            state.uploads.len() + 1,
            upload.file_name
        );
        state.uploads.push(upload);
        Ok(url)
    }
}
