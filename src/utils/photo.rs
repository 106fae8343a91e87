// src/utils/photo.rs

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use axum::body::Bytes;

use crate::{config::MAX_PHOTO_BYTES, error::AppError};

const ALLOWED_EXTENSIONS: [&str; 5] = ["jpeg", "jpg", "png", "gif", "webp"];

/// Public URL prefix of saved photos (served from `<upload_dir>/photos`).
pub const PHOTO_URL_PREFIX: &str = "/uploads/photos";

/// An image file received with a record submission.
#[derive(Debug, Clone)]
pub struct PhotoUpload {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

/// Storage for student photos. Returns an opaque reference per upload.
#[async_trait]
pub trait PhotoStore: Send + Sync {
    async fn save(&self, upload: PhotoUpload) -> Result<String, AppError>;

    /// Best-effort removal of a photo whose submission was rejected.
    async fn discard(&self, url: &str);
}

/// Writes photos to a local directory.
#[derive(Debug, Clone)]
pub struct LocalPhotoStore {
    dir: PathBuf,
}

impl LocalPhotoStore {
    /// `upload_dir` is the directory served under `/uploads`.
    pub fn new(upload_dir: impl AsRef<Path>) -> Self {
        Self {
            dir: upload_dir.as_ref().join("photos"),
        }
    }
}

/// Validates an upload and returns the lowercase file extension to store it under.
fn image_extension(upload: &PhotoUpload) -> Result<String, AppError> {
    if upload.bytes.len() > MAX_PHOTO_BYTES {
        return Err(AppError::BadRequest("Photo must be at most 5MB".to_string()));
    }

    let extension = upload
        .file_name
        .as_deref()
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .filter(|ext| ALLOWED_EXTENSIONS.contains(&ext.as_str()));

    let mime_ok = upload.content_type.as_deref().is_some_and(|mime| {
        let mime = mime.to_ascii_lowercase();
        ALLOWED_EXTENSIONS
            .iter()
            .any(|allowed| mime == format!("image/{}", allowed))
    });

    match extension {
        Some(ext) if mime_ok => Ok(ext),
        _ => Err(AppError::BadRequest("Only image files are allowed".to_string())),
    }
}

#[async_trait]
impl PhotoStore for LocalPhotoStore {
    async fn save(&self, upload: PhotoUpload) -> Result<String, AppError> {
        let extension = image_extension(&upload)?;
        let file_name = format!("photo-{}.{}", uuid::Uuid::new_v4(), extension);

        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            AppError::InternalServerError(format!("Failed to create photo directory: {}", e))
        })?;
        tokio::fs::write(self.dir.join(&file_name), &upload.bytes)
            .await
            .map_err(|e| AppError::InternalServerError(format!("Failed to store photo: {}", e)))?;

        tracing::debug!("Stored photo {} ({} bytes)", file_name, upload.bytes.len());
        Ok(format!("{}/{}", PHOTO_URL_PREFIX, file_name))
    }

    async fn discard(&self, url: &str) {
        let Some(file_name) = url.strip_prefix(PHOTO_URL_PREFIX).map(|rest| rest.trim_start_matches('/')) else {
            return;
        };
        // Only plain file names produced by `save` are ever removed.
        if file_name.is_empty() || file_name.contains(['/', '\\']) || file_name.contains("..") {
            return;
        }

        if let Err(e) = tokio::fs::remove_file(self.dir.join(file_name)).await {
            tracing::warn!("Failed to discard photo {}: {}", url, e);
        }
    }
}
