//! Object storage for event images.

use std::path::PathBuf;

use async_trait::async_trait;
use axum::body::Bytes;
use thiserror::Error;
use uuid::Uuid;

pub const ACCEPTED_IMAGE_TYPES: [&str; 4] = ["image/jpeg", "image/jpg", "image/png", "image/webp"];

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("unsupported image type '{0}'")]
    UnsupportedType(String),

    #[error("image is {size} bytes, limit is {limit}")]
    TooLarge { size: usize, limit: usize },

    #[error("failed to write image: {0}")]
    Io(#[from] std::io::Error),
}

/// An image received from a client, not yet stored.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub file_name: Option<String>,
    pub content_type: String,
    pub bytes: Bytes,
}

impl ImageUpload {
    pub fn check(&self, max_bytes: usize) -> Result<(), UploadError> {
        if !ACCEPTED_IMAGE_TYPES.contains(&self.content_type.as_str()) {
            return Err(UploadError::UnsupportedType(self.content_type.clone()));
        }
        if self.bytes.len() > max_bytes {
            return Err(UploadError::TooLarge {
                size: self.bytes.len(),
                limit: max_bytes,
            });
        }
        Ok(())
    }

    /// File extension for the stored object, taken from the client file name
    /// when it has one and derived from the content type otherwise.
    pub fn extension(&self) -> String {
        let from_name = self
            .file_name
            .as_deref()
            .and_then(|name| name.rsplit_once('.'))
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()));

        from_name.unwrap_or_else(|| {
            match self.content_type.as_str() {
                "image/png" => "png",
                "image/webp" => "webp",
                _ => "jpg",
            }
            .to_string()
        })
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ImageStorage: Send + Sync {
    /// Store the image under a fresh unique path and return its public URL.
    async fn upload(&self, image: ImageUpload) -> Result<String, UploadError>;
}

/// Stores images in a local directory that the HTTP server exposes under
/// `public_base_url`.
#[derive(Debug, Clone)]
pub struct LocalImageStorage {
    root: PathBuf,
    public_base_url: String,
}

impl LocalImageStorage {
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &PathBuf {
        &self.root
    }
}

#[async_trait]
impl ImageStorage for LocalImageStorage {
    async fn upload(&self, image: ImageUpload) -> Result<String, UploadError> {
        let relative = format!("events/{}.{}", Uuid::new_v4(), image.extension());
        let path = self.root.join(&relative);

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &image.bytes).await?;

        tracing::debug!(path = %path.display(), size = image.bytes.len(), "Stored event image");

        Ok(format!("{}/{}", self.public_base_url, relative))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload(name: Option<&str>, content_type: &str, size: usize) -> ImageUpload {
        ImageUpload {
            file_name: name.map(str::to_string),
            content_type: content_type.to_string(),
            bytes: Bytes::from(vec![0u8; size]),
        }
    }

    #[test]
    fn test_check_rejects_unsupported_type_and_oversize() {
        assert!(upload(None, "image/png", 10).check(100).is_ok());
        assert!(matches!(
            upload(None, "image/gif", 10).check(100),
            Err(UploadError::UnsupportedType(_))
        ));
        assert!(matches!(
            upload(None, "image/png", 101).check(100),
            Err(UploadError::TooLarge { size: 101, limit: 100 })
        ));
    }

    #[test]
    fn test_extension_prefers_file_name() {
        assert_eq!(upload(Some("Party.PNG"), "image/png", 1).extension(), "png");
        assert_eq!(upload(Some("photo"), "image/webp", 1).extension(), "webp");
        assert_eq!(upload(Some("weird.p/g"), "image/jpeg", 1).extension(), "jpg");
    }

    #[tokio::test]
    async fn test_local_storage_writes_under_unique_path() {
        let root = std::env::temp_dir().join(format!("guestlist-uploads-{}", Uuid::new_v4()));
        let storage = LocalImageStorage::new(&root, "http://localhost:3001/uploads/");

        let first = storage
            .upload(upload(Some("a.png"), "image/png", 4))
            .await
            .unwrap();
        let second = storage
            .upload(upload(Some("a.png"), "image/png", 4))
            .await
            .unwrap();

        assert_ne!(first, second);
        assert!(first.starts_with("http://localhost:3001/uploads/events/"));
        assert!(first.ends_with(".png"));

        let relative = first.trim_start_matches("http://localhost:3001/uploads/");
        assert!(root.join(relative).exists());

        tokio::fs::remove_dir_all(&root).await.unwrap();
    }
}
