use std::path::PathBuf;

use serde::Serialize;
use tokio::fs;
use tracing::{debug, info};
use uuid::Uuid;

use commune_shared::types::MediaType;

use crate::error::ServerError;

const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// Result of an upload: where clients fetch it and what kind it is.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StoredMedia {
    pub id: Uuid,
    pub url: String,
    pub media_type: MediaType,
}

/// Uploaded media on the local filesystem, one file per upload plus a
/// `<id>.type` sidecar holding the original content type.
#[derive(Debug, Clone)]
pub struct MediaStore {
    base_path: PathBuf,
    public_base_url: String,
    max_size: usize,
}

impl MediaStore {
    pub async fn new(
        base_path: PathBuf,
        public_base_url: String,
        max_size: usize,
    ) -> Result<Self, ServerError> {
        fs::create_dir_all(&base_path).await.map_err(|e| {
            ServerError::MediaStorage(format!(
                "Failed to create media directory '{}': {}",
                base_path.display(),
                e
            ))
        })?;

        info!(path = %base_path.display(), "Media store initialized");

        Ok(Self {
            base_path,
            public_base_url,
            max_size,
        })
    }

    pub async fn store(&self, data: &[u8], content_type: &str) -> Result<StoredMedia, ServerError> {
        if data.is_empty() {
            return Err(ServerError::bad_request("File is required"));
        }
        if data.len() > self.max_size {
            return Err(ServerError::MediaTooLarge {
                size: data.len(),
                max: self.max_size,
            });
        }

        let id = Uuid::new_v4();
        let content_type = match content_type.trim() {
            "" => FALLBACK_CONTENT_TYPE,
            ct => ct,
        };

        fs::write(self.data_path(id), data)
            .await
            .map_err(|e| ServerError::MediaStorage(format!("Failed to write media {}: {}", id, e)))?;
        fs::write(self.type_path(id), content_type)
            .await
            .map_err(|e| ServerError::MediaStorage(format!("Failed to write media {}: {}", id, e)))?;

        debug!(id = %id, size = data.len(), content_type, "Stored media");
        Ok(StoredMedia {
            id,
            url: self.url_for(id),
            media_type: MediaType::from_content_type(content_type),
        })
    }

    /// Bytes and content type of a stored upload.
    pub async fn get(&self, id: Uuid) -> Result<(Vec<u8>, String), ServerError> {
        let path = self.data_path(id);
        if !path.exists() {
            return Err(ServerError::NotFound);
        }

        let data = fs::read(&path)
            .await
            .map_err(|e| ServerError::MediaStorage(format!("Failed to read media {}: {}", id, e)))?;
        let content_type = fs::read_to_string(self.type_path(id))
            .await
            .unwrap_or_else(|_| FALLBACK_CONTENT_TYPE.to_string());

        Ok((data, content_type))
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), ServerError> {
        let path = self.data_path(id);
        if !path.exists() {
            return Err(ServerError::NotFound);
        }

        fs::remove_file(&path).await.map_err(|e| {
            ServerError::MediaStorage(format!("Failed to delete media {}: {}", id, e))
        })?;
        let _ = fs::remove_file(self.type_path(id)).await;

        debug!(id = %id, "Deleted media");
        Ok(())
    }

    /// Recover the upload id from a URL this store handed out.
    pub fn id_from_url(&self, url: &str) -> Option<Uuid> {
        url.strip_prefix(&self.public_base_url)?
            .strip_prefix("/media/")
            .and_then(|raw| Uuid::parse_str(raw).ok())
    }

    fn url_for(&self, id: Uuid) -> String {
        format!("{}/media/{}", self.public_base_url, id)
    }

    fn data_path(&self, id: Uuid) -> PathBuf {
        self.base_path.join(id.to_string())
    }

    fn type_path(&self, id: Uuid) -> PathBuf {
        self.base_path.join(format!("{id}.type"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn test_store() -> (MediaStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = MediaStore::new(
            dir.path().to_path_buf(),
            "http://localhost:4002".to_string(),
            1024,
        )
        .await
        .unwrap();
        (store, dir)
    }

    #[tokio::test]
    async fn test_store_and_get() {
        let (store, _dir) = test_store().await;

        let stored = store.store(b"\x89PNG...", "image/png").await.unwrap();
        assert_eq!(stored.media_type, MediaType::Image);
        assert_eq!(stored.url, format!("http://localhost:4002/media/{}", stored.id));

        let (data, content_type) = store.get(stored.id).await.unwrap();
        assert_eq!(data, b"\x89PNG...");
        assert_eq!(content_type, "image/png");
    }

    #[tokio::test]
    async fn test_video_classification() {
        let (store, _dir) = test_store().await;
        let stored = store.store(b"mp4", "video/mp4").await.unwrap();
        assert_eq!(stored.media_type, MediaType::Video);
    }

    #[tokio::test]
    async fn test_delete() {
        let (store, _dir) = test_store().await;
        let stored = store.store(b"delete-me", "").await.unwrap();

        store.delete(stored.id).await.unwrap();
        assert!(matches!(store.get(stored.id).await, Err(ServerError::NotFound)));
    }

    #[tokio::test]
    async fn test_limits() {
        let (store, _dir) = test_store().await;
        assert!(store.store(b"", "image/png").await.is_err());
        assert!(matches!(
            store.store(&[0u8; 2048], "image/png").await,
            Err(ServerError::MediaTooLarge { size: 2048, max: 1024 })
        ));
    }

    #[tokio::test]
    async fn test_id_from_url() {
        let (store, _dir) = test_store().await;
        let stored = store.store(b"x", "image/jpeg").await.unwrap();
        assert_eq!(store.id_from_url(&stored.url), Some(stored.id));
        assert_eq!(store.id_from_url("https://elsewhere/media/abc"), None);
    }
}
