use async_trait::async_trait;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::config;

/// Backend that holds uploaded media bytes
#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Persist bytes and return the storage key
    async fn put(&self, extension: &str, bytes: &[u8]) -> std::io::Result<String>;

    /// Remove a stored object; a missing object is not an error
    async fn delete(&self, key: &str) -> std::io::Result<()>;

    /// Public URL for a storage key
    fn url_for(&self, key: &str) -> String;
}

/// Files on local disk, served back under `/uploads`
#[derive(Debug, Clone)]
pub struct LocalMediaStore {
    root: PathBuf,
    base_url: String,
}

impl LocalMediaStore {
    pub fn new(root: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            base_url: base_url.into(),
        }
    }

    pub fn from_config() -> Self {
        let config = config::config();
        Self::new(&config.storage.upload_dir, config.uploads_base_url())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> std::io::Result<PathBuf> {
        if !is_safe_key(key) {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("invalid storage key '{}'", key),
            ));
        }
        Ok(self.root.join(key))
    }
}

/// Keys are generated here: `<uuid>.<ext>` with no path components
fn is_safe_key(key: &str) -> bool {
    !key.is_empty()
        && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
        && !key.starts_with('.')
        && !key.contains("..")
}

#[async_trait]
impl MediaStore for LocalMediaStore {
    async fn put(&self, extension: &str, bytes: &[u8]) -> std::io::Result<String> {
        let key = format!("{}.{}", Uuid::new_v4().simple(), extension);
        let path = self.path_for(&key)?;
        tokio::fs::create_dir_all(&self.root).await?;
        tokio::fs::write(&path, bytes).await?;
        tracing::debug!("Stored {} bytes at {}", bytes.len(), path.display());
        Ok(key)
    }

    async fn delete(&self, key: &str) -> std::io::Result<()> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn url_for(&self, key: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), key)
    }
}
