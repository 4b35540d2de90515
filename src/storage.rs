//! Object storage boundary.
//!
//! The pipeline talks to storage through [`StorageBackend`]: one `put` per
//! upload and a pure mapping from stored path to public URL. Storage offers
//! no progress channel; the [`upload`](crate::upload) stage synthesizes one.
//!
//! Aborting an upload drops the in-flight `put` future. Implementations must
//! therefore do their I/O inside the future (not on a detached task) so that
//! dropping it actually stops the transfer.
//!
//! [`LocalDirStorage`] writes objects below a root directory and serves them
//! from a configured base URL. It backs the CLI.

use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Rejected: {message}")]
    Rejected { message: String, retryable: bool },
}

/// Where an object ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub stored_path: String,
}

#[async_trait]
pub trait StorageBackend: Send + Sync {
    async fn put(
        &self,
        key: &str,
        body: Arc<[u8]>,
        content_type: &str,
    ) -> Result<StoredObject, StorageError>;

    fn public_url_for(&self, stored_path: &str) -> String;
}

/// Stores objects as files below `root`.
#[derive(Debug, Clone)]
pub struct LocalDirStorage {
    root: PathBuf,
    public_base_url: String,
}

impl LocalDirStorage {
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Reject keys that would escape the root.
    fn resolve_key(&self, key: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(key);
        let safe = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !safe {
            return Err(StorageError::Rejected {
                message: format!("invalid object key {key:?}"),
                retryable: false,
            });
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl StorageBackend for LocalDirStorage {
    async fn put(
        &self,
        key: &str,
        body: Arc<[u8]>,
        content_type: &str,
    ) -> Result<StoredObject, StorageError> {
        let path = self.resolve_key(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &body[..]).await?;
        tracing::debug!(key, content_type, bytes = body.len(), "stored object");
        Ok(StoredObject {
            stored_path: key.to_string(),
        })
    }

    fn public_url_for(&self, stored_path: &str) -> String {
        format!("{}/{}", self.public_base_url, stored_path)
    }
}
