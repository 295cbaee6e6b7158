//! Content-addressed object pool.
//!
//! Not a separate endpoint — a naming convention over the remote store plus
//! existence-check discipline. One remote file per distinct content hash at
//! `objects/<hash>`, written at most once; first writer wins.

use crate::remote::{FileStat, RemoteStore};
use crate::utils::errors::{EngineError, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

pub const OBJECTS_PREFIX: &str = "objects";

/// Remote path for a content hash.
pub fn object_path(hash: &str) -> String {
    format!("{OBJECTS_PREFIX}/{hash}")
}

pub struct ObjectPool {
    remote: Arc<dyn RemoteStore>,
}

impl ObjectPool {
    pub fn new(remote: Arc<dyn RemoteStore>) -> Self {
        Self { remote }
    }

    /// Whether content with this hash is already pooled.
    pub async fn has(&self, hash: &str) -> Result<bool> {
        self.remote.exists(&object_path(hash)).await
    }

    /// Store a local file under its content hash.
    ///
    /// Uploads with `overwrite = false`; a concurrent writer winning the
    /// race surfaces as `AlreadyExists`, which is a successful dedup no-op
    /// here — correctness depends on these writes being idempotent.
    pub async fn put(&self, hash: &str, local_path: &Path) -> Result<()> {
        match self.remote.upload(&object_path(hash), local_path, false).await {
            Ok(()) => Ok(()),
            Err(EngineError::AlreadyExists(_)) => {
                debug!(hash = %hash, "Object already pooled, treating as success");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Remove a pooled object. Used only by the garbage collector.
    pub async fn delete(&self, hash: &str) -> Result<()> {
        self.remote.delete(&object_path(hash)).await
    }

    /// Enumerate pooled objects. A missing `objects/` directory is the
    /// fresh-install case and yields an empty listing.
    pub async fn list(&self) -> Result<Vec<FileStat>> {
        match self.remote.list(OBJECTS_PREFIX, false).await {
            Ok(stats) => Ok(stats.into_iter().filter(|s| s.is_file()).collect()),
            Err(e) if e.is_not_found() => {
                info!("Object pool does not exist yet, nothing pooled");
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::memory::MemoryStore;
    use tempfile::TempDir;

    const HASH: &str = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";

    #[test]
    fn test_object_path() {
        assert_eq!(object_path("abc123"), "objects/abc123");
    }

    #[tokio::test]
    async fn test_put_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let local = dir.path().join("f");
        tokio::fs::write(&local, b"bytes").await.unwrap();

        let remote = Arc::new(MemoryStore::new());
        let pool = ObjectPool::new(remote.clone());

        assert!(!pool.has(HASH).await.unwrap());
        pool.put(HASH, &local).await.unwrap();
        assert!(pool.has(HASH).await.unwrap());

        // Second put of the same hash is a no-op, not an error.
        pool.put(HASH, &local).await.unwrap();
        assert_eq!(remote.file_count(OBJECTS_PREFIX).await, 1);
    }

    #[tokio::test]
    async fn test_list_fresh_install_is_empty() {
        let pool = ObjectPool::new(Arc::new(MemoryStore::new()));
        assert!(pool.list().await.unwrap().is_empty());
    }
}
