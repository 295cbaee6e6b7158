//! Local-directory source adapter.
//!
//! Serves each immediate subdirectory of a root as a bucket, with file paths
//! below it as keys. Used by the CLI binary; real deployments plug in their
//! object store behind the same trait.

use crate::source::{ObjectSource, SourceObjectRef};
use crate::utils::errors::{EngineError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use walkdir::WalkDir;

pub struct LocalDirSource {
    root: PathBuf,
}

impl LocalDirSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn bucket_dir(&self, bucket: &str) -> PathBuf {
        self.root.join(bucket)
    }
}

/// Weak etag synthesized from size and mtime. Not content-derived, so a
/// touched-but-identical file re-hashes on the next run — safe, just slower.
fn synthetic_etag(size: u64, mtime_secs: i64) -> String {
    format!("{size}-{mtime_secs}")
}

fn modified_parts(meta: &std::fs::Metadata) -> (i64, DateTime<Utc>) {
    let mtime = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);
    let when = DateTime::from_timestamp(mtime, 0).unwrap_or_else(Utc::now);
    (mtime, when)
}

#[async_trait]
impl ObjectSource for LocalDirSource {
    async fn list_objects(&self, bucket: &str) -> Result<Vec<SourceObjectRef>> {
        let dir = self.bucket_dir(bucket);
        if !dir.is_dir() {
            return Err(EngineError::Source(format!(
                "bucket directory not found: {}",
                dir.display()
            )));
        }

        let bucket = bucket.to_string();
        let objects = tokio::task::spawn_blocking(move || -> Result<Vec<SourceObjectRef>> {
            let mut out = Vec::new();
            for entry in WalkDir::new(&dir).follow_links(false) {
                let entry = entry.map_err(|e| EngineError::Source(e.to_string()))?;
                if !entry.file_type().is_file() {
                    continue;
                }
                let meta = entry.metadata().map_err(|e| EngineError::Source(e.to_string()))?;
                let key = entry
                    .path()
                    .strip_prefix(&dir)
                    .unwrap_or(entry.path())
                    .to_string_lossy()
                    .replace('\\', "/");
                let (mtime, last_modified) = modified_parts(&meta);
                out.push(SourceObjectRef {
                    bucket: bucket.clone(),
                    key,
                    size: meta.len(),
                    etag: synthetic_etag(meta.len(), mtime),
                    last_modified,
                });
            }
            Ok(out)
        })
        .await
        .map_err(|e| EngineError::Source(format!("list task failed: {e}")))??;

        Ok(objects)
    }

    async fn fetch_object(&self, bucket: &str, key: &str, dest: &Path) -> Result<()> {
        let src = self.bucket_dir(bucket).join(key);
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(&src, dest).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_lists_bucket_files() {
        let root = TempDir::new().unwrap();
        let bucket = root.path().join("avatars");
        std::fs::create_dir_all(bucket.join("users")).unwrap();
        std::fs::write(bucket.join("u1.jpg"), b"aaa").unwrap();
        std::fs::write(bucket.join("users/u2.jpg"), b"bbbb").unwrap();

        let source = LocalDirSource::new(root.path());
        let mut objects = source.list_objects("avatars").await.unwrap();
        objects.sort_by(|a, b| a.key.cmp(&b.key));

        assert_eq!(objects.len(), 2);
        assert_eq!(objects[0].key, "u1.jpg");
        assert_eq!(objects[0].size, 3);
        assert_eq!(objects[1].key, "users/u2.jpg");
        assert_eq!(objects[1].logical_key(), "avatars/users/u2.jpg");
    }

    #[tokio::test]
    async fn test_missing_bucket_errors() {
        let root = TempDir::new().unwrap();
        let source = LocalDirSource::new(root.path());
        assert!(source.list_objects("nope").await.is_err());
    }

    #[tokio::test]
    async fn test_fetch_copies_bytes() {
        let root = TempDir::new().unwrap();
        let bucket = root.path().join("files");
        std::fs::create_dir_all(&bucket).unwrap();
        std::fs::write(bucket.join("doc.pdf"), b"content").unwrap();

        let source = LocalDirSource::new(root.path());
        let dest = root.path().join("tmp/files/doc.pdf");
        source.fetch_object("files", "doc.pdf", &dest).await.unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"content");
    }
}
