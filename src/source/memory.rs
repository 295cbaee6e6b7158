//! Scripted in-memory [`ObjectSource`] for tests.

use crate::source::{ObjectSource, SourceObjectRef};
use crate::utils::errors::{EngineError, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
struct MemoryObject {
    data: Vec<u8>,
    etag: String,
}

#[derive(Debug, Default)]
struct Inner {
    buckets: BTreeMap<String, BTreeMap<String, MemoryObject>>,
    /// `<bucket>/<key>` pairs whose fetch fails (per-file failure injection).
    failing: BTreeSet<String>,
}

#[derive(Debug, Default)]
pub struct MemoryObjectSource {
    inner: Mutex<Inner>,
}

impl MemoryObjectSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put_object(&self, bucket: &str, key: &str, data: &[u8], etag: &str) {
        let mut inner = self.inner.lock().await;
        inner.buckets.entry(bucket.to_string()).or_default().insert(
            key.to_string(),
            MemoryObject {
                data: data.to_vec(),
                etag: etag.to_string(),
            },
        );
    }

    pub async fn remove_object(&self, bucket: &str, key: &str) {
        let mut inner = self.inner.lock().await;
        if let Some(objects) = inner.buckets.get_mut(bucket) {
            objects.remove(key);
        }
    }

    /// Make fetches of `<bucket>/<key>` fail until cleared.
    pub async fn fail_fetch(&self, bucket: &str, key: &str) {
        let mut inner = self.inner.lock().await;
        inner.failing.insert(format!("{bucket}/{key}"));
    }
}

#[async_trait]
impl ObjectSource for MemoryObjectSource {
    async fn list_objects(&self, bucket: &str) -> Result<Vec<SourceObjectRef>> {
        let inner = self.inner.lock().await;
        let objects = inner.buckets.get(bucket).cloned().unwrap_or_default();
        Ok(objects
            .into_iter()
            .map(|(key, obj)| SourceObjectRef {
                bucket: bucket.to_string(),
                key,
                size: obj.data.len() as u64,
                etag: obj.etag,
                last_modified: Utc::now(),
            })
            .collect())
    }

    async fn fetch_object(&self, bucket: &str, key: &str, dest: &Path) -> Result<()> {
        let data = {
            let inner = self.inner.lock().await;
            if inner.failing.contains(&format!("{bucket}/{key}")) {
                return Err(EngineError::Source(format!(
                    "injected fetch failure: {bucket}/{key}"
                )));
            }
            inner
                .buckets
                .get(bucket)
                .and_then(|objects| objects.get(key))
                .map(|o| o.data.clone())
                .ok_or_else(|| EngineError::NotFound(format!("{bucket}/{key}")))?
        };

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(dest, data).await?;
        Ok(())
    }
}
