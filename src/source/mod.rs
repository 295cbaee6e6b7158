//! Source object store boundary.
//!
//! The engine consumes the bucket store through [`ObjectSource`]; it never
//! owns the store itself. [`local::LocalDirSource`] adapts a directory tree
//! for the CLI, [`memory::MemoryObjectSource`] scripts buckets for tests.

pub mod local;
pub mod memory;

use crate::utils::errors::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::Path;

/// One object in a source bucket, as reported by the store's list operation.
#[derive(Debug, Clone)]
pub struct SourceObjectRef {
    pub bucket: String,
    pub key: String,
    pub size: u64,
    pub etag: String,
    pub last_modified: DateTime<Utc>,
}

impl SourceObjectRef {
    /// `<bucket>/<key>` — the manifest key for this object.
    pub fn logical_key(&self) -> String {
        format!("{}/{}", self.bucket, self.key)
    }
}

#[async_trait]
pub trait ObjectSource: Send + Sync {
    /// List every object in a bucket.
    async fn list_objects(&self, bucket: &str) -> Result<Vec<SourceObjectRef>>;

    /// Materialize one object's byte stream at `dest`, creating parent
    /// directories as needed.
    async fn fetch_object(&self, bucket: &str, key: &str, dest: &Path) -> Result<()>;
}
