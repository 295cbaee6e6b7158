//! Remote file store abstraction.
//!
//! The engine talks to the remote server through the [`RemoteStore`] trait;
//! [`webdav::WebDavStore`] is the production implementation and
//! [`memory::MemoryStore`] backs the test suite. All paths handed to a store
//! are relative to its configured base path.

pub mod memory;
pub mod webdav;

use crate::utils::errors::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::Path;

/// Kind of a remote entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    File,
    Directory,
}

/// Metadata for one remote entry, as returned by [`RemoteStore::list`].
#[derive(Debug, Clone)]
pub struct FileStat {
    /// Final path segment (for pool objects this is the content hash).
    pub basename: String,
    pub lastmod: DateTime<Utc>,
    pub size: u64,
    pub kind: FileKind,
}

impl FileStat {
    pub fn is_file(&self) -> bool {
        self.kind == FileKind::File
    }
}

/// Blocking-style async operations against the remote store.
///
/// Semantics the engine depends on:
/// - `exists` maps a not-found response to `false`, never an error;
/// - `upload` with `overwrite = false` fails with `AlreadyExists` when the
///   target is present, and creates intermediate directories bottom-up;
/// - `download` fails with `NotFound` for an absent remote path and creates
///   local parent directories;
/// - `delete` is NOT idempotent: deleting an absent target is `NotFound`.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn exists(&self, remote_path: &str) -> Result<bool>;

    async fn upload(&self, remote_path: &str, local_path: &Path, overwrite: bool) -> Result<()>;

    async fn download(&self, remote_path: &str, local_path: &Path) -> Result<()>;

    async fn list(&self, remote_path: &str, deep: bool) -> Result<Vec<FileStat>>;

    async fn delete(&self, remote_path: &str) -> Result<()>;
}

/// Join two remote path fragments with exactly one `/` between them.
pub(crate) fn join_remote(base: &str, rest: &str) -> String {
    let base = base.trim_end_matches('/');
    let rest = rest.trim_start_matches('/');
    if base.is_empty() {
        format!("/{rest}")
    } else {
        format!("{base}/{rest}")
    }
}

/// Parent of a remote path, or `None` at the root.
pub(crate) fn parent_remote(path: &str) -> Option<&str> {
    let trimmed = path.trim_end_matches('/');
    let idx = trimmed.rfind('/')?;
    if idx == 0 {
        None
    } else {
        Some(&trimmed[..idx])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_remote() {
        assert_eq!(join_remote("/base", "objects/abc"), "/base/objects/abc");
        assert_eq!(join_remote("/base/", "/objects"), "/base/objects");
        assert_eq!(join_remote("", "snapshots"), "/snapshots");
        assert_eq!(join_remote("/", "snapshots"), "/snapshots");
    }

    #[test]
    fn test_parent_remote() {
        assert_eq!(parent_remote("/a/b/c"), Some("/a/b"));
        assert_eq!(parent_remote("/a"), None);
        assert_eq!(parent_remote("/a/b/"), Some("/a"));
        assert_eq!(parent_remote("a"), None);
    }
}
