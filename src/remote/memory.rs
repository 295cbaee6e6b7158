//! In-memory [`RemoteStore`] used by the test suite.
//!
//! Mirrors the WebDAV store's semantics exactly — `AlreadyExists` on
//! non-overwriting uploads, `NotFound` on deletes of absent targets, parent
//! directories created implicitly — and exposes a handful of inspection
//! helpers plus an injectable modification time for retention tests.

use crate::remote::{FileKind, FileStat, RemoteStore};
use crate::utils::errors::{EngineError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
struct FileEntry {
    data: Vec<u8>,
    lastmod: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Inner {
    files: BTreeMap<String, FileEntry>,
    dirs: BTreeSet<String>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

fn norm(path: &str) -> String {
    path.trim_matches('/').to_string()
}

fn ancestors(path: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut acc = String::new();
    for seg in path.split('/').filter(|s| !s.is_empty()) {
        if !acc.is_empty() {
            acc.push('/');
        }
        acc.push_str(seg);
        out.push(acc.clone());
    }
    out
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a file directly, bypassing upload semantics.
    pub async fn insert_file(&self, path: &str, data: &[u8], lastmod: DateTime<Utc>) {
        let path = norm(path);
        let mut inner = self.inner.lock().await;
        if let Some(parent) = path.rsplit_once('/').map(|(p, _)| p.to_string()) {
            for dir in ancestors(&parent) {
                inner.dirs.insert(dir);
            }
        }
        inner.files.insert(
            path,
            FileEntry {
                data: data.to_vec(),
                lastmod,
            },
        );
    }

    /// Override a file's modification time (drives retention expiry in tests).
    pub async fn set_modified(&self, path: &str, lastmod: DateTime<Utc>) -> bool {
        let mut inner = self.inner.lock().await;
        match inner.files.get_mut(&norm(path)) {
            Some(entry) => {
                entry.lastmod = lastmod;
                true
            }
            None => false,
        }
    }

    pub async fn contains(&self, path: &str) -> bool {
        self.inner.lock().await.files.contains_key(&norm(path))
    }

    pub async fn read(&self, path: &str) -> Option<Vec<u8>> {
        self.inner
            .lock()
            .await
            .files
            .get(&norm(path))
            .map(|e| e.data.clone())
    }

    /// Number of files stored under a prefix.
    pub async fn file_count(&self, prefix: &str) -> usize {
        let prefix = format!("{}/", norm(prefix));
        self.inner
            .lock()
            .await
            .files
            .keys()
            .filter(|k| k.starts_with(&prefix))
            .count()
    }

    pub async fn file_names(&self, prefix: &str) -> Vec<String> {
        let prefix = format!("{}/", norm(prefix));
        self.inner
            .lock()
            .await
            .files
            .keys()
            .filter(|k| k.starts_with(&prefix))
            .map(|k| k[prefix.len()..].to_string())
            .collect()
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn exists(&self, remote_path: &str) -> Result<bool> {
        let path = norm(remote_path);
        let inner = self.inner.lock().await;
        Ok(inner.files.contains_key(&path) || inner.dirs.contains(&path))
    }

    async fn upload(&self, remote_path: &str, local_path: &Path, overwrite: bool) -> Result<()> {
        let data = tokio::fs::read(local_path).await?;
        let path = norm(remote_path);
        let mut inner = self.inner.lock().await;

        if !overwrite && inner.files.contains_key(&path) {
            return Err(EngineError::AlreadyExists(path));
        }

        if let Some(parent) = path.rsplit_once('/').map(|(p, _)| p.to_string()) {
            for dir in ancestors(&parent) {
                inner.dirs.insert(dir);
            }
        }

        inner.files.insert(
            path,
            FileEntry {
                data,
                lastmod: Utc::now(),
            },
        );
        Ok(())
    }

    async fn download(&self, remote_path: &str, local_path: &Path) -> Result<()> {
        let path = norm(remote_path);
        let data = {
            let inner = self.inner.lock().await;
            inner
                .files
                .get(&path)
                .map(|e| e.data.clone())
                .ok_or(EngineError::NotFound(path))?
        };

        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(local_path, data).await?;
        Ok(())
    }

    async fn list(&self, remote_path: &str, deep: bool) -> Result<Vec<FileStat>> {
        let path = norm(remote_path);
        let inner = self.inner.lock().await;

        if !path.is_empty() && !inner.dirs.contains(&path) {
            return Err(EngineError::NotFound(path));
        }

        let prefix = if path.is_empty() {
            String::new()
        } else {
            format!("{path}/")
        };

        let direct_child = |key: &str| -> bool { !key[prefix.len()..].contains('/') };

        let mut stats = Vec::new();
        for (key, entry) in inner.files.iter() {
            if !key.starts_with(&prefix) {
                continue;
            }
            if !deep && !direct_child(key) {
                continue;
            }
            stats.push(FileStat {
                basename: key.rsplit('/').next().unwrap_or(key).to_string(),
                lastmod: entry.lastmod,
                size: entry.data.len() as u64,
                kind: FileKind::File,
            });
        }
        for dir in inner.dirs.iter() {
            if dir == &path || !dir.starts_with(&prefix) {
                continue;
            }
            if !deep && !direct_child(dir) {
                continue;
            }
            stats.push(FileStat {
                basename: dir.rsplit('/').next().unwrap_or(dir).to_string(),
                lastmod: Utc::now(),
                size: 0,
                kind: FileKind::Directory,
            });
        }
        Ok(stats)
    }

    async fn delete(&self, remote_path: &str) -> Result<()> {
        let path = norm(remote_path);
        let mut inner = self.inner.lock().await;

        if inner.files.remove(&path).is_some() {
            return Ok(());
        }
        if inner.dirs.remove(&path) {
            let prefix = format!("{path}/");
            inner.files.retain(|k, _| !k.starts_with(&prefix));
            inner.dirs.retain(|d| !d.starts_with(&prefix));
            return Ok(());
        }
        Err(EngineError::NotFound(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn local_file(dir: &TempDir, name: &str, data: &[u8]) -> std::path::PathBuf {
        let path = dir.path().join(name);
        tokio::fs::write(&path, data).await.unwrap();
        path
    }

    #[tokio::test]
    async fn test_upload_no_overwrite_conflicts() {
        let dir = TempDir::new().unwrap();
        let store = MemoryStore::new();
        let local = local_file(&dir, "a", b"one").await;

        store.upload("objects/x", &local, false).await.unwrap();
        let err = store.upload("objects/x", &local, false).await.unwrap_err();
        assert!(matches!(err, EngineError::AlreadyExists(_)));

        // Overwrite succeeds.
        store.upload("objects/x", &local, true).await.unwrap();
    }

    #[tokio::test]
    async fn test_exists_and_implicit_dirs() {
        let dir = TempDir::new().unwrap();
        let store = MemoryStore::new();
        let local = local_file(&dir, "a", b"one").await;

        assert!(!store.exists("objects").await.unwrap());
        store.upload("objects/deep/x", &local, false).await.unwrap();
        assert!(store.exists("objects").await.unwrap());
        assert!(store.exists("objects/deep").await.unwrap());
        assert!(store.exists("objects/deep/x").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_absent_is_not_found() {
        let store = MemoryStore::new();
        let err = store.delete("objects/missing").await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_list_shallow_and_missing_dir() {
        let dir = TempDir::new().unwrap();
        let store = MemoryStore::new();
        let local = local_file(&dir, "a", b"data").await;

        let err = store.list("snapshots", false).await.unwrap_err();
        assert!(err.is_not_found());

        store.upload("snapshots/one.json", &local, false).await.unwrap();
        store
            .upload("snapshots/nested/two.json", &local, false)
            .await
            .unwrap();

        let shallow = store.list("snapshots", false).await.unwrap();
        let files: Vec<_> = shallow.iter().filter(|s| s.is_file()).collect();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].basename, "one.json");

        let deep = store.list("snapshots", true).await.unwrap();
        assert_eq!(deep.iter().filter(|s| s.is_file()).count(), 2);
    }

    #[tokio::test]
    async fn test_download_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = MemoryStore::new();
        let local = local_file(&dir, "src", b"payload").await;

        store.upload("objects/h", &local, false).await.unwrap();

        let dest = dir.path().join("nested/dest");
        store.download("objects/h", &dest).await.unwrap();
        assert_eq!(tokio::fs::read(&dest).await.unwrap(), b"payload");

        let err = store
            .download("objects/missing", &dest)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
