//! Snapshot manifests and their remote store.
//!
//! A snapshot is the point-in-time record of one backup run: every logical
//! file's content hash, size, source ETag and modification time. Snapshots
//! live at `snapshots/<full|incr>_<timestamp>.json`, are immutable once
//! written, and are only ever deleted whole by retention cleanup. The JSON
//! field names are camelCase — the remote layout is shared across runs and
//! must stay bit-compatible.

use crate::engine::progress::BackupProgress;
use crate::remote::{FileStat, RemoteStore};
use crate::utils::errors::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

pub const SNAPSHOTS_PREFIX: &str = "snapshots";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupType {
    Full,
    Incremental,
}

impl BackupType {
    /// Snapshot file-name prefix.
    pub fn prefix(&self) -> &'static str {
        match self {
            BackupType::Full => "full",
            BackupType::Incremental => "incr",
        }
    }
}

/// One record inside a snapshot, keyed by `<bucket>/<key>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry {
    pub hash: String,
    pub size: u64,
    pub etag: String,
    pub last_modified: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub backup_type: BackupType,
    pub backup_time: DateTime<Utc>,
    pub backup_dir_name: String,
    pub progress: BackupProgress,
    pub files: BTreeMap<String, ManifestEntry>,
}

impl Snapshot {
    pub fn file_name(&self) -> String {
        format!("{}.json", self.backup_dir_name)
    }

    /// All content hashes this snapshot references.
    pub fn referenced_hashes(&self) -> HashSet<String> {
        self.files.values().map(|e| e.hash.clone()).collect()
    }
}

/// Whether a remote basename is a snapshot file of ours.
pub fn is_snapshot_file(basename: &str) -> bool {
    (basename.starts_with("full_") || basename.starts_with("incr_")) && basename.ends_with(".json")
}

fn snapshot_path(basename: &str) -> String {
    format!("{SNAPSHOTS_PREFIX}/{basename}")
}

pub struct SnapshotStore {
    remote: Arc<dyn RemoteStore>,
    temp_dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(remote: Arc<dyn RemoteStore>, temp_dir: PathBuf) -> Self {
        Self { remote, temp_dir }
    }

    /// Snapshot files under `snapshots/`, newest first by remote
    /// modification time. A missing directory is the first-run case and
    /// yields an empty list.
    pub async fn list_snapshots(&self) -> Result<Vec<FileStat>> {
        let mut stats = match self.remote.list(SNAPSHOTS_PREFIX, false).await {
            Ok(stats) => stats,
            Err(e) if e.is_not_found() => {
                info!("Snapshot directory does not exist yet");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };

        stats.retain(|s| s.is_file() && is_snapshot_file(&s.basename));
        stats.sort_by(|a, b| b.lastmod.cmp(&a.lastmod));
        Ok(stats)
    }

    /// Download and parse one snapshot by basename.
    pub async fn load(&self, basename: &str) -> Result<Snapshot> {
        let local = self.temp_dir.join(basename);
        self.remote.download(&snapshot_path(basename), &local).await?;

        let parsed = (|| -> Result<Snapshot> {
            let content = std::fs::read_to_string(&local)?;
            Ok(serde_json::from_str(&content)?)
        })();

        if let Err(e) = std::fs::remove_file(&local) {
            warn!(path = %local.display(), error = %e, "Failed to remove temp snapshot copy");
        }

        parsed
    }

    /// Load the most recent snapshot, or `None` when there is none yet.
    ///
    /// Any failure — listing, download, malformed JSON — also degrades to
    /// `None`: the run proceeds as if no previous manifest existed and
    /// re-checks every file against the pool.
    pub async fn load_latest(&self) -> Option<Snapshot> {
        let snapshots = match self.list_snapshots().await {
            Ok(snapshots) => snapshots,
            Err(e) => {
                warn!(error = %e, "Failed to list snapshots, treating as none");
                return None;
            }
        };

        let latest = snapshots.first()?;
        match self.load(&latest.basename).await {
            Ok(snapshot) => {
                info!(
                    snapshot = %latest.basename,
                    files = snapshot.files.len(),
                    "Loaded previous snapshot"
                );
                Some(snapshot)
            }
            Err(e) => {
                warn!(
                    snapshot = %latest.basename,
                    error = %e,
                    "Failed to load latest snapshot, treating as none"
                );
                None
            }
        }
    }

    /// Serialize and upload a snapshot. The name embeds a fresh timestamp so
    /// collisions should not happen, but overwrite is permitted defensively.
    pub async fn save(&self, snapshot: &Snapshot) -> Result<()> {
        let basename = snapshot.file_name();
        let local = self.temp_dir.join(&basename);

        std::fs::create_dir_all(&self.temp_dir)?;
        std::fs::write(&local, serde_json::to_vec_pretty(snapshot)?)?;

        let result = self
            .remote
            .upload(&snapshot_path(&basename), &local, true)
            .await;

        if let Err(e) = std::fs::remove_file(&local) {
            warn!(path = %local.display(), error = %e, "Failed to remove temp snapshot copy");
        }

        result?;
        info!(snapshot = %basename, files = snapshot.files.len(), "Snapshot uploaded");
        Ok(())
    }

    /// Remove one snapshot file from the remote store.
    pub async fn delete(&self, basename: &str) -> Result<()> {
        self.remote.delete(&snapshot_path(basename)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> Snapshot {
        let mut files = BTreeMap::new();
        files.insert(
            "avatars/u1.jpg".to_string(),
            ManifestEntry {
                hash: "deadbeef".to_string(),
                size: 10240,
                etag: "a1".to_string(),
                last_modified: Utc.with_ymd_and_hms(2026, 8, 1, 12, 0, 0).unwrap(),
            },
        );
        Snapshot {
            backup_type: BackupType::Full,
            backup_time: Utc.with_ymd_and_hms(2026, 8, 2, 3, 0, 0).unwrap(),
            backup_dir_name: "full_2026-08-02_03-00-00-000Z".to_string(),
            progress: BackupProgress::default(),
            files,
        }
    }

    #[test]
    fn test_json_field_names_are_camel_case() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["backupType"], "full");
        assert!(json["backupDirName"].is_string());
        assert!(json["progress"]["totalFiles"].is_number());
        assert!(json["progress"]["processedSize"].is_number());
        let entry = &json["files"]["avatars/u1.jpg"];
        assert_eq!(entry["hash"], "deadbeef");
        assert_eq!(entry["etag"], "a1");
        assert!(entry["lastModified"].is_string());
    }

    #[test]
    fn test_round_trip_preserves_files() {
        let snapshot = sample();
        let json = serde_json::to_string(&snapshot).unwrap();
        let back: Snapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back.files, snapshot.files);
        assert_eq!(back.backup_type, snapshot.backup_type);
    }

    #[test]
    fn test_is_snapshot_file() {
        assert!(is_snapshot_file("full_2026-08-02_03-00-00-000Z.json"));
        assert!(is_snapshot_file("incr_2026-08-03_03-00-00-000Z.json"));
        assert!(!is_snapshot_file("full_2026.txt"));
        assert!(!is_snapshot_file("notes.json"));
        assert!(!is_snapshot_file(".backup-manifest.json"));
    }

    #[test]
    fn test_referenced_hashes() {
        let mut snapshot = sample();
        snapshot.files.insert(
            "avatars/u2.jpg".to_string(),
            ManifestEntry {
                hash: "deadbeef".to_string(),
                size: 1,
                etag: "b".to_string(),
                last_modified: Utc::now(),
            },
        );
        // Two entries, one distinct hash.
        assert_eq!(snapshot.referenced_hashes().len(), 1);
    }
}
