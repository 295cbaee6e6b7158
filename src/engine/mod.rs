//! Backup orchestrator.
//!
//! Drives one backup run end to end: picks full vs incremental, walks the
//! source buckets, consults the previous manifest for change detection,
//! hashes and pools new content, writes the snapshot, then triggers
//! retention cleanup and garbage collection.
//!
//! The engine assumes the external scheduler enforces at most one concurrent
//! run; no internal locking is taken. Within a run, objects are processed
//! sequentially — one file fully resolved before the next — and temp paths
//! are derived per file from bucket and key.

pub mod cleanup;
pub mod progress;

use crate::config::BackupOptions;
use crate::engine::cleanup::{run_cleanup, CleanupReport};
use crate::engine::progress::BackupProgress;
use crate::hash::hash_file;
use crate::pool::ObjectPool;
use crate::remote::webdav::WebDavStore;
use crate::remote::RemoteStore;
use crate::snapshot::{BackupType, ManifestEntry, Snapshot, SnapshotStore};
use crate::source::{ObjectSource, SourceObjectRef};
use crate::utils::errors::Result;
use chrono::{DateTime, Datelike, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Outcome of one backup run. Always returned, even on fatal failure —
/// operators monitor the counters rather than treating nonzero
/// `failed_files` as fatal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupResult {
    pub success: bool,
    pub buckets: Vec<String>,
    pub progress: BackupProgress,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cleanup: Option<CleanupReport>,
}

/// How an object left the per-file pipeline.
enum ObjectOutcome {
    /// New content was uploaded into the pool.
    Uploaded,
    /// Content was already pooled (dedup hit).
    Deduplicated,
}

/// Full-backup schedule decision: forced, or today is the configured
/// full-backup weekday.
pub fn should_run_full(force_full_backup: bool, full_backup_weekday: u8, today: Weekday) -> bool {
    force_full_backup || today.num_days_from_sunday() == full_backup_weekday as u32
}

/// Unique snapshot directory name, e.g. `full_2026-08-27_03-00-00-123Z`.
/// ISO-derived with `:` and `.` flattened so it is filesystem-safe.
pub fn backup_dir_name(backup_type: BackupType, now: DateTime<Utc>) -> String {
    format!(
        "{}_{}",
        backup_type.prefix(),
        now.format("%Y-%m-%d_%H-%M-%S-%3fZ")
    )
}

fn short_hash(hash: &str) -> &str {
    &hash[..hash.len().min(8)]
}

pub struct BackupEngine {
    source: Arc<dyn ObjectSource>,
    snapshots: SnapshotStore,
    pool: ObjectPool,
    temp_dir: PathBuf,
}

impl BackupEngine {
    /// Build an engine for one run. Constructed explicitly per run — there
    /// is no shared global client state.
    pub fn new(
        remote: Arc<dyn RemoteStore>,
        source: Arc<dyn ObjectSource>,
        temp_dir: PathBuf,
    ) -> Self {
        Self {
            source,
            snapshots: SnapshotStore::new(remote.clone(), temp_dir.clone()),
            pool: ObjectPool::new(remote),
            temp_dir,
        }
    }

    /// Execute one backup run. Never returns an error: fatal failures are
    /// captured in the result with whatever progress was accumulated.
    pub async fn run(&self, options: &BackupOptions) -> BackupResult {
        let start = Instant::now();
        let buckets = options.resolved_buckets();
        let mut progress = BackupProgress::default();

        match self.run_inner(options, &buckets, &mut progress).await {
            Ok(cleanup) => BackupResult {
                success: true,
                buckets,
                progress,
                duration_ms: start.elapsed().as_millis() as u64,
                error: None,
                cleanup,
            },
            Err(e) => {
                error!(error = %e, "Backup run failed");
                BackupResult {
                    success: false,
                    buckets,
                    progress,
                    duration_ms: start.elapsed().as_millis() as u64,
                    error: Some(e.to_string()),
                    cleanup: None,
                }
            }
        }
    }

    async fn run_inner(
        &self,
        options: &BackupOptions,
        buckets: &[String],
        progress: &mut BackupProgress,
    ) -> Result<Option<CleanupReport>> {
        options.remote.validate()?;

        let now = Utc::now();
        let backup_type = if should_run_full(
            options.force_full_backup,
            options.remote.full_backup_weekday,
            now.weekday(),
        ) {
            BackupType::Full
        } else {
            BackupType::Incremental
        };
        let dir_name = backup_dir_name(backup_type, now);

        info!(
            backup = %dir_name,
            backup_type = backup_type.prefix(),
            buckets = ?buckets,
            "Starting backup run"
        );

        tokio::fs::create_dir_all(&self.temp_dir).await?;

        // Previous manifest powers the ETag-reuse optimization; skipping it
        // forces every object through download + hash.
        let last_manifest = if options.always_rehash {
            info!("always_rehash set, ignoring previous manifest");
            None
        } else {
            self.snapshots.load_latest().await
        };
        if last_manifest.is_none() {
            info!("No usable previous manifest, every object will be hashed");
        }

        let mut files: BTreeMap<String, ManifestEntry> = BTreeMap::new();
        for bucket in buckets {
            self.backup_bucket(bucket, options, last_manifest.as_ref(), &mut files, progress)
                .await?;
        }

        let snapshot = Snapshot {
            backup_type,
            backup_time: now,
            backup_dir_name: dir_name,
            progress: progress.clone(),
            files,
        };
        self.snapshots.save(&snapshot).await?;

        let cleanup = if options.remote.retention_days > 0 {
            match run_cleanup(
                &self.snapshots,
                &self.pool,
                options.remote.retention_days,
                Utc::now(),
            )
            .await
            {
                Ok(report) => Some(report),
                Err(e) => {
                    // Cleanup is best-effort; its failure never fails the run.
                    warn!(error = %e, "Retention cleanup failed");
                    None
                }
            }
        } else {
            None
        };

        info!(
            total = progress.total_files,
            processed = progress.processed_files,
            skipped = progress.skipped_files,
            failed = progress.failed_files,
            "Backup run complete"
        );

        Ok(cleanup)
    }

    /// Back up one bucket. A listing failure is fatal to the run; per-object
    /// failures are counted and the loop continues.
    async fn backup_bucket(
        &self,
        bucket: &str,
        options: &BackupOptions,
        last_manifest: Option<&Snapshot>,
        files: &mut BTreeMap<String, ManifestEntry>,
        progress: &mut BackupProgress,
    ) -> Result<()> {
        let objects = self.source.list_objects(bucket).await?;
        info!(bucket = %bucket, objects = objects.len(), "Backing up bucket");

        for obj in objects {
            progress.total_files += 1;
            progress.total_size += obj.size;

            if options.skip_large_files && obj.size > options.max_file_size {
                // Policy: large files are entirely absent from the manifest.
                info!(key = %obj.logical_key(), size = obj.size, "Skipping large file");
                progress.skipped_files += 1;
                continue;
            }

            match self.process_object(&obj, last_manifest, files).await {
                Ok(ObjectOutcome::Uploaded) => {
                    progress.processed_files += 1;
                    progress.processed_size += obj.size;
                }
                Ok(ObjectOutcome::Deduplicated) => {
                    progress.skipped_files += 1;
                    progress.processed_size += obj.size;
                }
                Err(e) => {
                    error!(key = %obj.logical_key(), error = %e, "Failed to back up object");
                    progress.failed_files += 1;
                }
            }
        }

        Ok(())
    }

    /// Resolve one object: reuse or compute its hash, pool the content if
    /// new, and record the manifest entry. The temp file, if one was
    /// created, is removed on success and failure alike.
    async fn process_object(
        &self,
        obj: &SourceObjectRef,
        last_manifest: Option<&Snapshot>,
        files: &mut BTreeMap<String, ManifestEntry>,
    ) -> Result<ObjectOutcome> {
        let temp_path = self.temp_dir.join(&obj.bucket).join(&obj.key);

        let result = self.transfer_object(obj, last_manifest, &temp_path).await;

        if temp_path.exists() {
            if let Err(e) = tokio::fs::remove_file(&temp_path).await {
                warn!(path = %temp_path.display(), error = %e, "Failed to remove temp file");
            }
        }

        let (hash, outcome) = result?;
        files.insert(
            obj.logical_key(),
            ManifestEntry {
                hash,
                size: obj.size,
                etag: obj.etag.clone(),
                last_modified: obj.last_modified,
            },
        );
        Ok(outcome)
    }

    async fn transfer_object(
        &self,
        obj: &SourceObjectRef,
        last_manifest: Option<&Snapshot>,
        temp_path: &std::path::Path,
    ) -> Result<(String, ObjectOutcome)> {
        let logical_key = obj.logical_key();
        let mut downloaded = false;

        // Change detection: an unchanged ETag with a recorded hash lets us
        // skip both the download and the hash computation.
        let reused = last_manifest
            .and_then(|s| s.files.get(&logical_key))
            .filter(|entry| entry.etag == obj.etag && !entry.hash.is_empty());

        let hash = match reused {
            Some(entry) => {
                debug!(key = %logical_key, hash = short_hash(&entry.hash), "ETag unchanged, reusing hash");
                entry.hash.clone()
            }
            None => {
                self.source
                    .fetch_object(&obj.bucket, &obj.key, temp_path)
                    .await?;
                downloaded = true;
                hash_file(temp_path).await?
            }
        };

        if self.pool.has(&hash).await? {
            debug!(key = %logical_key, hash = short_hash(&hash), "Content already pooled");
            return Ok((hash, ObjectOutcome::Deduplicated));
        }

        // Reuse path never downloaded the bytes; the pool needs them now.
        if !downloaded {
            self.source
                .fetch_object(&obj.bucket, &obj.key, temp_path)
                .await?;
        }
        self.pool.put(&hash, temp_path).await?;

        info!(key = %logical_key, hash = short_hash(&hash), "Stored new object");
        Ok((hash, ObjectOutcome::Uploaded))
    }
}

/// Top-level entry point for schedulers: connect the remote store from the
/// options and run one backup.
pub async fn run_backup(source: Arc<dyn ObjectSource>, options: BackupOptions) -> BackupResult {
    let start = Instant::now();

    let remote = match WebDavStore::connect(&options.remote).await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!(error = %e, "Failed to connect to remote store");
            return BackupResult {
                success: false,
                buckets: options.resolved_buckets(),
                progress: BackupProgress::default(),
                duration_ms: start.elapsed().as_millis() as u64,
                error: Some(e.to_string()),
                cleanup: None,
            };
        }
    };

    let temp_dir = std::env::temp_dir().join("backup-engine");
    let engine = BackupEngine::new(remote, source, temp_dir);
    engine.run(&options).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_should_run_full() {
        // Forced wins regardless of weekday.
        assert!(should_run_full(true, 0, Weekday::Wed));
        // Sunday with default config.
        assert!(should_run_full(false, 0, Weekday::Sun));
        assert!(!should_run_full(false, 0, Weekday::Mon));
        // Custom weekday (3 = Wednesday).
        assert!(should_run_full(false, 3, Weekday::Wed));
        assert!(!should_run_full(false, 3, Weekday::Sun));
    }

    #[test]
    fn test_backup_dir_name_format() {
        let now = Utc.with_ymd_and_hms(2026, 8, 27, 3, 15, 42).unwrap();
        let name = backup_dir_name(BackupType::Full, now);
        assert_eq!(name, "full_2026-08-27_03-15-42-000Z");

        let name = backup_dir_name(BackupType::Incremental, now);
        assert!(name.starts_with("incr_"));
        assert!(!name.contains(':'));
        assert!(!name.contains('.'));
    }

    #[test]
    fn test_short_hash() {
        assert_eq!(short_hash("deadbeefcafe"), "deadbeef");
        assert_eq!(short_hash("abc"), "abc");
    }
}
