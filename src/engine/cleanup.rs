//! Retention cleanup and mark-and-sweep garbage collection.
//!
//! After a run, snapshots older than the retention window are deleted, then
//! the object pool is swept: any object whose hash no surviving snapshot
//! references is removed. Every step is best-effort — individual failures
//! are logged and counted, never escalated — but the aggregate counts are
//! surfaced in the run result so operators can see them.

use crate::pool::ObjectPool;
use crate::snapshot::SnapshotStore;
use crate::utils::errors::Result;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{error, info, warn};

/// Aggregated outcome of one cleanup + GC pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupReport {
    pub expired_snapshots: u64,
    pub deleted_snapshots: u64,
    pub snapshot_delete_failures: u64,
    pub referenced_hashes: u64,
    pub deleted_objects: u64,
    pub object_delete_failures: u64,
    /// True when a surviving snapshot could not be read during the mark
    /// phase; the sweep is skipped for the pass rather than deleting objects
    /// blind to that snapshot's references.
    pub sweep_skipped: bool,
}

/// Delete snapshots older than `retention_days` (by remote modification
/// time) and garbage-collect the object pool against the survivors.
///
/// GC runs even when nothing expired — content can become orphaned through
/// other means. Snapshots that fail to delete are treated as survivors so
/// their references stay protected.
pub async fn run_cleanup(
    snapshots: &SnapshotStore,
    pool: &ObjectPool,
    retention_days: u32,
    now: DateTime<Utc>,
) -> Result<CleanupReport> {
    let mut report = CleanupReport::default();

    let all = snapshots.list_snapshots().await?;
    if all.is_empty() {
        info!("No snapshot files found, nothing to clean up");
        return Ok(report);
    }

    let cutoff = now - Duration::days(retention_days as i64);
    info!(
        retention_days = retention_days,
        cutoff = %cutoff,
        snapshots = all.len(),
        "Running retention cleanup"
    );

    let mut surviving = Vec::new();
    for stat in all {
        if stat.lastmod >= cutoff {
            surviving.push(stat);
            continue;
        }

        report.expired_snapshots += 1;
        match snapshots.delete(&stat.basename).await {
            Ok(()) => {
                info!(snapshot = %stat.basename, "Deleted expired snapshot");
                report.deleted_snapshots += 1;
            }
            Err(e) if e.is_not_found() => {
                info!(snapshot = %stat.basename, "Expired snapshot already gone");
                report.deleted_snapshots += 1;
            }
            Err(e) => {
                error!(snapshot = %stat.basename, error = %e, "Failed to delete expired snapshot");
                report.snapshot_delete_failures += 1;
                // Still present remotely, so its references must survive GC.
                surviving.push(stat);
            }
        }
    }

    garbage_collect(snapshots, pool, &surviving, &mut report).await;
    Ok(report)
}

/// Mark-and-sweep over the object pool.
async fn garbage_collect(
    snapshots: &SnapshotStore,
    pool: &ObjectPool,
    surviving: &[crate::remote::FileStat],
    report: &mut CleanupReport,
) {
    let mut referenced: HashSet<String> = HashSet::new();

    for stat in surviving {
        match snapshots.load(&stat.basename).await {
            Ok(snapshot) => {
                referenced.extend(snapshot.referenced_hashes());
            }
            Err(e) if e.is_not_found() => {
                info!(snapshot = %stat.basename, "Snapshot vanished during mark, skipping");
            }
            Err(e) => {
                // An unreadable surviving snapshot means the mark set is
                // incomplete; sweeping now could delete live objects.
                error!(
                    snapshot = %stat.basename,
                    error = %e,
                    "Failed to read surviving snapshot, skipping sweep this pass"
                );
                report.sweep_skipped = true;
                return;
            }
        }
    }

    report.referenced_hashes = referenced.len() as u64;
    info!(referenced = referenced.len(), "Mark phase complete");

    let objects = match pool.list().await {
        Ok(objects) => objects,
        Err(e) => {
            warn!(error = %e, "Failed to list object pool, skipping sweep");
            report.sweep_skipped = true;
            return;
        }
    };

    for object in objects {
        if referenced.contains(&object.basename) {
            continue;
        }

        match pool.delete(&object.basename).await {
            Ok(()) => {
                info!(hash = %object.basename, "Deleted orphaned object");
                report.deleted_objects += 1;
            }
            Err(e) if e.is_not_found() => {
                info!(hash = %object.basename, "Orphaned object already gone");
            }
            Err(e) => {
                error!(hash = %object.basename, error = %e, "Failed to delete orphaned object");
                report.object_delete_failures += 1;
            }
        }
    }

    info!(
        deleted = report.deleted_objects,
        failures = report.object_delete_failures,
        "Garbage collection complete"
    );
}
