//! Per-run backup counters.

use serde::{Deserialize, Serialize};

/// Counters accumulated during one run. Owned exclusively by the
/// orchestrator while the run is in flight, then embedded read-only into the
/// final snapshot and the returned result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupProgress {
    pub total_files: u64,
    pub processed_files: u64,
    pub skipped_files: u64,
    pub failed_files: u64,
    pub total_size: u64,
    pub processed_size: u64,
}
