//! Content-addressed incremental backup engine.
//!
//! Backs up object-storage buckets to a remote WebDAV server, deduplicating
//! identical content across files and across runs: each distinct blob is
//! stored once at `objects/<sha256>`, and every run writes a snapshot
//! manifest under `snapshots/` recording which logical files map to which
//! hashes. Retention cleanup deletes expired snapshots and a mark-and-sweep
//! pass reclaims objects no surviving snapshot references.

pub mod config;
pub mod engine;
pub mod hash;
pub mod pool;
pub mod remote;
pub mod snapshot;
pub mod source;
pub mod utils;

// Re-export commonly used types
pub use config::{BackupOptions, EngineConfig, RemoteConfig};
pub use engine::cleanup::CleanupReport;
pub use engine::progress::BackupProgress;
pub use engine::{run_backup, BackupEngine, BackupResult};
pub use snapshot::{BackupType, ManifestEntry, Snapshot};
pub use source::{ObjectSource, SourceObjectRef};
pub use utils::errors::EngineError;
pub type Result<T> = std::result::Result<T, EngineError>;
