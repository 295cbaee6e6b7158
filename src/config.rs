//! Configuration for the backup engine.
//!
//! The CLI loads an `EngineConfig` from a TOML file; library callers build
//! `BackupOptions` directly. Remote settings are validated up front so a run
//! fails fast with a descriptive error instead of guessing defaults.

use crate::utils::errors::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Buckets backed up when the caller does not name any.
/// The temp bucket is deliberately absent: transient data is never backed up.
pub const DEFAULT_BUCKETS: &[&str] = &["avatars", "transaction-attachments", "system-files"];

/// Remote WebDAV store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Master switch; a disabled remote is a configuration error at run time.
    #[serde(default)]
    pub enabled: bool,

    pub url: String,

    pub username: String,

    pub password: String,

    /// Base path on the server under which `objects/` and `snapshots/` live.
    #[serde(default = "default_base_path")]
    pub base_path: String,

    /// Weekday on which a full backup runs (0 = Sunday .. 6 = Saturday).
    #[serde(default = "default_full_backup_weekday")]
    pub full_backup_weekday: u8,

    /// Snapshots older than this many days are deleted after a run.
    /// Zero disables retention cleanup and garbage collection.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

impl RemoteConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.enabled {
            return Err(EngineError::Config("remote backup is not enabled".into()));
        }
        if self.url.is_empty() {
            return Err(EngineError::Config("remote url is empty".into()));
        }
        if self.username.is_empty() {
            return Err(EngineError::Config("remote username is empty".into()));
        }
        if self.full_backup_weekday > 6 {
            return Err(EngineError::Config(format!(
                "full_backup_weekday must be 0-6, got {}",
                self.full_backup_weekday
            )));
        }
        Ok(())
    }
}

/// Options for a single backup run.
#[derive(Debug, Clone)]
pub struct BackupOptions {
    /// Buckets to back up; `None` means [`DEFAULT_BUCKETS`].
    pub buckets: Option<Vec<String>>,

    /// Skip files larger than `max_file_size` entirely. Skipped files are
    /// counted but absent from the manifest — this is an explicit coverage
    /// policy, not an oversight.
    pub skip_large_files: bool,

    /// Size threshold for `skip_large_files`, in bytes.
    pub max_file_size: u64,

    /// Run a full backup regardless of the weekday schedule.
    pub force_full_backup: bool,

    /// Disable the ETag-reuse optimization and re-download + re-hash every
    /// object. Use when the source store's ETags are not a reliable
    /// content-identity proxy (e.g. multipart uploads).
    pub always_rehash: bool,

    pub remote: RemoteConfig,
}

impl BackupOptions {
    pub fn new(remote: RemoteConfig) -> Self {
        Self {
            buckets: None,
            skip_large_files: false,
            max_file_size: default_max_file_size(),
            force_full_backup: false,
            always_rehash: false,
            remote,
        }
    }

    /// Resolve the effective bucket list.
    pub fn resolved_buckets(&self) -> Vec<String> {
        match &self.buckets {
            Some(buckets) => buckets.clone(),
            None => DEFAULT_BUCKETS.iter().map(|b| b.to_string()).collect(),
        }
    }
}

/// File-level configuration for the CLI binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub remote: RemoteConfig,

    #[serde(default)]
    pub backup: BackupFileConfig,

    #[serde(default)]
    pub source: SourceConfig,

    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupFileConfig {
    #[serde(default)]
    pub buckets: Option<Vec<String>>,

    #[serde(default)]
    pub skip_large_files: bool,

    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,

    #[serde(default)]
    pub always_rehash: bool,
}

impl Default for BackupFileConfig {
    fn default() -> Self {
        Self {
            buckets: None,
            skip_large_files: false,
            max_file_size: default_max_file_size(),
            always_rehash: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Root directory whose immediate subdirectories are served as buckets.
    pub root: PathBuf,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// Default values
fn default_base_path() -> String {
    "/".to_string()
}

fn default_full_backup_weekday() -> u8 {
    0 // Sunday
}

fn default_retention_days() -> u32 {
    7
}

fn default_max_file_size() -> u64 {
    100 * 1024 * 1024 // 100 MiB
}

fn default_log_level() -> String {
    "info".to_string()
}

impl EngineConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &PathBuf) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: EngineConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Build per-run options from the file-level settings.
    pub fn backup_options(&self) -> BackupOptions {
        BackupOptions {
            buckets: self.backup.buckets.clone(),
            skip_large_files: self.backup.skip_large_files,
            max_file_size: self.backup.max_file_size,
            force_full_backup: false,
            always_rehash: self.backup.always_rehash,
            remote: self.remote.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote() -> RemoteConfig {
        RemoteConfig {
            enabled: true,
            url: "https://dav.example.com".to_string(),
            username: "backup".to_string(),
            password: "secret".to_string(),
            base_path: "/backups".to_string(),
            full_backup_weekday: 0,
            retention_days: 7,
        }
    }

    #[test]
    fn test_validate_ok() {
        assert!(remote().validate().is_ok());
    }

    #[test]
    fn test_validate_disabled() {
        let mut cfg = remote();
        cfg.enabled = false;
        assert!(matches!(cfg.validate(), Err(EngineError::Config(_))));
    }

    #[test]
    fn test_validate_bad_weekday() {
        let mut cfg = remote();
        cfg.full_backup_weekday = 7;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_default_buckets_exclude_temp() {
        let opts = BackupOptions::new(remote());
        let buckets = opts.resolved_buckets();
        assert_eq!(
            buckets,
            vec!["avatars", "transaction-attachments", "system-files"]
        );
        assert!(!buckets.iter().any(|b| b.contains("temp")));
    }

    #[test]
    fn test_config_file_defaults() {
        let toml_str = r#"
            [remote]
            enabled = true
            url = "https://dav.example.com"
            username = "backup"
            password = "secret"
        "#;
        let config: EngineConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.remote.base_path, "/");
        assert_eq!(config.remote.full_backup_weekday, 0);
        assert_eq!(config.remote.retention_days, 7);
        assert_eq!(config.backup.max_file_size, 100 * 1024 * 1024);
        assert!(!config.backup.skip_large_files);
        assert_eq!(config.log.level, "info");
    }
}
