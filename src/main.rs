//! Backup Engine - CLI entry point
//!
//! Runs one backup of a local directory tree of buckets against the
//! configured WebDAV remote. Scheduling (cron, at-most-one-run) is the
//! caller's responsibility.

use anyhow::Result;
use backup_engine::{config::EngineConfig, source::local::LocalDirSource, utils};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: PathBuf,

    /// Bucket to back up (repeatable; overrides config)
    #[arg(short, long = "bucket")]
    buckets: Vec<String>,

    /// Force a full backup regardless of the weekday schedule
    #[arg(long)]
    full: bool,

    /// Source root directory (overrides config)
    #[arg(long)]
    source_root: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = EngineConfig::from_file(&args.config)?;

    let log_level = args.log_level.as_deref().unwrap_or(&config.log.level);
    utils::logger::init(log_level);

    tracing::info!("Starting backup-engine v{}", env!("CARGO_PKG_VERSION"));

    let mut options = config.backup_options();
    if !args.buckets.is_empty() {
        options.buckets = Some(args.buckets.clone());
    }
    options.force_full_backup = args.full;

    let source_root = args.source_root.unwrap_or_else(|| config.source.root.clone());
    let source = Arc::new(LocalDirSource::new(source_root));

    let result = backup_engine::run_backup(source, options).await;

    tracing::info!(
        success = result.success,
        total = result.progress.total_files,
        processed = result.progress.processed_files,
        skipped = result.progress.skipped_files,
        failed = result.progress.failed_files,
        duration_ms = result.duration_ms,
        "Backup finished"
    );

    if let Some(cleanup) = &result.cleanup {
        tracing::info!(
            deleted_snapshots = cleanup.deleted_snapshots,
            deleted_objects = cleanup.deleted_objects,
            sweep_skipped = cleanup.sweep_skipped,
            "Cleanup summary"
        );
    }

    if !result.success {
        anyhow::bail!(
            "backup failed: {}",
            result.error.unwrap_or_else(|| "unknown error".to_string())
        );
    }

    Ok(())
}
