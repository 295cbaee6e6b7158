//! Error types for the backup engine.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// Remote store unreachable or credentials rejected at connect time.
    /// Fatal to the whole run.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Remote target already exists and overwrite was not requested.
    /// The object pool treats this as a successful dedup no-op.
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Unexpected remote response (non-2xx status, malformed multistatus).
    #[error("Remote store error: {0}")]
    Remote(String),

    #[error("Source store error: {0}")]
    Source(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EngineError {
    /// True for the not-found family of failures, which cleanup and GC
    /// treat as "already gone".
    pub fn is_not_found(&self) -> bool {
        matches!(self, EngineError::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
