use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the library. Per-route and per-overlay failures never
/// surface here; they are turned into fallbacks where they happen.
#[derive(Debug, Error)]
pub enum AtlasError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("binary encoding error: {0}")]
    Bincode(#[from] bincode::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("source data missing: {}", .0.display())]
    MissingSource(PathBuf),

    #[error("invalid record at line {line}: {reason}")]
    InvalidRecord { line: usize, reason: String },

    #[error("network fetch failed: {0}")]
    NetworkFetch(String),

    #[error("worker pool error: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}

pub type Result<T> = std::result::Result<T, AtlasError>;
