//! Error types for the export and import pipelines.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that abort a whole export or import.
///
/// Per-file problems never surface here; they are collected as
/// [`FileFailure`](crate::FileFailure)s.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Archive error.
    #[error("{0}")]
    Archive(#[from] hoard_archive::Error),

    /// Manifest could not be read or written.
    #[error("manifest {}: {source}", path.display())]
    Manifest {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Entry path has no component that can be written below the
    /// destination.
    #[error("unusable output path: {0}")]
    InvalidPath(String),

    /// Invalid glob filter.
    #[error("invalid glob: {0}")]
    Glob(#[from] glob::PatternError),

    /// Invalid regex filter.
    #[error("invalid regex: {0}")]
    Regex(#[from] regex::Error),

    /// Worker pool could not be created.
    #[error("worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;
