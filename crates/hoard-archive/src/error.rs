//! Error types for the archive crate.

use thiserror::Error;

/// Errors that can occur when opening, reading or writing archives.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Binary reading error.
    #[error("{0}")]
    Common(#[from] hoard_common::Error),

    /// Decompression or decryption error.
    #[error("{0}")]
    Codec(#[from] hoard_codec::Error),

    /// The archive table could not be parsed.
    #[error("{archive}: {message}")]
    Format { archive: String, message: String },

    /// Invalid magic number.
    #[error("invalid signature: expected {expected:#010x}, got {actual:#010x}")]
    InvalidSignature { expected: u32, actual: u32 },

    /// Unsupported format version.
    #[error("unsupported version: {0:#x}")]
    UnsupportedVersion(u32),

    /// Unsupported compression selector.
    #[error("unsupported compression method: {0}")]
    UnsupportedCompression(u32),

    /// A table offset points outside the archive.
    #[error("range {offset}+{len} is outside the {size}-byte archive")]
    OutOfBounds { offset: u64, len: u64, size: u64 },

    /// Decoded entry length differs from the table.
    #[error("{path}: expected {expected} bytes, read {actual}")]
    SizeMismatch {
        path: String,
        expected: u64,
        actual: u64,
    },

    /// Path not present in the archive.
    #[error("file not found: {path} in {archive}")]
    FileNotFound { path: String, archive: String },

    /// Entry is not a nested archive.
    #[error("not a nested archive: {0}")]
    NotNested(String),

    /// Cached object has a different type than requested.
    #[error("{path}: object is not a {expected}")]
    ObjectType { path: String, expected: &'static str },

    /// Typed-object factory failure.
    #[error("{path}: {message}")]
    Object { path: String, message: String },

    /// Archive was closed.
    #[error("archive closed: {0}")]
    Closed(String),

    /// No registered format handles the path.
    #[error("no archive format for {path} (engine {engine:?})")]
    UnknownFormat {
        path: String,
        engine: Option<String>,
    },

    /// Game id not present in the configuration.
    #[error("unknown game: {0}")]
    UnknownGame(String),

    /// Format needs key material the game does not configure.
    #[error("{format} requires a key but none is configured{}", game.as_ref().map(|g| format!(" for {g}")).unwrap_or_default())]
    MissingKey {
        format: &'static str,
        game: Option<String>,
    },

    /// URI could not be parsed.
    #[error("invalid archive URI: {0}")]
    InvalidUri(String),

    /// No provider for a URI scheme.
    #[error("unsupported URI scheme: {0}")]
    UnsupportedScheme(String),

    /// Format cannot be written.
    #[error("format {0} does not support writing")]
    WriteUnsupported(&'static str),

    /// Configuration file error.
    #[error("configuration error: {0}")]
    Config(#[from] serde_json::Error),

    /// Wildcard pattern error.
    #[error("invalid pattern: {0}")]
    Pattern(#[from] glob::PatternError),
}

impl Error {
    /// Build a format error for an archive.
    pub fn format(archive: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Format {
            archive: archive.into(),
            message: message.into(),
        }
    }

    /// Check whether the error is a resolution failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::FileNotFound { .. } | Self::NotNested(_))
    }
}

/// Result type for archive operations.
pub type Result<T> = std::result::Result<T, Error>;
