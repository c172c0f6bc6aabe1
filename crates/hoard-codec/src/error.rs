//! Error types for the codec crate.

use thiserror::Error;

/// Errors raised while decoding or decrypting a payload.
#[derive(Debug, Error)]
pub enum Error {
    /// Decoded length differs from the length recorded in the table.
    #[error("decoded size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    /// Input ended before the stream was complete.
    #[error("compressed stream truncated after {consumed} bytes")]
    Truncated { consumed: usize },

    /// Stream content is not valid for the codec.
    #[error("corrupt {codec} stream: {message}")]
    Corrupt {
        codec: &'static str,
        message: String,
    },

    /// Underlying decoder error.
    #[error("{codec} decoder error: {source}")]
    Decoder {
        codec: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// Key has a length the cipher cannot use.
    #[error("invalid key length {0}")]
    InvalidKeyLength(usize),

    /// Decryption error.
    #[error("decryption error: {0}")]
    Decryption(&'static str),
}

/// Result type for codec operations.
pub type Result<T> = std::result::Result<T, Error>;
