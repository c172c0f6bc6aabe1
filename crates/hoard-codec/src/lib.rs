//! Codec utilities for Hoard archive formats.
//!
//! Pure byte-buffer transforms consumed by format readers:
//!
//! - [`inflate`] - zlib, raw DEFLATE and Zstandard
//! - [`lzss`] - ring-buffer LZSS with per-format parameters
//! - [`blast`] - PKWare DCL "implode" decompression
//! - [`cipher`] - rolling XOR and AES-CBC
//!
//! Every decompressor returns exactly the expected number of bytes when the
//! size is known, or fails with [`Error::SizeMismatch`]. Nothing is silently
//! truncated or padded.

mod error;

pub mod blast;
pub mod cipher;
pub mod inflate;
pub mod lzss;

pub use error::{Error, Result};

/// Check a decoded buffer against the size recorded in an archive table.
pub fn check_size(output: Vec<u8>, expected: Option<usize>) -> Result<Vec<u8>> {
    match expected {
        Some(expected) if output.len() != expected => Err(Error::SizeMismatch {
            expected,
            actual: output.len(),
        }),
        _ => Ok(output),
    }
}
