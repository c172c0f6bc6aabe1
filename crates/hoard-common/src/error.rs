//! Errors raised while decoding archive headers.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// A read ran past the end of the buffer.
    #[error("truncated data: wanted {wanted} bytes, {left} left")]
    Truncated { wanted: usize, left: usize },

    #[error("cannot seek to {target}, buffer holds {len} bytes")]
    SeekPastEnd { target: usize, len: usize },

    /// A table header declares more records than could possibly follow it.
    #[error("{table}: {count} records of {record_size} bytes do not fit in {left} bytes")]
    CountTooLarge {
        table: &'static str,
        count: usize,
        record_size: usize,
        left: usize,
    },

    #[error("bad signature {found:02x?}, wanted {wanted:02x?}")]
    BadMagic { wanted: Vec<u8>, found: Vec<u8> },

    #[error("string runs to the end of the buffer without a terminator")]
    Unterminated,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
