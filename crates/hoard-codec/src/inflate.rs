//! zlib, raw DEFLATE and Zstandard decompression.

use std::io::Read;

use flate2::read::{DeflateDecoder, ZlibDecoder};
use tracing::trace;

use crate::{check_size, Error, Result};

/// Upper bound for up-front allocation; tables can lie about sizes.
const MAX_PREALLOC: usize = 64 * 1024 * 1024;

/// Decompress zlib-wrapped data.
///
/// `expected` is the decompressed size from the archive table, or `None`
/// when the format does not record it and the buffer has to grow.
pub fn decompress_zlib(data: &[u8], expected: Option<usize>) -> Result<Vec<u8>> {
    read_all("zlib", ZlibDecoder::new(data), data.len(), expected)
}

/// Decompress raw DEFLATE data (no zlib header).
pub fn decompress_deflate(data: &[u8], expected: Option<usize>) -> Result<Vec<u8>> {
    read_all("deflate", DeflateDecoder::new(data), data.len(), expected)
}

/// Decompress Zstandard data.
pub fn decompress_zstd(data: &[u8], expected: Option<usize>) -> Result<Vec<u8>> {
    let decoder = zstd::Decoder::new(data).map_err(|source| Error::Decoder {
        codec: "zstd",
        source,
    })?;
    read_all("zstd", decoder, data.len(), expected)
}

fn read_all<R: Read>(
    codec: &'static str,
    decoder: R,
    packed: usize,
    expected: Option<usize>,
) -> Result<Vec<u8>> {
    let capacity = expected.unwrap_or(packed.saturating_mul(2)).min(MAX_PREALLOC);
    let mut output = Vec::with_capacity(capacity);

    // Read one byte past the expected size so overlong streams are caught.
    let result = match expected {
        Some(expected) => decoder
            .take((expected as u64).saturating_add(1))
            .read_to_end(&mut output),
        None => {
            let mut decoder = decoder;
            decoder.read_to_end(&mut output)
        }
    };
    result.map_err(|source| Error::Decoder { codec, source })?;

    trace!(codec, packed, unpacked = output.len(), "inflated");
    check_size(output, expected)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use flate2::write::{DeflateEncoder, ZlibEncoder};
    use flate2::Compression;

    use super::*;

    const TEXT: &[u8] = b"Hello, World! This is a test of archive payload compression.";

    fn zlib(data: &[u8]) -> Vec<u8> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_zlib_known_size() {
        let packed = zlib(TEXT);
        assert_eq!(decompress_zlib(&packed, Some(TEXT.len())).unwrap(), TEXT);
    }

    #[test]
    fn test_zlib_unknown_size_grows() {
        let big = TEXT.repeat(1000);
        let packed = zlib(&big);
        assert_eq!(decompress_zlib(&packed, None).unwrap(), big);
    }

    #[test]
    fn test_zlib_size_mismatch_is_an_error() {
        let packed = zlib(TEXT);
        let short = decompress_zlib(&packed, Some(TEXT.len() - 1));
        assert!(matches!(short, Err(Error::SizeMismatch { .. })));

        let long = decompress_zlib(&packed, Some(TEXT.len() + 10));
        assert!(matches!(long, Err(Error::SizeMismatch { .. })));
    }

    #[test]
    fn test_deflate() {
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(TEXT).unwrap();
        let packed = encoder.finish().unwrap();

        assert_eq!(decompress_deflate(&packed, Some(TEXT.len())).unwrap(), TEXT);
    }

    #[test]
    fn test_zstd() {
        let packed = zstd::encode_all(TEXT, 3).unwrap();
        assert_eq!(decompress_zstd(&packed, Some(TEXT.len())).unwrap(), TEXT);
    }

    #[test]
    fn test_absurd_table_size_is_a_mismatch() {
        let packed = zlib(TEXT);
        let result = decompress_zlib(&packed, Some(usize::MAX));
        assert!(matches!(result, Err(Error::SizeMismatch { .. })));
    }

    #[test]
    fn test_garbage_fails() {
        assert!(decompress_zlib(b"not zlib at all", None).is_err());
    }
}
