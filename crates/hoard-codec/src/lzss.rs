//! Ring-buffer LZSS.
//!
//! Stream layout: a control byte announces the next eight tokens, least
//! significant bit first. A set bit is a literal byte; a clear bit is a
//! two-byte back-reference into the ring buffer:
//!
//! ```text
//! b0 = position & 0xFF
//! b1 = ((position >> 4) & 0xF0) | (length - threshold - 1)
//! ```
//!
//! Games differ in the ring size, the initial write position and the fill
//! byte, so those are carried in [`LzssParams`].

use crate::{check_size, Error, Result};

/// Per-format LZSS parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LzssParams {
    /// Ring buffer size in bytes (a power of two, at most 4096).
    pub window: usize,
    /// Initial write position in the ring.
    pub start: usize,
    /// Byte the ring is pre-filled with.
    pub fill: u8,
    /// Matches of this length or shorter are never encoded.
    pub threshold: usize,
}

impl Default for LzssParams {
    /// The classic Okumura layout: 4 KiB ring, 18-byte lookahead,
    /// space-filled.
    fn default() -> Self {
        Self {
            window: 4096,
            start: 4096 - 18,
            fill: b' ',
            threshold: 2,
        }
    }
}

/// Decompress LZSS data with the default parameters.
///
/// Decoding stops when the input is consumed or `expected` bytes have been
/// produced.
pub fn decompress_lzss(data: &[u8], expected: Option<usize>) -> Result<Vec<u8>> {
    decompress_lzss_with(data, expected, LzssParams::default())
}

/// Decompress LZSS data with explicit parameters.
pub fn decompress_lzss_with(
    data: &[u8],
    expected: Option<usize>,
    params: LzssParams,
) -> Result<Vec<u8>> {
    if !params.window.is_power_of_two() || params.window > 4096 {
        return Err(Error::Corrupt {
            codec: "lzss",
            message: format!("unsupported window size {}", params.window),
        });
    }

    let mask = params.window - 1;
    let mut ring = vec![params.fill; params.window];
    let mut r = params.start & mask;
    let limit = expected.unwrap_or(usize::MAX);
    let mut output = Vec::with_capacity(expected.unwrap_or(data.len() * 2).min(1 << 26));
    let mut input = data.iter().copied();
    let mut consumed = 0usize;

    'stream: while output.len() < limit {
        let Some(control) = input.next() else { break };
        consumed += 1;

        for bit in 0..8 {
            if output.len() >= limit {
                break 'stream;
            }

            if control & (1 << bit) != 0 {
                let Some(byte) = input.next() else { break 'stream };
                consumed += 1;
                output.push(byte);
                ring[r] = byte;
                r = (r + 1) & mask;
                continue;
            }

            let (Some(lo), Some(hi)) = (input.next(), input.next()) else {
                // A dangling half token can only come from truncation.
                if expected.is_some() {
                    return Err(Error::Truncated { consumed });
                }
                break 'stream;
            };
            consumed += 2;

            let position = lo as usize | ((hi as usize & 0xF0) << 4);
            let length = (hi as usize & 0x0F) + params.threshold + 1;
            if output.len() + length > limit {
                return Err(Error::Corrupt {
                    codec: "lzss",
                    message: format!(
                        "back-reference of {length} bytes overruns the {limit}-byte output"
                    ),
                });
            }

            for k in 0..length {
                let byte = ring[(position + k) & mask];
                output.push(byte);
                ring[r] = byte;
                r = (r + 1) & mask;
            }
        }
    }

    check_size(output, expected)
}
