//! PKWare Data Compression Library "implode" decompression.
//!
//! The stream starts with two header bytes: the literal mode (0 = raw
//! 8-bit literals, 1 = Huffman-coded literals) and the dictionary size
//! exponent (4, 5 or 6 for 1, 2 or 4 KiB). Every following token is
//! flagged by one bit: 0 for a literal, 1 for a length/distance pair.
//! The length code 519 ends the stream.
//!
//! Codes are stored bit-inverted and the code tables are fixed; they are
//! shipped below in their compact run-length form (high nibble = repeat
//! count - 1, low nibble = code length).

use crate::{check_size, Error, Result};

const MAX_BITS: usize = 13;
const END_OF_STREAM: usize = 519;

const LITERAL_LENGTHS: [u8; 98] = [
    11, 124, 8, 7, 28, 7, 188, 13, 76, 4, 10, 8, 12, 10, 12, 10, 8, 23, 8, 9, 7, 6, 7, 8, 7, 6,
    55, 8, 23, 24, 12, 11, 7, 9, 11, 12, 6, 7, 22, 5, 7, 24, 6, 11, 9, 6, 7, 22, 7, 11, 38, 7, 9,
    8, 25, 11, 8, 11, 9, 12, 8, 12, 5, 38, 5, 38, 5, 11, 7, 5, 6, 21, 6, 10, 53, 8, 7, 24, 10, 27,
    44, 253, 253, 253, 252, 252, 252, 13, 12, 45, 12, 45, 12, 61, 12, 45, 44, 173,
];
const LENGTH_LENGTHS: [u8; 6] = [2, 35, 36, 53, 38, 23];
const DISTANCE_LENGTHS: [u8; 7] = [2, 20, 53, 230, 247, 151, 248];

const LENGTH_BASE: [u16; 16] = [3, 2, 4, 5, 6, 7, 8, 9, 10, 12, 16, 24, 40, 72, 136, 264];
const LENGTH_EXTRA: [u8; 16] = [0, 0, 0, 0, 0, 0, 0, 0, 1, 2, 3, 4, 5, 6, 7, 8];

/// Canonical Huffman decoding table.
struct Huffman {
    count: [u16; MAX_BITS + 1],
    symbol: Vec<u16>,
}

impl Huffman {
    fn from_compact(compact: &[u8]) -> Self {
        let mut lengths = Vec::with_capacity(256);
        for &rep in compact {
            let repeat = (rep >> 4) as usize + 1;
            lengths.extend(std::iter::repeat(rep & 0x0F).take(repeat));
        }

        let mut count = [0u16; MAX_BITS + 1];
        for &len in &lengths {
            count[len as usize] += 1;
        }

        let mut offsets = [0u16; MAX_BITS + 1];
        for len in 1..MAX_BITS {
            offsets[len + 1] = offsets[len] + count[len];
        }

        let mut symbol = vec![0u16; lengths.len()];
        for (sym, &len) in lengths.iter().enumerate() {
            if len != 0 {
                symbol[offsets[len as usize] as usize] = sym as u16;
                offsets[len as usize] += 1;
            }
        }

        Self { count, symbol }
    }
}

struct BitReader<'a> {
    data: &'a [u8],
    position: usize,
    buffer: u32,
    available: u32,
}

impl<'a> BitReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            position: 0,
            buffer: 0,
            available: 0,
        }
    }

    fn bits(&mut self, need: u32) -> Result<u32> {
        let mut value = self.buffer;
        while self.available < need {
            let byte = *self.data.get(self.position).ok_or(Error::Truncated {
                consumed: self.position,
            })?;
            value |= (byte as u32) << self.available;
            self.position += 1;
            self.available += 8;
        }
        self.buffer = value >> need;
        self.available -= need;
        Ok(value & ((1u32 << need) - 1))
    }

    fn decode(&mut self, table: &Huffman) -> Result<usize> {
        let mut code = 0i32;
        let mut first = 0i32;
        let mut index = 0i32;

        for len in 1..=MAX_BITS {
            code |= (self.bits(1)? ^ 1) as i32;
            let count = table.count[len] as i32;
            if code < first + count {
                return Ok(table.symbol[(index + code - first) as usize] as usize);
            }
            index += count;
            first = (first + count) << 1;
            code <<= 1;
        }

        Err(Error::Corrupt {
            codec: "blast",
            message: "code longer than 13 bits".into(),
        })
    }
}

/// Decompress a PKWare DCL imploded stream.
pub fn decompress_blast(data: &[u8], expected: Option<usize>) -> Result<Vec<u8>> {
    let literals = Huffman::from_compact(&LITERAL_LENGTHS);
    let lengths = Huffman::from_compact(&LENGTH_LENGTHS);
    let distances = Huffman::from_compact(&DISTANCE_LENGTHS);

    let mut input = BitReader::new(data);
    let coded_literals = match input.bits(8)? {
        0 => false,
        1 => true,
        mode => {
            return Err(Error::Corrupt {
                codec: "blast",
                message: format!("invalid literal mode {mode}"),
            })
        }
    };
    let dictionary = input.bits(8)?;
    if !(4..=6).contains(&dictionary) {
        return Err(Error::Corrupt {
            codec: "blast",
            message: format!("invalid dictionary size {dictionary}"),
        });
    }

    let limit = expected.unwrap_or(usize::MAX);
    let mut output: Vec<u8> = Vec::with_capacity(expected.unwrap_or(data.len() * 4).min(1 << 26));

    loop {
        if input.bits(1)? == 1 {
            let symbol = input.decode(&lengths)?;
            let length = LENGTH_BASE[symbol] as usize + input.bits(LENGTH_EXTRA[symbol] as u32)? as usize;
            if length == END_OF_STREAM {
                break;
            }

            let shift = if length == 2 { 2 } else { dictionary };
            let distance =
                ((input.decode(&distances)? << shift) + input.bits(shift)? as usize) + 1;
            if distance > output.len() {
                return Err(Error::Corrupt {
                    codec: "blast",
                    message: format!(
                        "distance {distance} reaches before the start of the output"
                    ),
                });
            }
            if output.len() + length > limit {
                return Err(Error::SizeMismatch {
                    expected: limit,
                    actual: output.len() + length,
                });
            }

            let start = output.len() - distance;
            for k in 0..length {
                let byte = output[start + k];
                output.push(byte);
            }
        } else {
            let literal = if coded_literals {
                input.decode(&literals)? as u8
            } else {
                input.bits(8)? as u8
            };
            if output.len() == limit {
                return Err(Error::SizeMismatch {
                    expected: limit,
                    actual: output.len() + 1,
                });
            }
            output.push(literal);
        }
    }

    check_size(output, expected)
}
