//! Cursor over a borrowed byte slice.
//!
//! Archive tables come straight from files we do not control, so nothing in
//! here indexes without checking first. A short or lying header turns into
//! an [`Error`] and never a panic.

use std::borrow::Cow;

use zerocopy::FromBytes;

use crate::{Error, Result};

/// Generates fixed-width integer readers.
macro_rules! int_readers {
    ($($name:ident => $ty:ty, $conv:ident;)*) => {
        $(
            #[inline]
            pub fn $name(&mut self) -> Result<$ty> {
                self.read_array().map(<$ty>::$conv)
            }
        )*
    };
}

/// Forward-only reader over `&[u8]`. Slices it hands out borrow the
/// underlying buffer, not the reader.
///
/// ```
/// use hoard_common::BinaryReader;
///
/// let header = *b"PACK\x0c\0\0\0\x40\0";
/// let mut r = BinaryReader::new(&header);
/// r.expect_magic(b"PACK").unwrap();
/// assert_eq!(r.read_u32().unwrap(), 12);
/// assert_eq!(r.read_u16().unwrap(), 64);
/// assert!(r.is_empty());
/// ```
#[derive(Debug, Clone)]
pub struct BinaryReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> BinaryReader<'a> {
    #[inline]
    pub const fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    #[inline]
    pub const fn position(&self) -> usize {
        self.pos
    }

    /// Size of the whole buffer, including what was already consumed.
    #[inline]
    pub const fn len(&self) -> usize {
        self.buf.len()
    }

    #[inline]
    pub const fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Jump to `target`. The end of the buffer is a valid target.
    pub fn seek(&mut self, target: usize) -> Result<()> {
        if target > self.buf.len() {
            return Err(Error::SeekPastEnd {
                target,
                len: self.buf.len(),
            });
        }
        self.pos = target;
        Ok(())
    }

    #[inline]
    pub fn advance(&mut self, count: usize) -> Result<()> {
        self.take(count).map(drop)
    }

    /// Everything from the cursor to the end.
    #[inline]
    pub fn remaining_bytes(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }

    #[inline]
    pub fn read_bytes(&mut self, count: usize) -> Result<&'a [u8]> {
        self.take(count)
    }

    #[inline]
    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let bytes = self.take(N)?;
        let mut array = [0u8; N];
        array.copy_from_slice(bytes);
        Ok(array)
    }

    /// Carve the next `count` bytes into their own reader.
    pub fn sub_reader(&mut self, count: usize) -> Result<BinaryReader<'a>> {
        Ok(BinaryReader::new(self.take(count)?))
    }

    /// Fails unless `count` records of `record_size` bytes can still follow.
    ///
    /// Run this on every count taken from a header before reserving memory
    /// for it.
    pub fn check_count(&self, table: &'static str, count: usize, record_size: usize) -> Result<()> {
        let left = self.remaining();
        if count.checked_mul(record_size).is_some_and(|n| n <= left) {
            return Ok(());
        }
        Err(Error::CountTooLarge {
            table,
            count,
            record_size,
            left,
        })
    }

    #[inline]
    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    int_readers! {
        read_u16 => u16, from_le_bytes;
        read_u32 => u32, from_le_bytes;
        read_u64 => u64, from_le_bytes;
        read_u16_be => u16, from_be_bytes;
        read_u32_be => u32, from_be_bytes;
    }

    /// Read up to the next NUL and step over it. Bytes that are not UTF-8
    /// become U+FFFD, since older games store names in legacy code pages.
    pub fn read_cstring_lossy(&mut self) -> Result<Cow<'a, str>> {
        let rest = self.remaining_bytes();
        let end = memchr::memchr(0, rest).ok_or(Error::Unterminated)?;
        self.pos += end + 1;
        Ok(String::from_utf8_lossy(&rest[..end]))
    }

    /// Read a name stored in a fixed `width` field, padded with NULs.
    pub fn read_string_in_buffer(&mut self, width: usize) -> Result<Cow<'a, str>> {
        let field = self.take(width)?;
        let end = memchr::memchr(0, field).unwrap_or(field.len());
        Ok(String::from_utf8_lossy(&field[..end]))
    }

    /// Decode a plain-old-data record. Declare its fields with the
    /// `zerocopy::little_endian` types so the host byte order never leaks in.
    pub fn read_struct<T: FromBytes>(&mut self) -> Result<T> {
        let size = std::mem::size_of::<T>();
        let bytes = self.take(size)?;
        T::read_from_bytes(bytes).map_err(|_| Error::Truncated {
            wanted: size,
            left: bytes.len(),
        })
    }

    /// Consume a signature, failing if the bytes differ.
    pub fn expect_magic(&mut self, wanted: &[u8]) -> Result<()> {
        let found = self.take(wanted.len())?;
        if found == wanted {
            Ok(())
        } else {
            Err(Error::BadMagic {
                wanted: wanted.to_vec(),
                found: found.to_vec(),
            })
        }
    }

    fn take(&mut self, count: usize) -> Result<&'a [u8]> {
        let left = self.remaining();
        if count > left {
            return Err(Error::Truncated { wanted: count, left });
        }
        let start = self.pos;
        self.pos += count;
        Ok(&self.buf[start..self.pos])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integers_in_both_byte_orders() {
        let data = [0x34, 0x12, 0x78, 0x56, 0x34, 0x12, 0x00, 0x2a, 0x00, 0x00, 0x01, 0x00];
        let mut r = BinaryReader::new(&data);

        assert_eq!(r.read_u16().unwrap(), 0x1234);
        assert_eq!(r.read_u32().unwrap(), 0x1234_5678);
        assert_eq!(r.read_u16_be().unwrap(), 0x2a);
        assert_eq!(r.read_u32_be().unwrap(), 0x100);
        assert!(r.is_empty());
        assert!(matches!(r.read_u8(), Err(Error::Truncated { wanted: 1, left: 0 })));
    }

    #[test]
    fn test_u64() {
        let data = 0x0102_0304_0506_0708u64.to_le_bytes();
        assert_eq!(BinaryReader::new(&data).read_u64().unwrap(), 0x0102_0304_0506_0708);
    }

    #[test]
    fn test_cstrings() {
        let mut r = BinaryReader::new(b"meshes\\a.nif\0caf\xe9\0tail");

        assert_eq!(r.read_cstring_lossy().unwrap(), "meshes\\a.nif");
        assert_eq!(r.read_cstring_lossy().unwrap(), "caf\u{FFFD}");
        assert!(matches!(r.read_cstring_lossy(), Err(Error::Unterminated)));
        // A failed read leaves the cursor alone.
        assert_eq!(r.remaining_bytes(), b"tail");
    }

    #[test]
    fn test_padded_name() {
        let mut data = [0u8; 12];
        data[..7].copy_from_slice(b"gfx.lmp");
        data[8] = b'x';
        let mut r = BinaryReader::new(&data);

        assert_eq!(r.read_string_in_buffer(12).unwrap(), "gfx.lmp");
        assert!(r.is_empty());
    }

    #[test]
    fn test_short_reads_do_not_move() {
        let mut r = BinaryReader::new(&[1, 2, 3]);

        assert!(r.read_u32().is_err());
        assert!(r.advance(4).is_err());
        assert_eq!(r.position(), 0);
        r.advance(3).unwrap();
        assert_eq!(r.position(), 3);
    }

    #[test]
    fn test_seek() {
        let mut r = BinaryReader::new(&[0u8; 6]);

        r.seek(6).unwrap();
        assert!(r.is_empty());
        r.seek(2).unwrap();
        assert_eq!(r.remaining(), 4);
        assert!(matches!(r.seek(7), Err(Error::SeekPastEnd { target: 7, len: 6 })));
    }

    #[test]
    fn test_magic() {
        let mut r = BinaryReader::new(b"BSA\0rest");
        r.expect_magic(b"BSA\0").unwrap();
        assert!(matches!(r.expect_magic(b"PACK"), Err(Error::BadMagic { .. })));
    }

    #[test]
    fn test_count_guard() {
        let r = BinaryReader::new(&[0u8; 32]);

        assert!(r.check_count("folders", 4, 8).is_ok());
        assert!(r.check_count("folders", 5, 8).is_err());
        assert!(r.check_count("folders", usize::MAX / 2, 4).is_err());
    }

    #[test]
    fn test_sub_reader_is_bounded() {
        let data = [5u8, 0, 6, 0, 7, 0];
        let mut r = BinaryReader::new(&data);
        let mut table = r.sub_reader(4).unwrap();

        assert_eq!(table.read_u16().unwrap(), 5);
        assert_eq!(table.read_u16().unwrap(), 6);
        assert!(table.read_u16().is_err());
        assert_eq!(r.read_u16().unwrap(), 7);
        assert!(r.sub_reader(1).is_err());
    }
}
