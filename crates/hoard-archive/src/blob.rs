//! Byte providers backing an archive.

use std::borrow::Cow;
use std::fmt;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Arc;

use memmap2::Mmap;
use parking_lot::Mutex;

use crate::{Error, Result};

/// A seekable byte stream that can move between threads.
pub trait ReadSeek: Read + Seek + Send {}

impl<T: Read + Seek + Send> ReadSeek for T {}

/// The bytes an [`Archive`](crate::Archive) reads from.
///
/// All reads are absolute, so no position is shared between entries.
pub enum Blob {
    /// Memory-mapped file.
    Mapped(Mmap),
    /// Shared in-memory bytes.
    Memory(Arc<[u8]>),
    /// A stream behind a lock. Reads are serialized.
    Stream {
        inner: Mutex<Box<dyn ReadSeek>>,
        len: u64,
    },
}

impl Blob {
    /// Map a file from disk.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        if file.metadata()?.len() == 0 {
            // Zero-length mappings fail on some platforms.
            return Ok(Self::Memory(Arc::from(Vec::new())));
        }
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(Self::Mapped(mmap))
    }

    /// Wrap owned bytes.
    pub fn from_bytes(data: impl Into<Arc<[u8]>>) -> Self {
        Self::Memory(data.into())
    }

    /// Wrap a stream. The length is taken by seeking to the end.
    pub fn from_stream(mut stream: Box<dyn ReadSeek>) -> Result<Self> {
        let len = stream.seek(SeekFrom::End(0))?;
        stream.seek(SeekFrom::Start(0))?;
        Ok(Self::Stream {
            inner: Mutex::new(stream),
            len,
        })
    }

    /// Total length in bytes.
    pub fn len(&self) -> u64 {
        match self {
            Self::Mapped(mmap) => mmap.len() as u64,
            Self::Memory(data) => data.len() as u64,
            Self::Stream { len, .. } => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read `len` bytes at an absolute offset.
    pub fn read_at(&self, offset: u64, len: u64) -> Result<Cow<'_, [u8]>> {
        let size = self.len();
        let end = offset.checked_add(len).filter(|&end| end <= size);
        let Some(end) = end else {
            return Err(Error::OutOfBounds { offset, len, size });
        };

        match self {
            Self::Mapped(mmap) => Ok(Cow::Borrowed(&mmap[offset as usize..end as usize])),
            Self::Memory(data) => Ok(Cow::Borrowed(&data[offset as usize..end as usize])),
            Self::Stream { inner, .. } => {
                let mut stream = inner.lock();
                stream.seek(SeekFrom::Start(offset))?;
                let mut buffer = vec![0u8; len as usize];
                stream.read_exact(&mut buffer)?;
                Ok(Cow::Owned(buffer))
            }
        }
    }

    /// Read everything from an offset to the end.
    pub fn read_from(&self, offset: u64) -> Result<Cow<'_, [u8]>> {
        let len = self.len().saturating_sub(offset);
        self.read_at(offset, len)
    }

    /// Up to `n` leading bytes, for content sniffing.
    pub fn head(&self, n: usize) -> Result<Cow<'_, [u8]>> {
        self.read_at(0, self.len().min(n as u64))
    }

    /// Whether independent entries can be read from several threads at once.
    pub fn supports_concurrent_read(&self) -> bool {
        !matches!(self, Self::Stream { .. })
    }
}

impl fmt::Debug for Blob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            Self::Mapped(_) => "Mapped",
            Self::Memory(_) => "Memory",
            Self::Stream { .. } => "Stream",
        };
        f.debug_struct("Blob")
            .field("kind", &kind)
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Write};

    use super::*;

    #[test]
    fn test_memory_read_at() {
        let blob = Blob::from_bytes(b"0123456789".to_vec());
        assert_eq!(&*blob.read_at(2, 3).unwrap(), b"234");
        assert_eq!(&*blob.read_from(8).unwrap(), b"89");
        assert_eq!(&*blob.head(64).unwrap(), b"0123456789");
        assert!(blob.supports_concurrent_read());
    }

    #[test]
    fn test_out_of_bounds() {
        let blob = Blob::from_bytes(b"abc".to_vec());
        assert!(matches!(
            blob.read_at(2, 2),
            Err(Error::OutOfBounds {
                offset: 2,
                len: 2,
                size: 3
            })
        ));
        assert!(blob.read_at(u64::MAX, 2).is_err());
        assert!(blob.read_at(3, 0).unwrap().is_empty());
    }

    #[test]
    fn test_stream() {
        let blob = Blob::from_stream(Box::new(Cursor::new(b"hello world".to_vec()))).unwrap();
        assert_eq!(blob.len(), 11);
        assert_eq!(&*blob.read_at(6, 5).unwrap(), b"world");
        assert_eq!(&*blob.read_at(0, 5).unwrap(), b"hello");
        assert!(!blob.supports_concurrent_read());
    }

    #[test]
    fn test_mapped_and_empty_files() {
        let dir = tempfile::tempdir().unwrap();

        let path = dir.path().join("data.bin");
        File::create(&path).unwrap().write_all(b"mapped").unwrap();
        let blob = Blob::open(&path).unwrap();
        assert!(matches!(blob, Blob::Mapped(_)));
        assert_eq!(&*blob.read_at(0, 6).unwrap(), b"mapped");

        let empty = dir.path().join("empty.bin");
        File::create(&empty).unwrap();
        let blob = Blob::open(&empty).unwrap();
        assert!(blob.is_empty());
    }
}
