//! The per-format parser contract.

use std::io::{Seek, Write};

use crate::{Archive, Blob, Error, FileOption, FileSource, Result};

/// A writable, seekable sink for repacking.
pub trait WriteSeek: Write + Seek {}

impl<T: Write + Seek> WriteSeek for T {}

/// Format strategy bound to an [`Archive`].
///
/// One instance may serve every archive of a game, so implementations keep
/// no per-archive state; anything a data read needs goes into the entry's
/// [`tag`](FileSource::tag) at table-read time.
pub trait ArcBinary: Send + Sync {
    /// Format identifier, as registered in the
    /// [`FormatRegistry`](crate::FormatRegistry).
    fn id(&self) -> &'static str;

    /// Parse the header and directory table.
    ///
    /// Bad magic, unsupported versions and truncated tables are errors for
    /// the whole archive.
    fn read(&self, archive: &Archive, blob: &Blob) -> Result<Vec<FileSource>>;

    /// Read one entry's primary payload, decompressed.
    ///
    /// Implementations must not rely on any shared position: sibling
    /// entries may be read concurrently.
    fn read_data(
        &self,
        archive: &Archive,
        blob: &Blob,
        file: &FileSource,
        option: FileOption,
    ) -> Result<Vec<u8>>;

    /// Whether `read_data` may run on several threads for one archive.
    fn supports_concurrent_read(&self) -> bool {
        true
    }

    /// Whether [`write`](Self::write) and [`write_data`](Self::write_data)
    /// are implemented.
    fn supports_write(&self) -> bool {
        false
    }

    /// Lay out and write the header and table.
    ///
    /// `file_size` and `packed_size` are set by the caller. The writer
    /// assigns each entry's `offset` and may reorder `files` into the order
    /// the format requires.
    fn write(&self, files: &mut [FileSource], out: &mut dyn WriteSeek) -> Result<()> {
        let _ = (files, out);
        Err(Error::WriteUnsupported(self.id()))
    }

    /// Write one payload at the offset assigned by [`write`](Self::write).
    fn write_data(&self, file: &FileSource, data: &[u8], out: &mut dyn WriteSeek) -> Result<()> {
        let _ = (file, data, out);
        Err(Error::WriteUnsupported(self.id()))
    }
}
