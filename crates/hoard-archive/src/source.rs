//! File table entries.

use std::fmt;
use std::sync::{Arc, OnceLock};

use hoard_common::path;

use crate::binary::ArcBinary;
use crate::object::{CachedObject, ObjectFactory};
use crate::Archive;

/// Opaque format-specific side data carried from table read to data read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Tag {
    #[default]
    None,
    /// A number, such as a cipher offset or an entry flag word.
    Value(u64),
    /// Raw bytes, such as a per-entry header or IV.
    Bytes(Box<[u8]>),
    /// An alternate path, such as a shared-resource redirection.
    Path(String),
}

impl Tag {
    /// Get the numeric value, if any.
    pub fn value(&self) -> Option<u64> {
        match self {
            Self::Value(v) => Some(*v),
            _ => None,
        }
    }

    /// Check whether no side data is present.
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

/// One directory entry inside an archive.
///
/// Entries are created in bulk when a table is read and are immutable
/// afterwards, apart from the write-once object cache.
#[derive(Default)]
pub struct FileSource {
    /// Normalized forward-slash relative path.
    pub path: String,
    /// Numeric identifier for formats keyed by hash or id.
    pub id: Option<u64>,
    /// Offset of the payload in the archive blob.
    pub offset: u64,
    /// Decompressed size of the logical file, parts included.
    pub file_size: u64,
    /// On-disk size of the primary payload.
    pub packed_size: u64,
    /// Format-specific codec selector; 0 means stored.
    pub compressed: u32,
    /// Set when this entry is itself an archive.
    pub sub_archive: Option<SubArchive>,
    /// Fragments appended after the primary payload, in order.
    pub parts: Vec<FileSource>,
    pub tag: Tag,
    pub tag2: Tag,
    pub(crate) object_factory: OnceLock<Option<Arc<dyn ObjectFactory>>>,
    pub(crate) object: OnceLock<CachedObject>,
}

impl FileSource {
    /// Create an entry for a path.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn with_id(mut self, id: u64) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    /// Set both the packed and the decompressed size.
    pub fn with_size(mut self, size: u64) -> Self {
        self.file_size = size;
        self.packed_size = size;
        self
    }

    pub fn with_sizes(mut self, packed_size: u64, file_size: u64) -> Self {
        self.packed_size = packed_size;
        self.file_size = file_size;
        self
    }

    pub fn with_compressed(mut self, compressed: u32) -> Self {
        self.compressed = compressed;
        self
    }

    pub fn with_tag(mut self, tag: Tag) -> Self {
        self.tag = tag;
        self
    }

    pub fn with_tag2(mut self, tag: Tag) -> Self {
        self.tag2 = tag;
        self
    }

    pub fn with_sub_archive(mut self, sub_archive: SubArchive) -> Self {
        self.sub_archive = Some(sub_archive);
        self
    }

    /// Append a fragment. The logical size grows by the fragment's size.
    pub fn with_part(mut self, part: FileSource) -> Self {
        self.file_size += part.file_size;
        self.parts.push(part);
        self
    }

    /// Normalize the path. Applied once when the table is loaded.
    pub fn fix(&mut self) {
        self.path = path::normalize(&self.path);
        for part in &mut self.parts {
            part.fix();
        }
    }

    /// Decompressed size of the primary payload, without parts.
    pub fn payload_size(&self) -> u64 {
        let parts: u64 = self.parts.iter().map(|p| p.file_size).sum();
        self.file_size.saturating_sub(parts)
    }

    /// Check whether this entry is a nested archive.
    #[inline]
    pub fn is_nested(&self) -> bool {
        self.sub_archive.is_some()
    }

    /// Lowercase extension of the path.
    pub fn extension(&self) -> Option<String> {
        path::extension(&self.path)
    }

    /// Get the typed object, if one has been materialized.
    pub fn cached_object(&self) -> Option<&CachedObject> {
        self.object.get()
    }

    /// Get the resolved object factory, if resolution has happened.
    ///
    /// The outer `Option` is `None` until [`Archive::ensure_object_factory`]
    /// ran for this entry.
    pub fn cached_object_factory(&self) -> Option<Option<&Arc<dyn ObjectFactory>>> {
        self.object_factory.get().map(Option::as_ref)
    }
}

impl fmt::Debug for FileSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileSource")
            .field("path", &self.path)
            .field("id", &self.id)
            .field("offset", &self.offset)
            .field("file_size", &self.file_size)
            .field("packed_size", &self.packed_size)
            .field("compressed", &self.compressed)
            .field("nested", &self.is_nested())
            .field("parts", &self.parts.len())
            .field("tag", &self.tag)
            .field("cached", &self.object.get().is_some())
            .finish()
    }
}

/// An archive whose bytes are the payload of a parent entry.
///
/// The nested format is either bound when the table is read or detected
/// from the payload on first access. The child archive is opened once.
#[derive(Default)]
pub struct SubArchive {
    binary: OnceLock<Arc<dyn ArcBinary>>,
    archive: OnceLock<Arc<Archive>>,
}

impl SubArchive {
    /// Nested archive parsed by a known format.
    pub fn new(binary: Arc<dyn ArcBinary>) -> Self {
        let this = Self::default();
        let _ = this.binary.set(binary);
        this
    }

    /// Nested archive whose format is detected when it is opened.
    pub fn detect() -> Self {
        Self::default()
    }

    /// The bound format, if known.
    pub fn binary(&self) -> Option<&Arc<dyn ArcBinary>> {
        self.binary.get()
    }

    /// The opened child archive, if it has been opened.
    pub fn get(&self) -> Option<&Arc<Archive>> {
        self.archive.get()
    }

    pub fn is_open(&self) -> bool {
        self.archive.get().is_some()
    }

    pub(crate) fn bind(&self, binary: Arc<dyn ArcBinary>) -> &Arc<dyn ArcBinary> {
        self.binary.get_or_init(|| binary)
    }

    /// Store the opened child. A concurrent opener that lost the race
    /// gets the winner's archive.
    pub(crate) fn init(&self, child: Arc<Archive>) -> &Arc<Archive> {
        self.archive.get_or_init(|| child)
    }
}

impl fmt::Debug for SubArchive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubArchive")
            .field("format", &self.binary.get().map(|b| b.id()))
            .field("open", &self.is_open())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fix_normalizes_parts() {
        let mut file = FileSource::new(r"Data\Big.bin").with_part(FileSource::new(r".\Data\Big.bin.1"));
        file.fix();
        assert_eq!(file.path, "Data/Big.bin");
        assert_eq!(file.parts[0].path, "Data/Big.bin.1");
    }

    #[test]
    fn test_payload_size_excludes_parts() {
        let file = FileSource::new("a.bin")
            .with_size(10)
            .with_part(FileSource::new("a.bin.1").with_size(4))
            .with_part(FileSource::new("a.bin.2").with_size(6));
        assert_eq!(file.file_size, 20);
        assert_eq!(file.payload_size(), 10);
    }

    #[test]
    fn test_extension_and_nesting() {
        let file = FileSource::new("levels/Town.PAK").with_sub_archive(SubArchive::detect());
        assert_eq!(file.extension().as_deref(), Some("pak"));
        assert!(file.is_nested());
        assert!(file.sub_archive.as_ref().is_some_and(|s| s.binary().is_none()));
    }

    #[test]
    fn test_tag_value() {
        assert_eq!(Tag::Value(7).value(), Some(7));
        assert!(Tag::None.is_none());
        assert_eq!(Tag::Path("x".into()).value(), None);
    }
}
