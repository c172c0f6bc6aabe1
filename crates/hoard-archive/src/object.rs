//! Typed-object factories and file options.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use bitflags::bitflags;
use rustc_hash::FxHashMap;

use crate::{Archive, FileSource, Result};

/// A materialized typed object, shared through the entry cache.
pub type CachedObject = Arc<dyn Any + Send + Sync>;

/// Content sniffer over the first [`SNIFF_LEN`] bytes of a payload.
pub type Sniffer = fn(&[u8]) -> bool;

/// Number of leading bytes handed to sniffers.
pub const SNIFF_LEN: usize = 16;

bitflags! {
    /// Flags steering data reads, export and import.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FileOption: u32 {
        /// Emit `.set`/`.meta` manifests during export.
        const MARKER = 1 << 0;
        /// Resolve the typed-object factory before extraction.
        const OBJECT = 1 << 1;
        /// Copy payloads verbatim: no parts, no re-serialization.
        const RAW = 1 << 2;
        /// The factory's object is a view over the entry stream. An
        /// `OBJECT` export writes the entry data without building it.
        const STREAM_OBJECT = 1 << 3;
        /// The factory's object must go through its serializer on export.
        const BINARY_OBJECT = 1 << 4;
        /// The factory wraps files with no recognized model type. Export
        /// falls back to the entry data when serialization is unavailable.
        const UNKNOWN_FILE_MODEL = 1 << 5;
    }
}

impl FileOption {
    pub const DEFAULT: Self = Self::empty();
}

/// Turns the bytes of one file into a domain object.
pub trait ObjectFactory: Send + Sync {
    /// Option flags this factory answers to. The object hint flags among
    /// them decide how an `OBJECT` export writes the entry.
    fn option(&self) -> FileOption {
        FileOption::OBJECT
    }

    /// Build the object from the entry's bytes.
    fn create(&self, archive: &Archive, file: &FileSource, data: Vec<u8>) -> Result<CachedObject>;

    /// Serialize an object for export, or `None` to export raw bytes.
    fn serialize(&self, object: &CachedObject) -> Option<Result<Vec<u8>>> {
        let _ = object;
        None
    }
}

/// Adapter turning a closure into an [`ObjectFactory`].
pub struct FactoryFn<F> {
    option: FileOption,
    create: F,
}

impl<F> FactoryFn<F>
where
    F: Fn(&Archive, &FileSource, Vec<u8>) -> Result<CachedObject> + Send + Sync,
{
    pub fn new(option: FileOption, create: F) -> Self {
        Self { option, create }
    }
}

impl<F> ObjectFactory for FactoryFn<F>
where
    F: Fn(&Archive, &FileSource, Vec<u8>) -> Result<CachedObject> + Send + Sync,
{
    fn option(&self) -> FileOption {
        self.option
    }

    fn create(&self, archive: &Archive, file: &FileSource, data: Vec<u8>) -> Result<CachedObject> {
        (self.create)(archive, file, data)
    }
}

/// Lookup from extension or content to typed-object factory.
#[derive(Default, Clone)]
pub struct ObjectRegistry {
    by_extension: FxHashMap<String, Arc<dyn ObjectFactory>>,
    sniffers: Vec<(Sniffer, Arc<dyn ObjectFactory>)>,
}

impl ObjectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory for an extension (case-insensitive, no dot).
    pub fn register(&mut self, extension: &str, factory: Arc<dyn ObjectFactory>) -> &mut Self {
        let key = extension.trim_start_matches('.').to_ascii_lowercase();
        self.by_extension.insert(key, factory);
        self
    }

    /// Register a content sniffer. Sniffers are tried in registration order.
    pub fn register_sniffer(&mut self, sniffer: Sniffer, factory: Arc<dyn ObjectFactory>) -> &mut Self {
        self.sniffers.push((sniffer, factory));
        self
    }

    pub fn by_extension(&self, extension: &str) -> Option<&Arc<dyn ObjectFactory>> {
        self.by_extension.get(extension)
    }

    /// First factory whose sniffer accepts the leading bytes.
    pub fn sniff(&self, head: &[u8]) -> Option<&Arc<dyn ObjectFactory>> {
        let head = &head[..head.len().min(SNIFF_LEN)];
        self.sniffers
            .iter()
            .find(|(sniffer, _)| sniffer(head))
            .map(|(_, factory)| factory)
    }

    pub fn has_sniffers(&self) -> bool {
        !self.sniffers.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.by_extension.is_empty() && self.sniffers.is_empty()
    }
}

impl fmt::Debug for ObjectRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut extensions: Vec<_> = self.by_extension.keys().collect();
        extensions.sort();
        f.debug_struct("ObjectRegistry")
            .field("extensions", &extensions)
            .field("sniffers", &self.sniffers.len())
            .finish()
    }
}
