//! The archive facade.

use std::any::{type_name, Any};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use hoard_common::path::{self, nested_splits};
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use tracing::{debug, trace, warn};

use crate::object::{CachedObject, ObjectFactory, SNIFF_LEN};
use crate::{
    ArcBinary, Blob, Error, FileOption, FileSource, FormatRegistry, Game, ObjectRegistry, Result,
};

/// Construction parameters of an archive.
#[derive(Clone)]
pub struct ArchiveState {
    /// Path of the underlying file, or a descriptive path for nested and
    /// streamed archives.
    pub path: PathBuf,
    pub game: Option<Arc<Game>>,
    pub edition: Option<String>,
    pub formats: Arc<FormatRegistry>,
    pub objects: Arc<ObjectRegistry>,
    /// Attach sub-archives to entries whose extension names a format.
    pub nested: bool,
}

impl ArchiveState {
    /// State with the built-in formats and no game.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            game: None,
            edition: None,
            formats: Arc::new(FormatRegistry::builtin()),
            objects: Arc::new(ObjectRegistry::default()),
            nested: true,
        }
    }

    pub fn with_game(mut self, game: Arc<Game>) -> Self {
        self.game = Some(game);
        self
    }

    pub fn with_edition(mut self, edition: impl Into<String>) -> Self {
        self.edition = Some(edition.into());
        self
    }

    pub fn with_formats(mut self, formats: Arc<FormatRegistry>) -> Self {
        self.formats = formats;
        self
    }

    pub fn with_objects(mut self, objects: Arc<ObjectRegistry>) -> Self {
        self.objects = objects;
        self
    }

    pub fn with_nested(mut self, nested: bool) -> Self {
        self.nested = nested;
        self
    }

    /// State for an archive stored in one of this archive's entries.
    pub fn child(&self, entry: &str) -> Self {
        let mut child = self.clone();
        child.path = PathBuf::from(format!("{}:{}", self.path.display(), entry));
        child
    }

    fn engine(&self) -> Option<&str> {
        self.game.as_deref().map(Game::engine)
    }
}

impl fmt::Debug for ArchiveState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArchiveState")
            .field("path", &self.path)
            .field("game", &self.game.as_deref().map(Game::id))
            .field("edition", &self.edition)
            .field("nested", &self.nested)
            .finish()
    }
}

struct Table {
    files: Vec<FileSource>,
    index: FxHashMap<String, usize>,
}

/// One opened container.
///
/// The table is read on [`open`](Self::open) or on first access, exactly
/// once. Lookups are case-insensitive; entry paths keep their stored case.
/// After [`close`](Self::close) every call fails with [`Error::Closed`].
pub struct Archive {
    name: String,
    state: ArchiveState,
    binary: Arc<dyn ArcBinary>,
    blob: RwLock<Option<Blob>>,
    table: OnceLock<Table>,
    open_lock: Mutex<()>,
    closed: AtomicBool,
}

impl Archive {
    /// Bind a blob to a strategy. Nothing is read until the archive opens.
    pub fn new(state: ArchiveState, blob: Blob, binary: Arc<dyn ArcBinary>) -> Self {
        let full = state.path.to_string_lossy();
        let name = path::file_name(&full).rsplit(':').next().unwrap_or_default().to_string();
        Self {
            name,
            state,
            binary,
            blob: RwLock::new(Some(blob)),
            table: OnceLock::new(),
            open_lock: Mutex::new(()),
            closed: AtomicBool::new(false),
        }
    }

    /// Map the file at `state.path` and select its format.
    ///
    /// Fails with [`Error::UnknownFormat`] or [`Error::MissingKey`] when no
    /// strategy can be built.
    pub fn from_path(state: ArchiveState) -> Result<Self> {
        let blob = Blob::open(&state.path)?;
        Self::from_blob(state, blob)
    }

    /// Select a format for an already provided blob.
    pub fn from_blob(state: ArchiveState, blob: Blob) -> Result<Self> {
        let head = blob.head(SNIFF_LEN)?.into_owned();
        let archive_path = state.path.to_string_lossy().into_owned();
        let format = state.formats.select(&archive_path, state.engine(), &head)?;
        let binary = format.binary(state.game.as_deref())?;
        Ok(Self::new(state, blob, binary))
    }

    /// Open a file with the built-in formats and read its table.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let archive = Self::from_path(ArchiveState::new(path.as_ref()))?;
        archive.open()?;
        Ok(archive)
    }

    /// Read the table if it has not been read yet.
    pub fn open(&self) -> Result<()> {
        self.table().map(|_| ())
    }

    pub fn is_open(&self) -> bool {
        self.table.get().is_some() && !self.is_closed()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Release the blob and every opened sub-archive.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(table) = self.table.get() {
            for file in &table.files {
                if let Some(child) = file.sub_archive.as_ref().and_then(|s| s.get()) {
                    child.close();
                }
            }
        }
        self.blob.write().take();
        debug!(archive = %self.name, "Closed archive");
    }

    fn table(&self) -> Result<&Table> {
        if self.is_closed() {
            return Err(Error::Closed(self.name.clone()));
        }
        if let Some(table) = self.table.get() {
            return Ok(table);
        }

        let _guard = self.open_lock.lock();
        if let Some(table) = self.table.get() {
            return Ok(table);
        }
        let table = self.read_table()?;
        Ok(self.table.get_or_init(|| table))
    }

    fn read_table(&self) -> Result<Table> {
        let mut files = {
            let blob = self.blob.read();
            let blob = blob.as_ref().ok_or_else(|| Error::Closed(self.name.clone()))?;
            self.binary.read(self, blob)?
        };

        let mut index = FxHashMap::default();
        index.reserve(files.len());
        let mut nested = 0usize;

        for (i, file) in files.iter_mut().enumerate() {
            file.fix();

            if self.state.nested && file.sub_archive.is_none() && file.file_size > 0 {
                let extension = file.extension().unwrap_or_default();
                if self.state.formats.by_extension(&extension).next().is_some() {
                    file.sub_archive = Some(crate::SubArchive::detect());
                }
            }
            if file.is_nested() {
                nested += 1;
            }

            let key = path::lookup_key(&file.path);
            if index.contains_key(&key) {
                warn!(archive = %self.name, path = %file.path, "Duplicate path in table, keeping the first entry");
                continue;
            }
            index.insert(key, i);
        }

        debug!(
            archive = %self.name,
            format = self.binary.id(),
            files = files.len(),
            nested,
            "Loaded archive table"
        );

        Ok(Table { files, index })
    }

    /// All entries, in table order.
    pub fn files(&self) -> Result<&[FileSource]> {
        self.table().map(|t| t.files.as_slice())
    }

    /// Look up an entry of this archive, without following nesting.
    pub fn find(&self, path: &str) -> Option<&FileSource> {
        let table = self.table().ok()?;
        table.index.get(&path::lookup_key(path)).map(|&i| &table.files[i])
    }

    /// Check whether a path resolves, following nested archives.
    pub fn contains(&self, path: &str) -> bool {
        self.find_source(path).is_some()
    }

    /// Resolve a path to the archive that owns it and its entry.
    ///
    /// Nested paths are written `outer.pak:inner/path` and may nest to any
    /// depth.
    pub fn get_source(&self, path: &str) -> Result<(&Archive, &FileSource)> {
        let table = self.table()?;
        if let Some(&i) = table.index.get(&path::lookup_key(path)) {
            return Ok((self, &table.files[i]));
        }

        for (outer, inner) in nested_splits(path) {
            if let Some(&i) = table.index.get(&path::lookup_key(outer)) {
                let child = self.sub_archive(&table.files[i])?;
                return child.get_source(inner);
            }
        }

        Err(Error::FileNotFound {
            path: path.to_string(),
            archive: self.name.clone(),
        })
    }

    /// Like [`get_source`](Self::get_source), returning `None` on failure.
    pub fn find_source(&self, path: &str) -> Option<(&Archive, &FileSource)> {
        self.get_source(path).ok()
    }

    /// Read an entry of this archive.
    ///
    /// Parts are appended after the primary payload unless `option`
    /// contains [`FileOption::RAW`].
    pub fn get_data(&self, file: &FileSource, option: FileOption) -> Result<Vec<u8>> {
        let mut data = self.read_payload(file, file.payload_size(), option)?;
        if !option.contains(FileOption::RAW) {
            for part in &file.parts {
                let bytes = self.read_payload(part, part.file_size, option)?;
                data.extend_from_slice(&bytes);
            }
        }
        Ok(data)
    }

    /// Resolve a path and read it from the owning archive.
    pub fn get_data_at(&self, path: &str, option: FileOption) -> Result<Vec<u8>> {
        let (owner, file) = self.get_source(path)?;
        owner.get_data(file, option)
    }

    /// Like [`get_data_at`](Self::get_data_at), returning `None` on failure.
    pub fn find_data_at(&self, path: &str, option: FileOption) -> Option<Vec<u8>> {
        self.get_data_at(path, option).ok()
    }

    fn read_payload(&self, file: &FileSource, expected: u64, option: FileOption) -> Result<Vec<u8>> {
        if self.is_closed() {
            return Err(Error::Closed(self.name.clone()));
        }
        let blob = self.blob.read();
        let blob = blob.as_ref().ok_or_else(|| Error::Closed(self.name.clone()))?;

        trace!(archive = %self.name, path = %file.path, offset = file.offset, "Reading entry");
        let data = self.binary.read_data(self, blob, file, option)?;
        if data.len() as u64 != expected {
            return Err(Error::SizeMismatch {
                path: file.path.clone(),
                expected,
                actual: data.len() as u64,
            });
        }
        Ok(data)
    }

    /// Open the archive stored in an entry of this archive.
    pub fn sub_archive<'a>(&'a self, file: &'a FileSource) -> Result<&'a Archive> {
        let sub = file
            .sub_archive
            .as_ref()
            .ok_or_else(|| Error::NotNested(file.path.clone()))?;
        if let Some(child) = sub.get() {
            return Ok(child);
        }

        let data = self.get_data(file, FileOption::DEFAULT)?;
        let blob = Blob::from_bytes(data);
        let state = self.state.child(&file.path);

        let binary = match sub.binary() {
            Some(binary) => Arc::clone(binary),
            None => {
                let head = blob.head(SNIFF_LEN)?;
                let format = self.state.formats.select(&file.path, self.state.engine(), &head)?;
                let binary = format.binary(self.state.game.as_deref())?;
                Arc::clone(sub.bind(binary))
            }
        };

        let child = Archive::new(state, blob, binary);
        child.open()?;
        debug!(parent = %self.name, path = %file.path, "Opened nested archive");
        Ok(sub.init(Arc::new(child)))
    }

    /// Materialize the typed object for an entry, or its raw bytes
    /// (`Vec<u8>`) when no factory applies.
    ///
    /// The object is created at most once per entry; later calls return the
    /// cached value without reading the entry again.
    pub fn get_asset<T: Any + Send + Sync>(&self, file: &FileSource, option: FileOption) -> Result<Arc<T>> {
        self.get_object(file, option)?
            .downcast::<T>()
            .map_err(|_| Error::ObjectType {
                path: file.path.clone(),
                expected: type_name::<T>(),
            })
    }

    /// Untyped form of [`get_asset`](Self::get_asset).
    pub fn get_object(&self, file: &FileSource, option: FileOption) -> Result<CachedObject> {
        if let Some(object) = file.object.get() {
            return Ok(Arc::clone(object));
        }
        let object = self.create_object(file, option)?;
        Ok(Arc::clone(file.object.get_or_init(|| object)))
    }

    /// Resolve a path and materialize its object in the owning archive.
    pub fn get_asset_at<T: Any + Send + Sync>(&self, path: &str, option: FileOption) -> Result<Arc<T>> {
        let (owner, file) = self.get_source(path)?;
        owner.get_asset(file, option)
    }

    /// Like [`get_asset_at`](Self::get_asset_at), returning `None` on failure.
    pub fn find_asset_at<T: Any + Send + Sync>(&self, path: &str, option: FileOption) -> Option<Arc<T>> {
        self.get_asset_at(path, option).ok()
    }

    /// The cached object always covers the whole entry, parts included,
    /// whatever `option` the first caller passed.
    fn create_object(&self, file: &FileSource, option: FileOption) -> Result<CachedObject> {
        let data = self.get_data(file, option.difference(FileOption::RAW))?;
        match self.ensure_object_factory(file)? {
            Some(factory) => factory.create(self, file, data),
            None => Ok(Arc::new(data)),
        }
    }

    /// Decide which typed factory applies to an entry without creating the
    /// object.
    ///
    /// The extension map is consulted first, then the content sniffers over
    /// the entry's leading bytes. The answer is cached on the entry; read
    /// failures are not.
    pub fn ensure_object_factory(&self, file: &FileSource) -> Result<Option<Arc<dyn ObjectFactory>>> {
        if let Some(factory) = file.object_factory.get() {
            return Ok(factory.clone());
        }

        let objects = &self.state.objects;
        let factory = match file.extension().and_then(|ext| objects.by_extension(&ext).cloned()) {
            Some(factory) => Some(factory),
            None if objects.has_sniffers() && file.file_size > 0 => {
                let data = self.get_data(file, FileOption::RAW)?;
                objects.sniff(&data[..data.len().min(SNIFF_LEN)]).cloned()
            }
            None => None,
        };

        Ok(file.object_factory.get_or_init(|| factory).clone())
    }

    /// Whether entries may be read from several threads at once.
    pub fn supports_concurrent_read(&self) -> bool {
        let blob = self.blob.read();
        blob.as_ref().is_some_and(Blob::supports_concurrent_read) && self.binary.supports_concurrent_read()
    }

    /// File name of the archive. A nested archive is named after its entry;
    /// [`path`](Self::path) keeps the full `outer:entry` chain.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.state.path
    }

    #[inline]
    pub fn state(&self) -> &ArchiveState {
        &self.state
    }

    #[inline]
    pub fn game(&self) -> Option<&Arc<Game>> {
        self.state.game.as_ref()
    }

    /// Key material of the archive's game.
    pub fn key(&self) -> Option<&[u8]> {
        self.state.game.as_deref().and_then(Game::key)
    }

    #[inline]
    pub fn binary(&self) -> &Arc<dyn ArcBinary> {
        &self.binary
    }

    /// Format identifier of the bound strategy.
    pub fn format_id(&self) -> &'static str {
        self.binary.id()
    }
}

impl fmt::Debug for Archive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Archive")
            .field("name", &self.name)
            .field("format", &self.binary.id())
            .field("files", &self.table.get().map(|t| t.files.len()))
            .field("closed", &self.is_closed())
            .finish()
    }
}
