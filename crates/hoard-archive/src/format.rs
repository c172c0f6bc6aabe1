//! Format descriptors and strategy selection.

use std::fmt;
use std::sync::Arc;

use hoard_common::path;
use tracing::debug;

use crate::formats::{bsa, danae, pak, zip};
use crate::{ArcBinary, Error, Game, Result};

/// Builds a strategy, optionally for a specific game's key and engine.
pub type BinaryConstructor = fn(Option<&Game>) -> Result<Arc<dyn ArcBinary>>;

/// A registered archive format.
#[derive(Clone)]
pub struct Format {
    pub id: &'static str,
    /// Lowercase extensions without the dot.
    pub extensions: &'static [&'static str],
    /// Engine names that use this format.
    pub engines: &'static [&'static str],
    /// Leading bytes every archive of this format starts with.
    pub magic: Option<&'static [u8]>,
    pub create: BinaryConstructor,
}

impl Format {
    /// Get the strategy, through the game's cache when a game is given.
    pub fn binary(&self, game: Option<&Game>) -> Result<Arc<dyn ArcBinary>> {
        match game {
            Some(game) => game.cached_binary(self.id, || (self.create)(Some(game))),
            None => (self.create)(None),
        }
    }

    fn handles_extension(&self, extension: &str) -> bool {
        self.extensions.contains(&extension)
    }

    fn handles_engine(&self, engine: &str) -> bool {
        self.engines.iter().any(|e| e.eq_ignore_ascii_case(engine))
    }

    fn matches_magic(&self, head: &[u8]) -> bool {
        self.magic.is_some_and(|magic| head.starts_with(magic))
    }
}

impl fmt::Debug for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Format")
            .field("id", &self.id)
            .field("extensions", &self.extensions)
            .field("engines", &self.engines)
            .finish()
    }
}

/// Ordered set of formats.
#[derive(Debug, Clone, Default)]
pub struct FormatRegistry {
    formats: Vec<Format>,
}

impl FormatRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in format.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry
            .register(zip::FORMAT)
            .register(bsa::FORMAT)
            .register(pak::FORMAT)
            .register(danae::FORMAT);
        registry
    }

    /// Add a format. Earlier registrations win ties.
    pub fn register(&mut self, format: Format) -> &mut Self {
        self.formats.push(format);
        self
    }

    pub fn get(&self, id: &str) -> Option<&Format> {
        self.formats.iter().find(|f| f.id == id)
    }

    pub fn formats(&self) -> &[Format] {
        &self.formats
    }

    /// Formats registered for an extension, in registration order.
    pub fn by_extension(&self, extension: &str) -> impl Iterator<Item = &Format> + '_ {
        let extension = extension.to_ascii_lowercase();
        self.formats
            .iter()
            .filter(move |f| f.handles_extension(&extension))
    }

    /// Pick the format for an archive.
    ///
    /// In order: an extension candidate used by the engine, any format whose
    /// magic matches `head`, then the first extension candidate (preferring
    /// one without magic, since a magic-bearing candidate already failed the
    /// content check when `head` is non-empty).
    pub fn select(&self, archive_path: &str, engine: Option<&str>, head: &[u8]) -> Result<&Format> {
        let extension = path::extension(archive_path).unwrap_or_default();
        let candidates: Vec<&Format> = self.by_extension(&extension).collect();

        let by_engine = engine.and_then(|engine| candidates.iter().copied().find(|f| f.handles_engine(engine)));
        let by_magic = || self.formats.iter().find(|f| f.matches_magic(head));
        let by_extension = || {
            candidates
                .iter()
                .copied()
                .find(|f| head.is_empty() || f.magic.is_none())
                .or_else(|| candidates.first().copied())
        };

        let format = by_engine
            .or_else(by_magic)
            .or_else(by_extension)
            .ok_or_else(|| Error::UnknownFormat {
                path: archive_path.to_string(),
                engine: engine.map(str::to_string),
            })?;

        debug!(path = archive_path, engine, format = format.id, "Selected archive format");
        Ok(format)
    }
}
