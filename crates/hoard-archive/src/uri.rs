//! Archive URIs and their resolution.
//!
//! ```text
//! game:/Morrowind.bsa#Morrowind     install paths of a configured game
//! game:/Oblivion*.bsa#Oblivion      wildcard, opens every match
//! file:///data/paks/pak0.pak        local file
//! https://host/assets.zip           through a registered ByteProvider
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use hoard_common::path::has_wildcards;
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::{
    Archive, ArchiveState, Blob, Error, FamilyConfig, FormatRegistry, Game, MultiArchive,
    ObjectRegistry, Opened, ReadSeek, Result,
};

/// URI scheme.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scheme {
    Game,
    File,
    /// `http` or `https`.
    Http(String),
}

/// A parsed `scheme:/pattern#GameId` URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveUri {
    pub scheme: Scheme,
    /// Path pattern; for HTTP, the full URL without fragment.
    pub path: String,
    pub game: Option<String>,
}

impl ArchiveUri {
    /// Parse a URI. Strings without a scheme (or with a drive letter) are
    /// local paths.
    pub fn parse(uri: &str) -> Result<Self> {
        let (body, game) = match uri.rsplit_once('#') {
            Some((body, game)) if !game.is_empty() => (body, Some(game.to_string())),
            Some((body, _)) => (body, None),
            None => (uri, None),
        };

        let (scheme, rest, explicit) = match body.split_once(':') {
            Some((scheme, rest)) if scheme.len() > 1 => (scheme.to_ascii_lowercase(), rest, true),
            _ => ("file".to_string(), body, false),
        };

        let (scheme, path) = match scheme.as_str() {
            "game" => {
                if game.is_none() {
                    return Err(Error::InvalidUri(format!("{uri}: game URIs need a #GameId")));
                }
                (Scheme::Game, rest.trim_start_matches('/').to_string())
            }
            "file" if !explicit => (Scheme::File, body.to_string()),
            "file" => (Scheme::File, rest.strip_prefix("//").unwrap_or(rest).to_string()),
            "http" | "https" => (Scheme::Http(scheme.clone()), body.to_string()),
            _ => return Err(Error::UnsupportedScheme(scheme)),
        };

        if path.is_empty() {
            return Err(Error::InvalidUri(uri.to_string()));
        }
        Ok(Self { scheme, path, game })
    }
}

/// Opens remote archives as seekable streams.
pub trait ByteProvider: Send + Sync {
    fn open(&self, url: &str) -> Result<Box<dyn ReadSeek>>;
}

/// Turns URIs into opened archives.
#[derive(Clone)]
pub struct Resolver {
    games: FxHashMap<String, Arc<Game>>,
    formats: Arc<FormatRegistry>,
    objects: Arc<ObjectRegistry>,
    http: Option<Arc<dyn ByteProvider>>,
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new()
    }
}

impl Resolver {
    /// Resolver with the built-in formats and no games.
    pub fn new() -> Self {
        Self {
            games: FxHashMap::default(),
            formats: Arc::new(FormatRegistry::builtin()),
            objects: Arc::new(ObjectRegistry::default()),
            http: None,
        }
    }

    pub fn with_family(mut self, family: FamilyConfig) -> Self {
        for game in family.into_games() {
            self.games.insert(game.id().to_string(), game);
        }
        self
    }

    pub fn add_game(&mut self, game: Arc<Game>) -> &mut Self {
        self.games.insert(game.id().to_string(), game);
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

    pub fn with_http(mut self, provider: Arc<dyn ByteProvider>) -> Self {
        self.http = Some(provider);
        self
    }

    pub fn formats(&self) -> &Arc<FormatRegistry> {
        &self.formats
    }

    pub fn objects(&self) -> &Arc<ObjectRegistry> {
        &self.objects
    }

    pub fn game(&self, id: &str) -> Result<&Arc<Game>> {
        self.games
            .get(id)
            .ok_or_else(|| Error::UnknownGame(id.to_string()))
    }

    pub fn games(&self) -> impl Iterator<Item = &Arc<Game>> {
        self.games.values()
    }

    /// Parse and open a URI. Tables are read before returning.
    pub fn open(&self, uri: &str) -> Result<Opened> {
        self.open_uri(&ArchiveUri::parse(uri)?)
    }

    pub fn open_uri(&self, uri: &ArchiveUri) -> Result<Opened> {
        let game = uri.game.as_deref().map(|id| self.game(id)).transpose()?;

        match &uri.scheme {
            Scheme::Http(scheme) => {
                let provider = self
                    .http
                    .as_ref()
                    .ok_or_else(|| Error::UnsupportedScheme(scheme.clone()))?;
                let blob = Blob::from_stream(provider.open(&uri.path)?)?;
                let archive = Archive::from_blob(self.state(&uri.path, game), blob)?;
                archive.open()?;
                Ok(Opened::Single(Arc::new(archive)))
            }
            Scheme::Game => {
                let game = game.ok_or_else(|| Error::InvalidUri(uri.path.clone()))?;
                let roots: Vec<&Path> = game.paths().iter().map(PathBuf::as_path).collect();
                self.open_matches(uri, &roots, Some(game), game.id())
            }
            Scheme::File => self.open_matches(uri, &[Path::new("")], game, "file system"),
        }
    }

    fn open_matches(
        &self,
        uri: &ArchiveUri,
        roots: &[&Path],
        game: Option<&Arc<Game>>,
        location: &str,
    ) -> Result<Opened> {
        let wildcard = has_wildcards(&uri.path);
        let mut matches = Vec::new();

        for root in roots {
            let candidate = root.join(&uri.path);
            if wildcard {
                for entry in glob::glob(&candidate.to_string_lossy())? {
                    matches.push(entry.map_err(glob::GlobError::into_error)?);
                }
            } else if candidate.is_file() {
                matches.push(candidate);
            }
        }
        matches.sort();
        matches.dedup();

        if matches.is_empty() {
            return Err(Error::FileNotFound {
                path: uri.path.clone(),
                archive: location.to_string(),
            });
        }
        debug!(pattern = %uri.path, matches = matches.len(), "Resolved archive URI");

        if !wildcard {
            let archive = Archive::from_path(self.state(&matches[0], game))?;
            archive.open()?;
            return Ok(Opened::Single(Arc::new(archive)));
        }

        let archives = matches
            .iter()
            .map(|path| {
                let archive = Archive::from_path(self.state(path, game))?;
                archive.open()?;
                Ok(Arc::new(archive))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Opened::Multi(MultiArchive::new(uri.path.clone(), archives)))
    }

    fn state(&self, path: impl Into<PathBuf>, game: Option<&Arc<Game>>) -> ArchiveState {
        let state = ArchiveState::new(path)
            .with_formats(Arc::clone(&self.formats))
            .with_objects(Arc::clone(&self.objects));
        match game {
            Some(game) => state.with_game(Arc::clone(game)),
            None => state,
        }
    }
}
