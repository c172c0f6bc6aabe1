//! Family and game configuration.
//!
//! A family file lists the games of one studio together with the parameters
//! the archive layer needs: engine name, key material, editions and install
//! paths.
//!
//! ```json
//! {
//!   "id": "Bethesda",
//!   "name": "Bethesda Game Studios",
//!   "games": [
//!     { "id": "Morrowind", "name": "The Elder Scrolls III", "engine": "Bethesda",
//!       "paths": ["C:/Games/Morrowind/Data Files"] }
//!   ]
//! }
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{ArcBinary, Error, Result};

/// One family configuration document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FamilyConfig {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub games: Vec<GameConfig>,
}

/// Configuration of one game.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GameConfig {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Engine name used for format selection.
    pub engine: String,
    /// Key material, hex encoded.
    #[serde(default, with = "hex_key", skip_serializing_if = "Option::is_none")]
    pub key: Option<Vec<u8>>,
    #[serde(default)]
    pub editions: Vec<String>,
    /// Install directories searched by `game:` URIs.
    #[serde(default)]
    pub paths: Vec<PathBuf>,
}

impl FamilyConfig {
    /// Parse a family document.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a family document from disk.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Build the runtime game contexts.
    pub fn into_games(self) -> Vec<Arc<Game>> {
        self.games
            .into_iter()
            .map(|config| Arc::new(Game::new(config)))
            .collect()
    }
}

/// Runtime context of one game.
///
/// Owns the cache of format strategies built for this game's key and
/// engine. The cache lives exactly as long as the game, or until
/// [`clear_cache`](Self::clear_cache).
pub struct Game {
    config: GameConfig,
    binaries: Mutex<FxHashMap<&'static str, Arc<dyn ArcBinary>>>,
}

impl Game {
    pub fn new(config: GameConfig) -> Self {
        Self {
            config,
            binaries: Mutex::new(FxHashMap::default()),
        }
    }

    #[inline]
    pub fn id(&self) -> &str {
        &self.config.id
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.config.name
    }

    #[inline]
    pub fn engine(&self) -> &str {
        &self.config.engine
    }

    #[inline]
    pub fn key(&self) -> Option<&[u8]> {
        self.config.key.as_deref()
    }

    #[inline]
    pub fn editions(&self) -> &[String] {
        &self.config.editions
    }

    #[inline]
    pub fn paths(&self) -> &[PathBuf] {
        &self.config.paths
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    /// Get the cached strategy for a format, building it on first use.
    pub fn cached_binary<F>(&self, format: &'static str, create: F) -> Result<Arc<dyn ArcBinary>>
    where
        F: FnOnce() -> Result<Arc<dyn ArcBinary>>,
    {
        let mut binaries = self.binaries.lock();
        if let Some(binary) = binaries.get(format) {
            return Ok(Arc::clone(binary));
        }
        let binary = create()?;
        debug!(game = %self.config.id, format, "Created format strategy");
        binaries.insert(format, Arc::clone(&binary));
        Ok(binary)
    }

    /// Number of cached strategies.
    pub fn cached_count(&self) -> usize {
        self.binaries.lock().len()
    }

    /// Drop every cached strategy.
    pub fn clear_cache(&self) {
        self.binaries.lock().clear();
    }

    /// Key material or a `MissingKey` error for the named format.
    pub fn require_key(game: Option<&Game>, format: &'static str) -> Result<Vec<u8>> {
        game.and_then(Game::key)
            .map(<[u8]>::to_vec)
            .ok_or_else(|| Error::MissingKey {
                format,
                game: game.map(|g| g.id().to_string()),
            })
    }
}

impl fmt::Debug for Game {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Game")
            .field("id", &self.config.id)
            .field("engine", &self.config.engine)
            .field("key", &self.config.key.as_ref().map(|k| k.len()))
            .field("cached", &self.cached_count())
            .finish()
    }
}

mod hex_key {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(key: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error> {
        match key {
            Some(key) => serializer.serialize_str(&hex::encode(key)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error> {
        let text: Option<String> = Option::deserialize(deserializer)?;
        text.map(|s| hex::decode(s.trim()).map_err(serde::de::Error::custom))
            .transpose()
    }
}
