//! Several archives presented as one.

use std::slice;
use std::sync::Arc;

use crate::{Archive, Error, FileOption, FileSource, Result};

/// An ordered set of archives, typically a wildcard match such as
/// `Oblivion*.bsa`. Lookups go to the first archive that has the path.
#[derive(Debug, Clone)]
pub struct MultiArchive {
    name: String,
    archives: Vec<Arc<Archive>>,
}

impl MultiArchive {
    pub fn new(name: impl Into<String>, archives: Vec<Arc<Archive>>) -> Self {
        Self {
            name: name.into(),
            archives,
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn archives(&self) -> &[Arc<Archive>] {
        &self.archives
    }

    /// Open every child archive.
    pub fn open(&self) -> Result<()> {
        self.archives.iter().try_for_each(|a| a.open())
    }

    pub fn contains(&self, path: &str) -> bool {
        self.archives.iter().any(|a| a.contains(path))
    }

    /// Resolve a path in the first archive that has it.
    ///
    /// Errors other than "not found" stop the search.
    pub fn get_source(&self, path: &str) -> Result<(&Archive, &FileSource)> {
        for archive in &self.archives {
            match archive.get_source(path) {
                Ok(found) => return Ok(found),
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e),
            }
        }
        Err(Error::FileNotFound {
            path: path.to_string(),
            archive: self.name.clone(),
        })
    }

    pub fn find_source(&self, path: &str) -> Option<(&Archive, &FileSource)> {
        self.archives.iter().find_map(|a| a.find_source(path))
    }

    pub fn get_data_at(&self, path: &str, option: FileOption) -> Result<Vec<u8>> {
        let (owner, file) = self.get_source(path)?;
        owner.get_data(file, option)
    }

    /// Total number of entries over all archives.
    pub fn file_count(&self) -> Result<usize> {
        self.archives
            .iter()
            .map(|a| a.files().map(<[FileSource]>::len))
            .sum()
    }

    pub fn close(&self) {
        for archive in &self.archives {
            archive.close();
        }
    }
}

/// Result of resolving an archive URI.
#[derive(Debug, Clone)]
pub enum Opened {
    Single(Arc<Archive>),
    Multi(MultiArchive),
}

impl Opened {
    pub fn name(&self) -> &str {
        match self {
            Self::Single(archive) => archive.name(),
            Self::Multi(multi) => multi.name(),
        }
    }

    /// The archives, in lookup order.
    pub fn archives(&self) -> &[Arc<Archive>] {
        match self {
            Self::Single(archive) => slice::from_ref(archive),
            Self::Multi(multi) => multi.archives(),
        }
    }

    pub fn contains(&self, path: &str) -> bool {
        self.archives().iter().any(|a| a.contains(path))
    }

    pub fn get_source(&self, path: &str) -> Result<(&Archive, &FileSource)> {
        match self {
            Self::Single(archive) => archive.get_source(path),
            Self::Multi(multi) => multi.get_source(path),
        }
    }

    pub fn find_source(&self, path: &str) -> Option<(&Archive, &FileSource)> {
        self.archives().iter().find_map(|a| a.find_source(path))
    }

    pub fn get_data_at(&self, path: &str, option: FileOption) -> Result<Vec<u8>> {
        let (owner, file) = self.get_source(path)?;
        owner.get_data(file, option)
    }

    pub fn close(&self) {
        for archive in self.archives() {
            archive.close();
        }
    }
}
