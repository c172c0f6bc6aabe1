//! Marker files written by a `MARKER` export and read back by import.
//!
//! ```text
//! <dest>/.set                          archive names and format ids
//! <dest>/<archive>.meta                ordered table of one archive
//! <dest>/<entry>/<entry name>.meta     table of a nested archive, stored
//!                                      next to its extracted contents
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use hoard_archive::{Archive, FileSource};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// File name of the archive-set manifest.
pub const SET_FILE: &str = ".set";

/// Extension of per-archive table manifests.
pub const META_EXTENSION: &str = "meta";

/// The archives written into one export directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetManifest {
    pub archives: Vec<SetEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetEntry {
    pub name: String,
    pub format: String,
}

/// The table of one exported archive, in table order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaManifest {
    pub archive: String,
    pub format: String,
    pub files: Vec<MetaEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaEntry {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    /// Format-specific compression selector of the source entry.
    #[serde(default)]
    pub compressed: u32,
    pub size: u64,
    /// Format id of a nested archive exported as a directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nested: Option<String>,
}

impl MetaManifest {
    /// Table of `archive` restricted to `files`, the entries that were
    /// actually exported.
    ///
    /// Nested entries record the format of their child archive when it has
    /// been opened.
    pub fn new<'f>(name: &str, archive: &Archive, files: impl IntoIterator<Item = &'f FileSource>) -> Self {
        Self {
            archive: name.to_string(),
            format: archive.format_id().to_string(),
            files: files.into_iter().map(MetaEntry::from_source).collect(),
        }
    }
}

impl MetaEntry {
    fn from_source(file: &FileSource) -> Self {
        Self {
            path: file.path.clone(),
            id: file.id,
            compressed: file.compressed,
            size: file.file_size,
            nested: file
                .sub_archive
                .as_ref()
                .and_then(|sub| sub.get())
                .map(|child| child.format_id().to_string()),
        }
    }
}

/// Path of the table manifest for an archive exported into `dir`.
pub fn meta_path(dir: &Path, archive_name: &str) -> PathBuf {
    dir.join(format!("{archive_name}.{META_EXTENSION}"))
}

pub(crate) fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_vec_pretty(value).map_err(|source| Error::Manifest {
        path: path.to_path_buf(),
        source,
    })?;
    fs::write(path, json)?;
    Ok(())
}

pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = fs::read(path)?;
    serde_json::from_slice(&bytes).map_err(|source| Error::Manifest {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_optional_fields_are_omitted() {
        let entry = MetaEntry {
            path: "maps/e1m1.bsp".into(),
            id: None,
            compressed: 0,
            size: 12,
            nested: None,
        };
        let json = serde_json::to_string(&entry).unwrap();
        assert_eq!(json, r#"{"path":"maps/e1m1.bsp","compressed":0,"size":12}"#);

        let parsed: MetaEntry = serde_json::from_str(r#"{"path":"a","size":1,"nested":"pak"}"#).unwrap();
        assert_eq!(parsed.nested.as_deref(), Some("pak"));
        assert_eq!(parsed.compressed, 0);
    }

    #[test]
    fn test_meta_path() {
        let path = meta_path(Path::new("out/sub/inner.pak"), "inner.pak");
        assert_eq!(path, Path::new("out/sub/inner.pak/inner.pak.meta"));
    }

    #[test]
    fn test_bad_manifest_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SET_FILE);
        fs::write(&path, b"{ not json").unwrap();
        match read_json::<SetManifest>(&path) {
            Err(Error::Manifest { path: reported, .. }) => assert_eq!(reported, path),
            other => panic!("unexpected {other:?}"),
        }
    }
}
