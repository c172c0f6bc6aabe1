//! Archive abstraction for game asset containers.
//!
//! Dozens of unrelated container layouts share one model:
//!
//! - [`FileSource`] - one table entry, with optional split [`parts`](FileSource::parts)
//!   and an optional nested [`SubArchive`]
//! - [`ArcBinary`] - the per-format strategy that reads a table and one
//!   entry's bytes (and optionally writes them back)
//! - [`Archive`] - the facade over one opened container: path index,
//!   typed-object cache, nested resolution
//! - [`MultiArchive`] - several archives presented as one
//! - [`Resolver`] - turns `game:/Morrowind.bsa#Morrowind` style URIs into
//!   opened archives
//!
//! # Example
//!
//! ```no_run
//! use hoard_archive::{Archive, FileOption};
//!
//! let archive = Archive::load("Morrowind.bsa")?;
//!
//! for file in archive.files()? {
//!     println!("{}: {} bytes", file.path, file.file_size);
//! }
//!
//! let (owner, file) = archive.get_source("meshes/x/ex_common_balcony_01.nif")?;
//! let data = owner.get_data(file, FileOption::DEFAULT)?;
//! # Ok::<(), hoard_archive::Error>(())
//! ```

mod archive;
mod binary;
mod blob;
mod error;
mod family;
mod format;
mod multi;
mod object;
mod source;
mod uri;

pub mod formats;

pub use archive::{Archive, ArchiveState};
pub use binary::{ArcBinary, WriteSeek};
pub use blob::{Blob, ReadSeek};
pub use error::{Error, Result};
pub use family::{FamilyConfig, Game, GameConfig};
pub use format::{BinaryConstructor, Format, FormatRegistry};
pub use multi::{MultiArchive, Opened};
pub use object::{
    CachedObject, FactoryFn, FileOption, ObjectFactory, ObjectRegistry, Sniffer, SNIFF_LEN,
};
pub use source::{FileSource, SubArchive, Tag};
pub use uri::{ArchiveUri, ByteProvider, Resolver, Scheme};
