//! Hoard - game archive reading and extraction library.
//!
//! This crate provides a unified interface to the Hoard library ecosystem
//! for listing, extracting and repacking game asset containers.
//!
//! # Crates
//!
//! - [`hoard_common`] - Common utilities (binary reading, path normalization)
//! - [`hoard_codec`] - Decompression and ciphers (zlib, zstd, LZSS, blast, AES)
//! - [`hoard_archive`] - Archive model, format strategies, URI resolution
//! - [`hoard_export`] - Parallel export and import pipelines
//!
//! # Example
//!
//! ```no_run
//! use hoard::prelude::*;
//!
//! // Resolve a game URI against a family configuration
//! let family = FamilyConfig::load("bethesda.json")?;
//! let resolver = Resolver::new().with_family(family);
//! let opened = resolver.open("game:/Morrowind.bsa#Morrowind")?;
//!
//! // Extract every mesh
//! let options = ExportOptions::default().with_filter(Filter::glob("*.nif")?);
//! let report = Exporter::new(options).export_opened(&opened, "out")?;
//! println!("Exported {} files", report.stats.exported);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

// Re-export all sub-crates
pub use hoard_archive as archive;
pub use hoard_codec as codec;
pub use hoard_common as common;
pub use hoard_export as export;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use hoard_archive::{
        ArcBinary, Archive, ArchiveState, ArchiveUri, Blob, FamilyConfig, FileOption, FileSource,
        FormatRegistry, Game, GameConfig, MultiArchive, ObjectFactory, ObjectRegistry, Opened,
        Resolver,
    };
    pub use hoard_common::BinaryReader;
    pub use hoard_export::{
        ExportOptions, ExportReport, Exporter, FileFailure, Filter, ImportOptions, ImportReport,
        Importer,
    };
}

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
