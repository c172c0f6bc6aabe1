//! Bulk export and import for Hoard archives.
//!
//! [`Exporter`] walks an archive, descending into nested archives, and
//! writes every selected entry below a destination directory on a bounded
//! worker pool. [`Importer`] turns a tree exported with
//! [`FileOption::MARKER`](hoard_archive::FileOption::MARKER) back into
//! archives for formats that can be written.
//!
//! Both pipelines isolate per-file failures: a corrupt entry is reported
//! through [`FileFailure`] and the remaining files are still processed.
//! Only errors that affect a whole run (an unreadable table, an unwritable
//! destination) are returned as [`Error`].

mod error;
mod export;
mod filter;
mod import;
mod options;

pub mod manifest;

pub use error::{Error, Result};
pub use export::{ExportReport, ExportStats, Exporter, FailureFn, FileFailure, ProgressFn};
pub use filter::Filter;
pub use import::{ImportReport, ImportStats, Importer};
pub use options::{ExportOptions, ImportOptions, DEFAULT_WORKERS};
