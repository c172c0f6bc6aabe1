//! Pipeline options.

use hoard_archive::FileOption;

use crate::Filter;

/// Default degree of parallelism. Many readers are not worth sharing
/// across more threads than this.
pub const DEFAULT_WORKERS: usize = 4;

/// Options for [`Exporter`](crate::Exporter).
#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// `MARKER` writes manifests, `OBJECT` re-serializes typed objects,
    /// `RAW` copies primary payloads only.
    pub option: FileOption,
    pub workers: usize,
    pub filter: Option<Filter>,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            option: FileOption::DEFAULT,
            workers: DEFAULT_WORKERS,
            filter: None,
        }
    }
}

impl ExportOptions {
    pub fn with_option(mut self, option: FileOption) -> Self {
        self.option = option;
        self
    }

    /// Worker threads; zero is treated as one.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }
}

/// Options for [`Importer`](crate::Importer).
#[derive(Debug, Clone)]
pub struct ImportOptions {
    pub workers: usize,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
        }
    }
}

impl ImportOptions {
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }
}
