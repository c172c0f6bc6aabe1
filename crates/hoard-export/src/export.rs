//! Parallel export of archive contents to a directory tree.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use hoard_archive::{Archive, FileOption, FileSource, Opened};
use hoard_common::path;
use parking_lot::Mutex;
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use tracing::{debug, info, warn};

use crate::manifest::{self, MetaManifest, SetEntry, SetManifest, SET_FILE};
use crate::{Error, ExportOptions, Result};

/// Progress callback: `(done, total, path)`. `total` grows while nested
/// archives are discovered.
pub type ProgressFn = dyn Fn(usize, usize, &str) + Send + Sync;

/// Called once for every isolated per-file failure.
pub type FailureFn = dyn Fn(&FileFailure) + Send + Sync;

/// One file that could not be processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFailure {
    /// Archive holding the entry.
    pub archive: String,
    pub path: String,
    pub message: String,
}

impl fmt::Display for FileFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}: {}", self.archive, self.path, self.message)
    }
}

/// Counters of an export run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExportStats {
    /// Files written.
    pub exported: usize,
    /// Zero-size entries, which produce no output.
    pub skipped: usize,
    pub failed: usize,
    /// Entries selected by the filter, over all nesting levels.
    pub total: usize,
}

impl ExportStats {
    /// Check if every selected file was handled without error.
    pub fn is_complete(&self) -> bool {
        self.failed == 0 && self.exported + self.skipped == self.total
    }
}

/// Outcome of an export run.
#[derive(Debug, Clone, Default)]
pub struct ExportReport {
    pub stats: ExportStats,
    /// Sorted by archive, then path.
    pub failures: Vec<FileFailure>,
}

/// Writes every selected entry of one or more archives below a
/// destination directory.
///
/// Entries land at `<dest>/<path>`; the contents of a nested archive land
/// below `<dest>/<entry path>/`. A failing entry is reported and the rest
/// of the archive is still exported.
///
/// # Example
///
/// ```no_run
/// use hoard_archive::Archive;
/// use hoard_export::{ExportOptions, Exporter, Filter};
///
/// let archive = Archive::load("Morrowind.bsa")?;
/// let options = ExportOptions::default().with_filter(Filter::glob("*.nif")?);
/// let report = Exporter::new(options).export(&archive, "out")?;
/// println!("{} exported, {} failed", report.stats.exported, report.stats.failed);
/// # Ok::<(), hoard_export::Error>(())
/// ```
pub struct Exporter {
    options: ExportOptions,
    progress: Option<Box<ProgressFn>>,
    on_failure: Option<Box<FailureFn>>,
}

impl Exporter {
    pub fn new(options: ExportOptions) -> Self {
        Self {
            options,
            progress: None,
            on_failure: None,
        }
    }

    pub fn on_progress<F>(mut self, f: F) -> Self
    where
        F: Fn(usize, usize, &str) + Send + Sync + 'static,
    {
        self.progress = Some(Box::new(f));
        self
    }

    pub fn on_failure<F>(mut self, f: F) -> Self
    where
        F: Fn(&FileFailure) + Send + Sync + 'static,
    {
        self.on_failure = Some(Box::new(f));
        self
    }

    pub fn options(&self) -> &ExportOptions {
        &self.options
    }

    /// Export one archive.
    pub fn export<P: AsRef<Path>>(&self, archive: &Archive, dest: P) -> Result<ExportReport> {
        self.run(&[archive], dest.as_ref())
    }

    /// Export everything a URI resolved to. Archives of a wildcard set are
    /// written into the same tree; later archives overwrite equal paths.
    pub fn export_opened<P: AsRef<Path>>(&self, opened: &Opened, dest: P) -> Result<ExportReport> {
        let archives: Vec<&Archive> = opened.archives().iter().map(Arc::as_ref).collect();
        self.run(&archives, dest.as_ref())
    }

    fn run(&self, archives: &[&Archive], dest: &Path) -> Result<ExportReport> {
        // Table errors are fatal and surface before any output is written.
        for archive in archives {
            archive.open()?;
        }
        fs::create_dir_all(dest)?;

        let workers = self.options.workers.max(1);
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("hoard-export-{i}"))
            .build()?;

        let walk = Walk::new(self);
        let kept: Vec<Vec<&FileSource>> = pool.install(|| {
            archives
                .iter()
                .map(|archive| {
                    debug!(archive = archive.name(), workers, "Exporting archive");
                    walk.archive(archive, dest)
                })
                .collect()
        });

        if self.options.option.contains(FileOption::MARKER) {
            let mut set = SetManifest::default();
            for (archive, kept) in archives.iter().zip(kept) {
                let meta = MetaManifest::new(archive.name(), archive, kept);
                manifest::write_json(&manifest::meta_path(dest, archive.name()), &meta)?;
                set.archives.push(SetEntry {
                    name: archive.name().to_string(),
                    format: archive.format_id().to_string(),
                });
            }
            manifest::write_json(&dest.join(SET_FILE), &set)?;
        }

        let report = walk.finish();
        info!(
            exported = report.stats.exported,
            skipped = report.stats.skipped,
            failed = report.stats.failed,
            total = report.stats.total,
            "Export finished"
        );
        Ok(report)
    }
}

impl fmt::Debug for Exporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Exporter")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

enum Outcome {
    Exported,
    Skipped,
}

/// State shared by the workers of one run.
struct Walk<'a> {
    exporter: &'a Exporter,
    exported: AtomicUsize,
    skipped: AtomicUsize,
    failed: AtomicUsize,
    total: AtomicUsize,
    failures: Mutex<Vec<FileFailure>>,
}

impl<'a> Walk<'a> {
    fn new(exporter: &'a Exporter) -> Self {
        Self {
            exporter,
            exported: AtomicUsize::new(0),
            skipped: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            total: AtomicUsize::new(0),
            failures: Mutex::new(Vec::new()),
        }
    }

    fn option(&self) -> FileOption {
        self.exporter.options.option
    }

    /// Export every entry of `archive` below `dir`.
    ///
    /// Returns the entries a later import can find on disk, in table order:
    /// written files, zero-size entries and nested archives with at least
    /// one such entry. Filtered and failed entries are left out.
    fn archive<'f>(&self, archive: &'f Archive, dir: &Path) -> Vec<&'f FileSource> {
        let files = match archive.files() {
            Ok(files) => files,
            Err(e) => {
                self.fail(archive, "", e);
                return Vec::new();
            }
        };

        let visit = |file: &FileSource| {
            if file.is_nested() {
                self.nested(archive, file, dir)
            } else {
                self.leaf(archive, file, dir)
            }
        };

        if archive.supports_concurrent_read() {
            files.par_iter().filter(|file| visit(*file)).collect()
        } else {
            debug!(archive = archive.name(), "Archive does not support concurrent reads, exporting sequentially");
            files.iter().filter(|file| visit(*file)).collect()
        }
    }

    fn nested(&self, archive: &Archive, file: &FileSource, dir: &Path) -> bool {
        let child = match archive.sub_archive(file) {
            Ok(child) => child,
            Err(e) => {
                debug!(archive = archive.name(), path = %file.path, error = %e, "Entry is not a readable archive, exporting it as a file");
                return self.leaf(archive, file, dir);
            }
        };
        let child_dir = match output_path(dir, &file.path) {
            Ok(child_dir) => child_dir,
            Err(e) => {
                self.fail(archive, &file.path, e);
                return false;
            }
        };

        let kept = self.archive(child, &child_dir);
        if kept.is_empty() {
            return false;
        }

        if self.option().contains(FileOption::MARKER) {
            let name = path::file_name(&file.path);
            let meta = MetaManifest::new(name, child, kept);
            if let Err(e) = manifest::write_json(&manifest::meta_path(&child_dir, name), &meta) {
                self.fail(archive, &file.path, e);
                return false;
            }
        }
        true
    }

    fn leaf(&self, archive: &Archive, file: &FileSource, dir: &Path) -> bool {
        if let Some(filter) = &self.exporter.options.filter {
            if !filter.matches(&file.path) {
                return false;
            }
        }
        self.total.fetch_add(1, Ordering::Relaxed);

        let kept = match self.export_file(archive, file, dir) {
            Ok(Outcome::Exported) => {
                self.exported.fetch_add(1, Ordering::Relaxed);
                true
            }
            Ok(Outcome::Skipped) => {
                self.skipped.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(e) => {
                self.fail(archive, &file.path, e);
                false
            }
        };

        if let Some(progress) = &self.exporter.progress {
            let done = self.exported.load(Ordering::Relaxed)
                + self.skipped.load(Ordering::Relaxed)
                + self.failed.load(Ordering::Relaxed);
            progress(done, self.total.load(Ordering::Relaxed), &file.path);
        }
        kept
    }

    fn export_file(&self, archive: &Archive, file: &FileSource, dir: &Path) -> Result<Outcome> {
        if file.file_size == 0 {
            return Ok(Outcome::Skipped);
        }
        let target = output_path(dir, &file.path)?;
        let data = self.payload(archive, file)?;

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&target, data)?;
        Ok(Outcome::Exported)
    }

    /// Bytes to write for an entry.
    ///
    /// Without `OBJECT`, or with `RAW`, this is the entry's data. Otherwise
    /// the hint flags of the entry's factory pick the path:
    ///
    /// | factory option | output |
    /// |----------------|--------|
    /// | `STREAM_OBJECT` | entry data, the object is not built |
    /// | `BINARY_OBJECT` | serialized object; a factory without a serializer is an error |
    /// | `UNKNOWN_FILE_MODEL` | serialized object, entry data if serialization is missing or fails |
    /// | none of these | serialized object if the factory has a serializer, entry data otherwise |
    fn payload(&self, archive: &Archive, file: &FileSource) -> Result<Vec<u8>> {
        let option = self.option();
        if !option.contains(FileOption::OBJECT) || option.contains(FileOption::RAW) {
            return Ok(archive.get_data(file, option)?);
        }
        let Some(factory) = archive.ensure_object_factory(file)? else {
            return Ok(archive.get_data(file, option)?);
        };

        let hint = factory.option();
        if hint.contains(FileOption::STREAM_OBJECT) {
            return Ok(archive.get_data(file, option)?);
        }

        let object = archive.get_object(file, option)?;
        match factory.serialize(&object) {
            Some(Ok(bytes)) => Ok(bytes),
            Some(Err(e)) if hint.contains(FileOption::UNKNOWN_FILE_MODEL) => {
                debug!(path = %file.path, error = %e, "Object did not serialize, exporting entry data");
                Ok(archive.get_data(file, option)?)
            }
            Some(Err(e)) => Err(e.into()),
            None if hint.contains(FileOption::BINARY_OBJECT) => Err(hoard_archive::Error::Object {
                path: file.path.clone(),
                message: "factory declares a binary object but has no serializer".to_string(),
            }
            .into()),
            None => Ok(archive.get_data(file, option)?),
        }
    }

    fn fail(&self, archive: &Archive, path: &str, error: impl fmt::Display) {
        let failure = FileFailure {
            archive: archive.name().to_string(),
            path: path.to_string(),
            message: error.to_string(),
        };
        warn!(archive = %failure.archive, path = %failure.path, error = %failure.message, "Failed to export file");

        self.failed.fetch_add(1, Ordering::Relaxed);
        if let Some(on_failure) = &self.exporter.on_failure {
            on_failure(&failure);
        }
        self.failures.lock().push(failure);
    }

    fn finish(self) -> ExportReport {
        let mut failures = self.failures.into_inner();
        failures.sort_by(|a, b| (&a.archive, &a.path).cmp(&(&b.archive, &b.path)));
        ExportReport {
            stats: ExportStats {
                exported: self.exported.into_inner(),
                skipped: self.skipped.into_inner(),
                failed: self.failed.into_inner(),
                total: self.total.into_inner(),
            },
            failures,
        }
    }
}

/// Destination of an archive path below `dir`.
///
/// Empty, `.` and `..` segments are dropped so that no entry can escape the
/// destination.
pub(crate) fn output_path(dir: &Path, entry: &str) -> Result<PathBuf> {
    let mut out = dir.to_path_buf();
    let mut pushed = false;
    for segment in entry.split(['/', '\\']) {
        if matches!(segment, "" | "." | "..") {
            continue;
        }
        out.push(segment);
        pushed = true;
    }
    if pushed {
        Ok(out)
    } else {
        Err(Error::InvalidPath(entry.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_path_stays_below_destination() {
        let dir = Path::new("out");
        assert_eq!(output_path(dir, "meshes/a.nif").unwrap(), Path::new("out/meshes/a.nif"));
        assert_eq!(output_path(dir, "../../etc/passwd").unwrap(), Path::new("out/etc/passwd"));
        assert_eq!(output_path(dir, r"textures\b.dds").unwrap(), Path::new("out/textures/b.dds"));
        assert!(matches!(output_path(dir, "../.."), Err(Error::InvalidPath(_))));
    }

    #[test]
    fn test_stats_completeness() {
        let stats = ExportStats {
            exported: 3,
            skipped: 1,
            failed: 0,
            total: 4,
        };
        assert!(stats.is_complete());
        assert!(!ExportStats { failed: 1, ..stats }.is_complete());
    }
}
