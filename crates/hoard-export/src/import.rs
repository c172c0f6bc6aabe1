//! Rebuilding archives from an exported tree.

use std::collections::HashMap;
use std::fmt;
use std::fs::{self, File};
use std::io::{BufWriter, Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use hoard_archive::{ArcBinary, FileSource, FormatRegistry, Game, WriteSeek};
use hoard_common::path;
use parking_lot::Mutex;
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use tracing::{debug, info, warn};

use crate::export::{output_path, FailureFn};
use crate::manifest::{self, MetaEntry, MetaManifest, SetManifest, SET_FILE};
use crate::{FileFailure, ImportOptions, Result};

/// Counters of an import run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportStats {
    /// Files packed into an archive.
    pub imported: usize,
    pub failed: usize,
    /// Files listed by the manifests, over all nesting levels.
    pub total: usize,
}

/// Outcome of an import run.
#[derive(Debug, Clone, Default)]
pub struct ImportReport {
    pub stats: ImportStats,
    /// Archives written, in manifest order.
    pub archives: Vec<PathBuf>,
    /// Sorted by archive, then path. An archive that could not be built at
    /// all is reported with an empty path.
    pub failures: Vec<FileFailure>,
}

/// Packs a `MARKER` export back into archives.
///
/// Reads `<source>/.set` and the `.meta` table of every archive it lists,
/// loads the payloads in parallel and writes `<dest>/<archive name>` through
/// the format's writer. Nested archives recorded in a table are rebuilt from
/// their directories first. Files that cannot be loaded are reported and
/// left out of the rebuilt archive.
pub struct Importer {
    options: ImportOptions,
    formats: Arc<FormatRegistry>,
    game: Option<Arc<Game>>,
    on_failure: Option<Box<FailureFn>>,
}

impl Importer {
    pub fn new(options: ImportOptions) -> Self {
        Self {
            options,
            formats: Arc::new(FormatRegistry::builtin()),
            game: None,
            on_failure: None,
        }
    }

    pub fn with_formats(mut self, formats: Arc<FormatRegistry>) -> Self {
        self.formats = formats;
        self
    }

    /// Game whose key material the writers receive.
    pub fn with_game(mut self, game: Arc<Game>) -> Self {
        self.game = Some(game);
        self
    }

    pub fn on_failure<F>(mut self, f: F) -> Self
    where
        F: Fn(&FileFailure) + Send + Sync + 'static,
    {
        self.on_failure = Some(Box::new(f));
        self
    }

    pub fn import<S: AsRef<Path>, D: AsRef<Path>>(&self, source: S, dest: D) -> Result<ImportReport> {
        let (source, dest) = (source.as_ref(), dest.as_ref());
        let set: SetManifest = manifest::read_json(&source.join(SET_FILE))?;
        fs::create_dir_all(dest)?;

        let pool = ThreadPoolBuilder::new()
            .num_threads(self.options.workers.max(1))
            .thread_name(|i| format!("hoard-import-{i}"))
            .build()?;

        let pack = Pack::new(self);
        let mut archives = Vec::with_capacity(set.archives.len());
        for entry in &set.archives {
            let target = match output_path(dest, &entry.name) {
                Ok(target) => target,
                Err(e) => {
                    pack.fail(&entry.name, "", e);
                    continue;
                }
            };
            match pool.install(|| pack.write_archive(source, &entry.name, &entry.format, &target)) {
                Ok(()) => archives.push(target),
                Err(e) => pack.fail(&entry.name, "", e),
            }
        }

        let report = pack.finish(archives);
        info!(
            archives = report.archives.len(),
            imported = report.stats.imported,
            failed = report.stats.failed,
            "Import finished"
        );
        Ok(report)
    }
}

impl fmt::Debug for Importer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Importer")
            .field("options", &self.options)
            .field("game", &self.game.as_deref().map(Game::id))
            .finish_non_exhaustive()
    }
}

struct Pack<'a> {
    importer: &'a Importer,
    imported: AtomicUsize,
    failed: AtomicUsize,
    total: AtomicUsize,
    failures: Mutex<Vec<FileFailure>>,
}

impl<'a> Pack<'a> {
    fn new(importer: &'a Importer) -> Self {
        Self {
            importer,
            imported: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            total: AtomicUsize::new(0),
            failures: Mutex::new(Vec::new()),
        }
    }

    fn writer(&self, format: &str) -> Result<Arc<dyn ArcBinary>> {
        let descriptor = self.importer.formats.get(format).ok_or_else(|| {
            hoard_archive::Error::UnknownFormat {
                path: format.to_string(),
                engine: None,
            }
        })?;
        let binary = descriptor.binary(self.importer.game.as_deref())?;
        if !binary.supports_write() {
            return Err(hoard_archive::Error::WriteUnsupported(descriptor.id).into());
        }
        Ok(binary)
    }

    fn write_archive(&self, dir: &Path, name: &str, format: &str, target: &Path) -> Result<()> {
        // Resolve the writer before creating the output file.
        let binary = self.writer(format)?;
        let mut out = BufWriter::new(File::create(target)?);
        self.build(&binary, dir, name, &mut out)?;
        debug!(archive = name, format, "Wrote archive");
        Ok(())
    }

    fn build(&self, binary: &Arc<dyn ArcBinary>, dir: &Path, name: &str, out: &mut dyn WriteSeek) -> Result<()> {
        let meta: MetaManifest = manifest::read_json(&manifest::meta_path(dir, name))?;
        self.total
            .fetch_add(meta.files.iter().filter(|e| e.nested.is_none()).count(), Ordering::Relaxed);

        let loaded: Vec<Option<(FileSource, Vec<u8>)>> = meta
            .files
            .par_iter()
            .map(|entry| match self.load(dir, entry) {
                Ok(data) => {
                    if entry.nested.is_none() {
                        self.imported.fetch_add(1, Ordering::Relaxed);
                    }
                    let mut file = FileSource::new(entry.path.clone())
                        .with_size(data.len() as u64)
                        .with_compressed(entry.compressed);
                    file.id = entry.id;
                    Some((file, data))
                }
                Err(e) => {
                    self.fail(name, &entry.path, e);
                    None
                }
            })
            .collect();

        let mut files = Vec::with_capacity(loaded.len());
        let mut payloads = HashMap::with_capacity(loaded.len());
        for (file, data) in loaded.into_iter().flatten() {
            payloads.insert(file.path.clone(), data);
            files.push(file);
        }

        binary.write(&mut files, out)?;
        for file in &files {
            if let Some(data) = payloads.get(&file.path) {
                binary.write_data(file, data, out)?;
            }
        }
        out.flush()?;
        Ok(())
    }

    fn load(&self, dir: &Path, entry: &MetaEntry) -> Result<Vec<u8>> {
        match &entry.nested {
            Some(format) => {
                let binary = self.writer(format)?;
                let child_dir = output_path(dir, &entry.path)?;
                let mut out = Cursor::new(Vec::new());
                self.build(&binary, &child_dir, path::file_name(&entry.path), &mut out)?;
                Ok(out.into_inner())
            }
            None if entry.size == 0 => Ok(Vec::new()),
            None => Ok(fs::read(output_path(dir, &entry.path)?)?),
        }
    }

    fn fail(&self, archive: &str, path: &str, error: impl fmt::Display) {
        let failure = FileFailure {
            archive: archive.to_string(),
            path: path.to_string(),
            message: error.to_string(),
        };
        warn!(archive = %failure.archive, path = %failure.path, error = %failure.message, "Failed to import file");

        self.failed.fetch_add(1, Ordering::Relaxed);
        if let Some(on_failure) = &self.importer.on_failure {
            on_failure(&failure);
        }
        self.failures.lock().push(failure);
    }

    fn finish(self, archives: Vec<PathBuf>) -> ImportReport {
        let mut failures = self.failures.into_inner();
        failures.sort_by(|a, b| (&a.archive, &a.path).cmp(&(&b.archive, &b.path)));
        ImportReport {
            stats: ImportStats {
                imported: self.imported.into_inner(),
                failed: self.failed.into_inner(),
                total: self.total.into_inner(),
            },
            archives,
            failures,
        }
    }
}
