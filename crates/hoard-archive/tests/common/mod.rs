//! Archive builders shared by the integration tests.

#![allow(dead_code)]

use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use hoard_archive::formats::bsa::BsaBinary;
use hoard_archive::formats::pak::PakBinary;
use hoard_archive::{
    ArcBinary, Archive, ArchiveState, Blob, Error, FileOption, FileSource, Result,
};

/// Build an archive with a writable format.
pub fn pack(binary: &dyn ArcBinary, entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut files: Vec<FileSource> = entries
        .iter()
        .map(|(path, data)| FileSource::new(*path).with_size(data.len() as u64))
        .collect();

    let mut out = Cursor::new(Vec::new());
    binary.write(&mut files, &mut out).unwrap();
    for file in &files {
        let (_, data) = entries.iter().find(|(p, _)| *p == file.path).unwrap();
        binary.write_data(file, data, &mut out).unwrap();
    }
    out.into_inner()
}

pub fn pak(entries: &[(&str, &[u8])]) -> Vec<u8> {
    pack(&PakBinary, entries)
}

pub fn bsa(entries: &[(&str, &[u8])]) -> Vec<u8> {
    pack(&BsaBinary, entries)
}

/// Open in-memory bytes with format detection.
pub fn open_bytes(name: &str, bytes: Vec<u8>) -> Archive {
    let archive = Archive::from_blob(ArchiveState::new(name), Blob::from_bytes(bytes)).unwrap();
    archive.open().unwrap();
    archive
}

/// One entry of a [`MemoryBinary`].
#[derive(Clone)]
pub struct MemoryEntry {
    pub path: String,
    pub data: Vec<u8>,
    /// Sizes of trailing fragments split off `data`.
    pub parts: Vec<usize>,
    pub fail: bool,
}

impl MemoryEntry {
    pub fn new(path: &str, data: &[u8]) -> Self {
        Self {
            path: path.to_string(),
            data: data.to_vec(),
            parts: Vec::new(),
            fail: false,
        }
    }

    pub fn split(mut self, parts: &[usize]) -> Self {
        self.parts = parts.to_vec();
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }
}

/// A synthetic format over concatenated payloads, with read counters and
/// injected failures.
pub struct MemoryBinary {
    entries: Vec<MemoryEntry>,
    concurrent: bool,
    pub table_reads: AtomicUsize,
    pub data_reads: AtomicUsize,
}

impl MemoryBinary {
    pub fn new(entries: Vec<MemoryEntry>) -> Self {
        Self {
            entries,
            concurrent: true,
            table_reads: AtomicUsize::new(0),
            data_reads: AtomicUsize::new(0),
        }
    }

    pub fn sequential(mut self) -> Self {
        self.concurrent = false;
        self
    }

    pub fn blob(&self) -> Blob {
        let bytes: Vec<u8> = self.entries.iter().flat_map(|e| e.data.clone()).collect();
        Blob::from_bytes(bytes)
    }

    /// Wrap in an archive over its own blob.
    pub fn into_archive(self, name: &str) -> (Archive, Arc<MemoryBinary>) {
        let blob = self.blob();
        let binary = Arc::new(self);
        let archive = Archive::new(
            ArchiveState::new(name),
            blob,
            Arc::clone(&binary) as Arc<dyn ArcBinary>,
        );
        (archive, binary)
    }
}

impl ArcBinary for MemoryBinary {
    fn id(&self) -> &'static str {
        "memory"
    }

    fn read(&self, _archive: &Archive, _blob: &Blob) -> Result<Vec<FileSource>> {
        self.table_reads.fetch_add(1, Ordering::SeqCst);

        let mut offset = 0u64;
        let mut files = Vec::new();
        for (i, entry) in self.entries.iter().enumerate() {
            let split: usize = entry.parts.iter().sum();
            let primary = (entry.data.len() - split) as u64;
            let mut file = FileSource::new(entry.path.clone())
                .with_id(i as u64)
                .with_offset(offset)
                .with_size(primary);
            offset += primary;

            for (n, &len) in entry.parts.iter().enumerate() {
                let part = FileSource::new(format!("{}.{}", entry.path, n + 1))
                    .with_id(i as u64)
                    .with_offset(offset)
                    .with_size(len as u64);
                offset += len as u64;
                file = file.with_part(part);
            }
            files.push(file);
        }
        Ok(files)
    }

    fn read_data(
        &self,
        archive: &Archive,
        blob: &Blob,
        file: &FileSource,
        _option: FileOption,
    ) -> Result<Vec<u8>> {
        self.data_reads.fetch_add(1, Ordering::SeqCst);
        let index = file.id.unwrap_or_default() as usize;
        if self.entries.get(index).is_some_and(|e| e.fail) {
            return Err(Error::format(archive.name(), format!("{}: injected failure", file.path)));
        }
        Ok(blob.read_at(file.offset, file.packed_size)?.into_owned())
    }

    fn supports_concurrent_read(&self) -> bool {
        self.concurrent
    }
}
