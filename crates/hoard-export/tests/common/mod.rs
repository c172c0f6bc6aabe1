//! Archive fixtures for the pipeline tests.

#![allow(dead_code)]

use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use hoard_archive::formats::pak::PakBinary;
use hoard_archive::{
    ArcBinary, Archive, ArchiveState, Blob, Error, FileOption, FileSource, Result,
};
use walkdir::WalkDir;

/// Build a PACK archive.
pub fn pak(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut files: Vec<FileSource> = entries
        .iter()
        .map(|(path, data)| FileSource::new(*path).with_size(data.len() as u64))
        .collect();

    let mut out = Cursor::new(Vec::new());
    PakBinary.write(&mut files, &mut out).unwrap();
    for (file, (_, data)) in files.iter().zip(entries) {
        PakBinary.write_data(file, data, &mut out).unwrap();
    }
    out.into_inner()
}

pub fn open_bytes(name: &str, bytes: Vec<u8>) -> Archive {
    let archive = Archive::from_blob(ArchiveState::new(name), Blob::from_bytes(bytes)).unwrap();
    archive.open().unwrap();
    archive
}

/// Numbered entries `dir/file_NNN.bin` whose content names the file.
pub fn numbered(count: usize) -> Vec<(String, Vec<u8>)> {
    (0..count)
        .map(|i| {
            let path = format!("dir{}/file_{i:03}.bin", i % 5);
            let data = format!("payload of {path}").into_bytes();
            (path, data)
        })
        .collect()
}

pub fn borrowed(entries: &[(String, Vec<u8>)]) -> Vec<(&str, &[u8])> {
    entries.iter().map(|(p, d)| (p.as_str(), d.as_slice())).collect()
}

/// Relative paths of every regular file below `dir`, sorted.
pub fn files_below(dir: &Path) -> Vec<String> {
    let mut files: Vec<String> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            e.path()
                .strip_prefix(dir)
                .unwrap()
                .to_string_lossy()
                .replace('\\', "/")
        })
        .collect();
    files.sort();
    files
}

/// Synthetic format over concatenated payloads. Entries listed in
/// `failing` return an error from `read_data`; `parts` splits the tail of
/// an entry into a fragment.
pub struct MemoryBinary {
    entries: Vec<(String, Vec<u8>)>,
    failing: Vec<usize>,
    split: Option<(usize, usize)>,
    concurrent: bool,
}

impl MemoryBinary {
    pub fn new(entries: Vec<(String, Vec<u8>)>) -> Self {
        Self {
            entries,
            failing: Vec::new(),
            split: None,
            concurrent: true,
        }
    }

    pub fn failing(mut self, index: usize) -> Self {
        self.failing.push(index);
        self
    }

    /// Split the last `len` bytes of entry `index` into a part.
    pub fn split(mut self, index: usize, len: usize) -> Self {
        self.split = Some((index, len));
        self
    }

    pub fn sequential(mut self) -> Self {
        self.concurrent = false;
        self
    }

    pub fn into_archive(self, name: &str) -> Archive {
        let bytes: Vec<u8> = self.entries.iter().flat_map(|(_, d)| d.clone()).collect();
        Archive::new(ArchiveState::new(name), Blob::from_bytes(bytes), Arc::new(self))
    }
}

impl ArcBinary for MemoryBinary {
    fn id(&self) -> &'static str {
        "memory"
    }

    fn read(&self, _archive: &Archive, _blob: &Blob) -> Result<Vec<FileSource>> {
        let mut offset = 0u64;
        let mut files = Vec::with_capacity(self.entries.len());
        for (i, (path, data)) in self.entries.iter().enumerate() {
            let tail = match self.split {
                Some((index, len)) if index == i => len,
                _ => 0,
            };
            let primary = (data.len() - tail) as u64;
            let mut file = FileSource::new(path.clone())
                .with_id(i as u64)
                .with_offset(offset)
                .with_size(primary);
            offset += primary;
            if tail > 0 {
                file = file.with_part(
                    FileSource::new(format!("{path}.1"))
                        .with_id(i as u64)
                        .with_offset(offset)
                        .with_size(tail as u64),
                );
                offset += tail as u64;
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
        let index = file.id.unwrap_or_default() as usize;
        if self.failing.contains(&index) {
            return Err(Error::format(archive.name(), format!("{}: corrupt entry", file.path)));
        }
        Ok(blob.read_at(file.offset, file.packed_size)?.into_owned())
    }

    fn supports_concurrent_read(&self) -> bool {
        self.concurrent
    }
}
