//! Morrowind BSA archives.
//!
//! ```text
//! u32 version (0x100)
//! u32 hash_offset            relative to the end of this header
//! u32 file_count
//! { u32 size, u32 offset }   x file_count, offset relative to the data section
//! u32 name_offset            x file_count, relative to the name block
//! names                      null-terminated, backslash separated
//! { u32 lo, u32 hi }         x file_count, sorted by hash
//! data
//! ```

use std::io::SeekFrom;
use std::sync::Arc;

use byteorder::{LittleEndian, WriteBytesExt};
use hoard_common::BinaryReader;

use crate::format::Format;
use crate::{ArcBinary, Archive, Blob, Error, FileOption, FileSource, Game, Result, WriteSeek};

/// Registry entry.
pub const FORMAT: Format = Format {
    id: "bsa",
    extensions: &["bsa"],
    engines: &["Bethesda"],
    magic: Some(&[0x00, 0x01, 0x00, 0x00]),
    create: BsaBinary::create,
};

const VERSION: u32 = 0x100;
const HEADER_SIZE: u64 = 12;

/// Hash of an archive path as Morrowind computes it.
///
/// The path is lowercased and uses backslashes. Sorting entries by the
/// returned value gives the on-disk order.
pub fn hash_path(path: &str) -> u64 {
    let bytes: Vec<u8> = path
        .bytes()
        .map(|b| match b {
            b'/' => b'\\',
            b => b.to_ascii_lowercase(),
        })
        .collect();
    let midpoint = bytes.len() / 2;

    let mut lo = 0u32;
    for (i, &c) in bytes[..midpoint].iter().enumerate() {
        lo ^= (c as u32) << ((i % 4) * 8);
    }

    let mut hi = 0u32;
    for (i, &c) in bytes[midpoint..].iter().enumerate() {
        let temp = (c as u32) << ((i % 4) * 8);
        hi = (hi ^ temp).rotate_right(temp & 0x1F);
    }

    ((hi as u64) << 32) | lo as u64
}

/// BSA strategy.
#[derive(Debug, Default)]
pub struct BsaBinary;

impl BsaBinary {
    fn create(_game: Option<&Game>) -> Result<Arc<dyn ArcBinary>> {
        Ok(Arc::new(Self))
    }
}

impl ArcBinary for BsaBinary {
    fn id(&self) -> &'static str {
        "bsa"
    }

    fn read(&self, archive: &Archive, blob: &Blob) -> Result<Vec<FileSource>> {
        let header = blob.read_at(0, HEADER_SIZE)?;
        let mut reader = BinaryReader::new(&header);
        let version = reader.read_u32()?;
        if version != VERSION {
            return Err(Error::UnsupportedVersion(version));
        }
        let hash_offset = reader.read_u32()? as u64;
        let count = reader.read_u32()? as usize;

        let table_len = hash_offset + 8 * count as u64;
        let table = blob.read_at(HEADER_SIZE, table_len)?;
        let data_start = HEADER_SIZE + table_len;

        let mut records = BinaryReader::new(&table);
        records.check_count("file record", count, 12)?;
        let mut name_offsets = BinaryReader::new(&table);
        name_offsets.seek(count * 8)?;
        let names_start = count * 12;
        let names_end = hash_offset as usize;
        if names_end < names_start {
            return Err(Error::format(
                archive.name(),
                format!("hash table at {names_end} overlaps the {count} file records"),
            ));
        }
        let names = &table[names_start..names_end];
        let mut hashes = BinaryReader::new(&table);
        hashes.seek(names_end)?;

        let mut files = Vec::with_capacity(count);
        for _ in 0..count {
            let size = records.read_u32()? as u64;
            let offset = records.read_u32()? as u64;
            let name_offset = name_offsets.read_u32()? as usize;
            let lo = hashes.read_u32()? as u64;
            let hi = hashes.read_u32()? as u64;

            let mut name_reader = BinaryReader::new(names);
            name_reader.seek(name_offset)?;
            let name = name_reader.read_cstring_lossy()?;

            files.push(
                FileSource::new(name)
                    .with_id((hi << 32) | lo)
                    .with_offset(data_start + offset)
                    .with_size(size),
            );
        }
        Ok(files)
    }

    fn read_data(
        &self,
        _archive: &Archive,
        blob: &Blob,
        file: &FileSource,
        _option: FileOption,
    ) -> Result<Vec<u8>> {
        Ok(blob.read_at(file.offset, file.packed_size)?.into_owned())
    }

    fn supports_write(&self) -> bool {
        true
    }

    fn write(&self, files: &mut [FileSource], out: &mut dyn WriteSeek) -> Result<()> {
        for file in files.iter_mut() {
            file.id = Some(hash_path(&file.path));
        }
        files.sort_by_key(|f| f.id);

        let names: Vec<String> = files.iter().map(|f| f.path.replace('/', "\\")).collect();
        let names_len: u64 = names.iter().map(|n| n.len() as u64 + 1).sum();
        let count = files.len() as u64;
        let hash_offset = 12 * count + names_len;
        let data_start = HEADER_SIZE + hash_offset + 8 * count;

        let mut position = data_start;
        for file in files.iter_mut() {
            file.offset = position;
            position += file.packed_size;
        }
        let too_large = |what: &str| Error::format("bsa", format!("{what} exceeds 4 GiB"));
        let hash_offset = u32::try_from(hash_offset).map_err(|_| too_large("table"))?;
        u32::try_from(position - data_start).map_err(|_| too_large("data"))?;

        out.seek(SeekFrom::Start(0))?;
        out.write_u32::<LittleEndian>(VERSION)?;
        out.write_u32::<LittleEndian>(hash_offset)?;
        out.write_u32::<LittleEndian>(files.len() as u32)?;

        for file in files.iter() {
            out.write_u32::<LittleEndian>(file.packed_size as u32)?;
            out.write_u32::<LittleEndian>((file.offset - data_start) as u32)?;
        }
        let mut name_offset = 0u32;
        for name in &names {
            out.write_u32::<LittleEndian>(name_offset)?;
            name_offset += name.len() as u32 + 1;
        }
        for name in &names {
            out.write_all(name.as_bytes())?;
            out.write_u8(0)?;
        }
        for file in files.iter() {
            let hash = file.id.unwrap_or_default();
            out.write_u32::<LittleEndian>(hash as u32)?;
            out.write_u32::<LittleEndian>((hash >> 32) as u32)?;
        }
        Ok(())
    }

    fn write_data(&self, file: &FileSource, data: &[u8], out: &mut dyn WriteSeek) -> Result<()> {
        out.seek(SeekFrom::Start(file.offset))?;
        out.write_all(data)?;
        Ok(())
    }
}
