//! id Software PACK archives (Quake, Quake II, Half-Life).
//!
//! A 12-byte header (`PACK`, directory offset, directory length) and a
//! directory of 64-byte records at the end: a 56-byte name, offset and size.
//! Payloads are stored uncompressed.

use std::io::{Seek, SeekFrom, Write};
use std::sync::Arc;

use byteorder::{LittleEndian, WriteBytesExt};
use hoard_common::BinaryReader;

use crate::format::Format;
use crate::{ArcBinary, Archive, Blob, Error, FileOption, FileSource, Game, Result, WriteSeek};

/// Registry entry.
pub const FORMAT: Format = Format {
    id: "pak",
    extensions: &["pak"],
    engines: &["Id", "GoldSrc"],
    magic: Some(MAGIC),
    create: PakBinary::create,
};

const MAGIC: &[u8; 4] = b"PACK";
const HEADER_SIZE: u64 = 12;
const RECORD_SIZE: usize = 64;
const NAME_SIZE: usize = 56;

/// PACK strategy.
#[derive(Debug, Default)]
pub struct PakBinary;

impl PakBinary {
    fn create(_game: Option<&Game>) -> Result<Arc<dyn ArcBinary>> {
        Ok(Arc::new(Self))
    }
}

impl ArcBinary for PakBinary {
    fn id(&self) -> &'static str {
        "pak"
    }

    fn read(&self, archive: &Archive, blob: &Blob) -> Result<Vec<FileSource>> {
        let header = blob.read_at(0, HEADER_SIZE)?;
        let mut reader = BinaryReader::new(&header);
        reader.expect_magic(MAGIC)?;
        let dir_offset = reader.read_u32()? as u64;
        let dir_len = reader.read_u32()? as u64;

        if dir_len % RECORD_SIZE as u64 != 0 {
            return Err(Error::format(
                archive.name(),
                format!("directory length {dir_len} is not a multiple of {RECORD_SIZE}"),
            ));
        }

        let directory = blob.read_at(dir_offset, dir_len)?;
        let mut reader = BinaryReader::new(&directory);
        let count = directory.len() / RECORD_SIZE;

        let mut files = Vec::with_capacity(count);
        for _ in 0..count {
            let name = reader.read_string_in_buffer(NAME_SIZE)?;
            let offset = reader.read_u32()? as u64;
            let size = reader.read_u32()? as u64;
            files.push(FileSource::new(name).with_offset(offset).with_size(size));
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
        let mut position = HEADER_SIZE;
        for file in files.iter_mut() {
            if file.path.len() >= NAME_SIZE {
                return Err(Error::format(
                    "pak",
                    format!("{}: names are limited to {} bytes", file.path, NAME_SIZE - 1),
                ));
            }
            file.offset = position;
            position += file.packed_size;
        }

        let dir_len = (files.len() * RECORD_SIZE) as u64;
        let dir_offset = u32::try_from(position)
            .map_err(|_| Error::format("pak", "archive exceeds 4 GiB"))?;

        out.seek(SeekFrom::Start(0))?;
        out.write_all(MAGIC)?;
        out.write_u32::<LittleEndian>(dir_offset)?;
        out.write_u32::<LittleEndian>(dir_len as u32)?;

        out.seek(SeekFrom::Start(position))?;
        for file in files.iter() {
            let mut name = [0u8; NAME_SIZE];
            name[..file.path.len()].copy_from_slice(file.path.as_bytes());
            out.write_all(&name)?;
            out.write_u32::<LittleEndian>(file.offset as u32)?;
            out.write_u32::<LittleEndian>(file.packed_size as u32)?;
        }
        Ok(())
    }

    fn write_data(&self, file: &FileSource, data: &[u8], out: &mut dyn WriteSeek) -> Result<()> {
        out.seek(SeekFrom::Start(file.offset))?;
        out.write_all(data)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::ArchiveState;

    fn build(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut files: Vec<FileSource> = entries
            .iter()
            .map(|(path, data)| FileSource::new(*path).with_size(data.len() as u64))
            .collect();
        let mut out = Cursor::new(Vec::new());
        PakBinary.write(&mut files, &mut out).unwrap();
        for (file, (_, data)) in files.iter().zip(entries) {
            PakBinary.write_data(file, data.as_bytes(), &mut out).unwrap();
        }
        out.into_inner()
    }

    #[test]
    fn test_write_then_read() {
        let bytes = build(&[
            ("maps/e1m1.bsp", "bsp level"),
            ("sound/items/r_item1.wav", "RIFF...."),
            ("progs.dat", "progs"),
        ]);
        assert_eq!(&bytes[..4], b"PACK");

        let archive = Archive::new(ArchiveState::new("pak0.pak"), Blob::from_bytes(bytes), Arc::new(PakBinary));
        let files = archive.files().unwrap();
        assert_eq!(files.len(), 3);
        assert_eq!(files[0].path, "maps/e1m1.bsp");
        assert_eq!(files[0].offset, 12);

        let data = archive.get_data_at("SOUND/items/r_item1.wav", FileOption::DEFAULT).unwrap();
        assert_eq!(data, b"RIFF....");
    }

    #[test]
    fn test_long_name_rejected() {
        let long = "x".repeat(NAME_SIZE);
        let mut files = vec![FileSource::new(long).with_size(1)];
        let mut out = Cursor::new(Vec::new());
        assert!(PakBinary.write(&mut files, &mut out).is_err());
    }

    #[test]
    fn test_bad_magic_and_directory() {
        let archive = Archive::new(
            ArchiveState::new("bad.pak"),
            Blob::from_bytes(b"PAKX\x0c\0\0\0\0\0\0\0".to_vec()),
            Arc::new(PakBinary),
        );
        assert!(matches!(archive.open(), Err(Error::Common(_))));

        let archive = Archive::new(
            ArchiveState::new("odd.pak"),
            Blob::from_bytes(b"PACK\x0c\0\0\0\x05\0\0\0abcde".to_vec()),
            Arc::new(PakBinary),
        );
        assert!(matches!(archive.open(), Err(Error::Format { .. })));
    }
}
