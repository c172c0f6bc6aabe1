//! Arx Fatalis (Danae engine) PAK archives.
//!
//! The header holds the offset and size of a file allocation table that is
//! XOR-encrypted with a repeating key from the game configuration. The
//! decrypted table is a sequence of directories:
//!
//! ```text
//! cstring  directory        with trailing backslash
//! u32      file_count
//! {
//!   cstring name
//!   u32     offset
//!   u32     flags           bit 0: imploded
//!   u32     uncompressed_size
//!   u32     size
//! } x file_count
//! ```

use std::sync::Arc;

use hoard_codec::{blast, cipher};
use hoard_common::BinaryReader;

use crate::format::Format;
use crate::{ArcBinary, Archive, Blob, Error, FileOption, FileSource, Game, Result};

/// Registry entry.
pub const FORMAT: Format = Format {
    id: "danae",
    extensions: &["pak"],
    engines: &["Danae"],
    magic: None,
    create: DanaeBinary::create,
};

const FLAG_IMPLODED: u32 = 1;

/// Arx Fatalis PAK strategy, bound to a game's key.
pub struct DanaeBinary {
    key: Vec<u8>,
}

impl DanaeBinary {
    pub fn new(key: Vec<u8>) -> Self {
        Self { key }
    }

    fn create(game: Option<&Game>) -> Result<Arc<dyn ArcBinary>> {
        let key = Game::require_key(game, "danae")?;
        Ok(Arc::new(Self::new(key)))
    }
}

impl std::fmt::Debug for DanaeBinary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DanaeBinary")
            .field("key_len", &self.key.len())
            .finish()
    }
}

impl ArcBinary for DanaeBinary {
    fn id(&self) -> &'static str {
        "danae"
    }

    fn read(&self, archive: &Archive, blob: &Blob) -> Result<Vec<FileSource>> {
        let header = blob.read_at(0, 8)?;
        let mut reader = BinaryReader::new(&header);
        let fat_offset = reader.read_u32()? as u64;
        let fat_size = reader.read_u32()? as u64;

        let mut fat = blob.read_at(fat_offset, fat_size)?.into_owned();
        cipher::xor_in_place(&mut fat, &self.key, 0);

        let mut reader = BinaryReader::new(&fat);
        let mut files = Vec::new();
        while !reader.is_empty() {
            let directory = reader.read_cstring_lossy()?.into_owned();
            let count = reader.read_u32()? as usize;
            // name terminator plus four u32 fields
            reader.check_count("file", count, 17)?;

            for _ in 0..count {
                let name = reader.read_cstring_lossy()?;
                let offset = reader.read_u32()? as u64;
                let flags = reader.read_u32()?;
                let uncompressed = reader.read_u32()? as u64;
                let size = reader.read_u32()? as u64;

                let compressed = flags & FLAG_IMPLODED;
                if compressed == 0 && size != uncompressed {
                    return Err(Error::format(
                        archive.name(),
                        format!("{directory}{name}: stored entry with {size} bytes on disk and {uncompressed} unpacked"),
                    ));
                }

                files.push(
                    FileSource::new(format!("{directory}{name}"))
                        .with_offset(offset)
                        .with_sizes(size, uncompressed)
                        .with_compressed(compressed),
                );
            }
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
        let packed = blob.read_at(file.offset, file.packed_size)?;
        if file.compressed & FLAG_IMPLODED != 0 {
            Ok(blast::decompress_blast(&packed, Some(file.file_size as usize))?)
        } else {
            Ok(packed.into_owned())
        }
    }
}
