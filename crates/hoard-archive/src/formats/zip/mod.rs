//! ZIP archives, including ZIP64 and Star Citizen P4K.
//!
//! P4K is a ZIP64 archive with three private extra fields after the ZIP64
//! one, a Zstandard method id (100) and optional per-entry AES-128-CBC
//! encryption with a zero IV. The key comes from the game configuration.

mod records;

use std::sync::Arc;

use hoard_codec::{cipher, inflate};
use hoard_common::BinaryReader;
use memchr::memmem;
use tracing::trace;

use crate::format::Format;
use crate::source::Tag;
use crate::{ArcBinary, Archive, Blob, Error, FileOption, FileSource, Game, Result};

pub use records::{
    extra_field, CentralDirectoryHeader, EndOfCentralDirectory, LocalFileHeader,
    Zip64EndOfCentralDirectory, Zip64Locator,
};

/// Registry entry.
pub const FORMAT: Format = Format {
    id: "zip",
    extensions: &["zip", "p4k", "pk3", "socpak"],
    engines: &["Cry", "Zip"],
    magic: Some(b"PK"),
    create: ZipBinary::create,
};

/// Largest possible EOCD plus comment.
const EOCD_SEARCH: u64 = EndOfCentralDirectory::SIZE as u64 + u16::MAX as u64;

/// Compression methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum Method {
    Store = 0,
    Deflate = 8,
    Zstd = 93,
    /// Star Citizen's Zstandard id.
    P4kZstd = 100,
}

impl TryFrom<u16> for Method {
    type Error = u16;

    fn try_from(value: u16) -> std::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Store),
            8 => Ok(Self::Deflate),
            93 => Ok(Self::Zstd),
            100 => Ok(Self::P4kZstd),
            other => Err(other),
        }
    }
}

/// Entry is AES encrypted (stored in [`FileSource::tag`]).
const TAG_ENCRYPTED: u64 = 1;

/// ZIP strategy.
#[derive(Debug, Default)]
pub struct ZipBinary;

impl ZipBinary {
    fn create(_game: Option<&Game>) -> Result<Arc<dyn ArcBinary>> {
        Ok(Arc::new(Self))
    }

    /// Locate the EOCD record. Trailing zero padding (P4K) is skipped.
    fn find_eocd(archive: &Archive, blob: &Blob) -> Result<(u64, EndOfCentralDirectory)> {
        let len = blob.len();
        let window_start = len.saturating_sub(EOCD_SEARCH + 4096);
        let window = blob.read_from(window_start)?;

        let content_end = window.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
        let search_from = content_end.saturating_sub(EOCD_SEARCH as usize);
        let found = memmem::rfind(&window[search_from..content_end], &EndOfCentralDirectory::SIGNATURE)
            .ok_or_else(|| Error::format(archive.name(), "end of central directory not found"))?;

        let position = search_from + found;
        let mut reader = BinaryReader::new(&window[position + 4..]);
        let eocd: EndOfCentralDirectory = reader.read_struct()?;
        Ok((window_start + position as u64, eocd))
    }

    /// Returns (entry count, central directory offset, central directory size).
    fn read_zip64(archive: &Archive, blob: &Blob, eocd_position: u64) -> Result<(u64, u64, u64)> {
        let locator_position = eocd_position
            .checked_sub(Zip64Locator::SIZE as u64)
            .ok_or_else(|| Error::format(archive.name(), "ZIP64 locator not found"))?;
        let bytes = blob.read_at(locator_position, Zip64Locator::SIZE as u64)?;
        let mut reader = BinaryReader::new(&bytes);
        reader.expect_magic(&Zip64Locator::SIGNATURE)?;
        let locator: Zip64Locator = reader.read_struct()?;

        let record_size = 4 + std::mem::size_of::<Zip64EndOfCentralDirectory>() as u64;
        let bytes = blob.read_at(locator.eocd_offset.get(), record_size)?;
        let mut reader = BinaryReader::new(&bytes);
        reader.expect_magic(&Zip64EndOfCentralDirectory::SIGNATURE)?;
        let eocd: Zip64EndOfCentralDirectory = reader.read_struct()?;

        Ok((
            eocd.entries_total.get(),
            eocd.central_dir_offset.get(),
            eocd.central_dir_size.get(),
        ))
    }

    fn read_entry(reader: &mut BinaryReader<'_>) -> Result<Option<FileSource>> {
        reader.expect_magic(&CentralDirectoryHeader::SIGNATURE)?;
        let header: CentralDirectoryHeader = reader.read_struct()?;

        let name_bytes = reader.read_bytes(header.name_length.get() as usize)?;
        let name = String::from_utf8_lossy(name_bytes).into_owned();

        let mut uncompressed = header.uncompressed_size.get() as u64;
        let mut compressed = header.compressed_size.get() as u64;
        let mut offset = header.local_header_offset.get() as u64;
        let mut encrypted = false;

        let mut extra = reader.sub_reader(header.extra_length.get() as usize)?;
        while extra.remaining() >= 4 {
            let id = extra.read_u16()?;
            let size = extra.read_u16()? as usize;
            match id {
                extra_field::ZIP64 => {
                    let mut field = extra.sub_reader(size.min(extra.remaining()))?;
                    if header.uncompressed_size.get() == u32::MAX {
                        uncompressed = field.read_u64()?;
                    }
                    if header.compressed_size.get() == u32::MAX {
                        compressed = field.read_u64()?;
                    }
                    if header.local_header_offset.get() == u32::MAX {
                        offset = field.read_u64()?;
                    }
                }
                extra_field::P4K_ENCRYPTION => {
                    let mut field = extra.sub_reader(size.saturating_sub(4).min(extra.remaining()))?;
                    encrypted = field.read_u16()? == 1;
                }
                extra_field::P4K_5000 | extra_field::P4K_5003 => {
                    extra.advance(size.saturating_sub(4).min(extra.remaining()))?;
                }
                _ => extra.advance(size.min(extra.remaining()))?,
            }
        }

        reader.advance(header.comment_length.get() as usize)?;

        if name.ends_with(['/', '\\']) && uncompressed == 0 {
            return Ok(None);
        }
        if header.is_pkware_encrypted() {
            trace!(path = %name, "Entry uses PKWARE encryption");
        }

        Ok(Some(
            FileSource::new(name)
                .with_offset(offset)
                .with_sizes(compressed, uncompressed)
                .with_compressed(header.method.get() as u32)
                .with_tag(if encrypted {
                    Tag::Value(TAG_ENCRYPTED)
                } else {
                    Tag::None
                })
                .with_tag2(Tag::Value(header.flags.get() as u64)),
        ))
    }
}

impl ArcBinary for ZipBinary {
    fn id(&self) -> &'static str {
        "zip"
    }

    fn read(&self, archive: &Archive, blob: &Blob) -> Result<Vec<FileSource>> {
        let (eocd_position, eocd) = Self::find_eocd(archive, blob)?;

        let (count, cd_offset, cd_size) = if eocd.is_zip64() {
            Self::read_zip64(archive, blob, eocd_position)?
        } else {
            (
                eocd.entries_total.get() as u64,
                eocd.central_dir_offset.get() as u64,
                eocd.central_dir_size.get() as u64,
            )
        };

        let directory = blob.read_at(cd_offset, cd_size)?;
        let mut reader = BinaryReader::new(&directory);
        reader.check_count("central directory entry", count as usize, 46)?;

        let mut files = Vec::with_capacity(count as usize);
        for _ in 0..count {
            if let Some(file) = Self::read_entry(&mut reader)? {
                files.push(file);
            }
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
        if file.file_size == 0 {
            return Ok(Vec::new());
        }
        if file.tag2.value().is_some_and(|flags| flags & 1 != 0) {
            return Err(Error::format(
                archive.name(),
                format!("{}: PKWARE encryption is not supported", file.path),
            ));
        }

        let header_bytes = blob.read_at(file.offset, LocalFileHeader::SIZE as u64)?;
        let mut reader = BinaryReader::new(&header_bytes);
        let signature: [u8; 4] = reader.read_array()?;
        if signature != LocalFileHeader::SIGNATURE && signature != LocalFileHeader::SIGNATURE_P4K {
            return Err(Error::InvalidSignature {
                expected: u32::from_le_bytes(LocalFileHeader::SIGNATURE),
                actual: u32::from_le_bytes(signature),
            });
        }
        let local: LocalFileHeader = reader.read_struct()?;

        let data_offset = file.offset + LocalFileHeader::SIZE as u64 + local.variable_size();
        let packed = blob.read_at(data_offset, file.packed_size)?;

        let decrypted;
        let payload: &[u8] = if file.tag.value() == Some(TAG_ENCRYPTED) {
            let key = archive.key().ok_or_else(|| Error::MissingKey {
                format: "zip",
                game: archive.game().map(|g| g.id().to_string()),
            })?;
            let mut plain = cipher::decrypt_aes_cbc(&packed, key)?;
            plain.truncate(cipher::trim_zero_padding(&plain));
            decrypted = plain;
            &decrypted
        } else {
            &packed
        };

        let expected = Some(file.file_size as usize);
        let method = Method::try_from(file.compressed as u16)
            .map_err(|m| Error::UnsupportedCompression(m as u32))?;
        let data = match method {
            Method::Store => payload.to_vec(),
            Method::Deflate => inflate::decompress_deflate(payload, expected)?,
            Method::Zstd | Method::P4kZstd => inflate::decompress_zstd(payload, expected)?,
        };
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use flate2::write::DeflateEncoder;
    use flate2::Compression;

    use super::*;
    use crate::ArchiveState;

    struct Entry<'a> {
        name: &'a str,
        data: &'a [u8],
        deflate: bool,
    }

    /// Build a plain ZIP in memory.
    fn build_zip(entries: &[Entry<'_>], trailing_zeros: usize) -> Vec<u8> {
        let mut out = Vec::new();
        let mut central = Vec::new();

        for entry in entries {
            let packed = if entry.deflate {
                let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
                encoder.write_all(entry.data).unwrap();
                encoder.finish().unwrap()
            } else {
                entry.data.to_vec()
            };
            let method: u16 = if entry.deflate { 8 } else { 0 };
            let offset = out.len() as u32;

            out.extend_from_slice(&LocalFileHeader::SIGNATURE);
            out.extend_from_slice(&20u16.to_le_bytes());
            out.extend_from_slice(&0u16.to_le_bytes());
            out.extend_from_slice(&method.to_le_bytes());
            out.extend_from_slice(&[0u8; 8]);
            out.extend_from_slice(&(packed.len() as u32).to_le_bytes());
            out.extend_from_slice(&(entry.data.len() as u32).to_le_bytes());
            out.extend_from_slice(&(entry.name.len() as u16).to_le_bytes());
            out.extend_from_slice(&0u16.to_le_bytes());
            out.extend_from_slice(entry.name.as_bytes());
            out.extend_from_slice(&packed);

            central.extend_from_slice(&CentralDirectoryHeader::SIGNATURE);
            central.extend_from_slice(&20u16.to_le_bytes());
            central.extend_from_slice(&20u16.to_le_bytes());
            central.extend_from_slice(&0u16.to_le_bytes());
            central.extend_from_slice(&method.to_le_bytes());
            central.extend_from_slice(&[0u8; 8]);
            central.extend_from_slice(&(packed.len() as u32).to_le_bytes());
            central.extend_from_slice(&(entry.data.len() as u32).to_le_bytes());
            central.extend_from_slice(&(entry.name.len() as u16).to_le_bytes());
            central.extend_from_slice(&[0u8; 12]);
            central.extend_from_slice(&offset.to_le_bytes());
            central.extend_from_slice(entry.name.as_bytes());
        }

        let cd_offset = out.len() as u32;
        out.extend_from_slice(&central);
        out.extend_from_slice(&EndOfCentralDirectory::SIGNATURE);
        out.extend_from_slice(&[0u8; 4]);
        out.extend_from_slice(&(entries.len() as u16).to_le_bytes());
        out.extend_from_slice(&(entries.len() as u16).to_le_bytes());
        out.extend_from_slice(&(central.len() as u32).to_le_bytes());
        out.extend_from_slice(&cd_offset.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend(std::iter::repeat(0u8).take(trailing_zeros));
        out
    }

    fn open(bytes: Vec<u8>) -> Archive {
        let archive = Archive::new(
            ArchiveState::new("test.zip"),
            Blob::from_bytes(bytes),
            Arc::new(ZipBinary),
        );
        archive.open().unwrap();
        archive
    }

    #[test]
    fn test_read_stored_and_deflated() {
        let text = b"the quick brown fox jumps over the lazy dog ".repeat(20);
        let archive = open(build_zip(
            &[
                Entry { name: "Data/readme.txt", data: b"hello", deflate: false },
                Entry { name: "Data/fox.txt", data: &text, deflate: true },
                Entry { name: "Data/Empty/", data: b"", deflate: false },
            ],
            0,
        ));

        let files = archive.files().unwrap();
        assert_eq!(files.len(), 2);
        assert!(archive.contains("data/README.TXT"));

        let data = archive.get_data_at("Data/fox.txt", FileOption::DEFAULT).unwrap();
        assert_eq!(data, text);
        let (_, file) = archive.get_source("data/fox.txt").unwrap();
        assert_eq!(file.compressed, 8);
        assert!(file.packed_size < file.file_size);
    }

    #[test]
    fn test_trailing_padding() {
        let archive = open(build_zip(
            &[Entry { name: "a.bin", data: b"abc", deflate: false }],
            5000,
        ));
        assert_eq!(archive.get_data_at("a.bin", FileOption::DEFAULT).unwrap(), b"abc");
    }

    #[test]
    fn test_missing_eocd() {
        let archive = Archive::new(
            ArchiveState::new("broken.zip"),
            Blob::from_bytes(b"PK\x03\x04 not really a zip".to_vec()),
            Arc::new(ZipBinary),
        );
        assert!(matches!(archive.open(), Err(Error::Format { .. })));
    }

    #[test]
    fn test_encrypted_entry_needs_key() {
        let bytes = build_zip(
            &[Entry { name: "secret.bin", data: &[0u8; 16], deflate: false }],
            0,
        );
        let archive = open(bytes.clone());
        let (_, file) = archive.get_source("secret.bin").unwrap();
        let encrypted = FileSource::new(file.path.clone())
            .with_offset(file.offset)
            .with_size(16)
            .with_tag(Tag::Value(TAG_ENCRYPTED));

        let blob = Blob::from_bytes(bytes);
        let result = ZipBinary.read_data(&archive, &blob, &encrypted, FileOption::DEFAULT);
        assert!(matches!(result, Err(Error::MissingKey { format: "zip", .. })));
    }

    #[test]
    fn test_method_ids() {
        assert_eq!(Method::try_from(100), Ok(Method::P4kZstd));
        assert_eq!(Method::try_from(93), Ok(Method::Zstd));
        assert_eq!(Method::try_from(14), Err(14));
    }
}
