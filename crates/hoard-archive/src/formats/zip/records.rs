//! On-disk ZIP records.
//!
//! Signatures are read separately; the structs cover the fixed part that
//! follows. All fields are explicitly little-endian.

use zerocopy::little_endian::{U16, U32, U64};
use zerocopy::{FromBytes, Immutable, KnownLayout};

/// End of central directory record.
#[derive(Debug, Clone, Copy, FromBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct EndOfCentralDirectory {
    pub disk_number: U16,
    pub central_dir_disk: U16,
    pub entries_on_disk: U16,
    pub entries_total: U16,
    pub central_dir_size: U32,
    pub central_dir_offset: U32,
    pub comment_length: U16,
}

impl EndOfCentralDirectory {
    pub const SIGNATURE: [u8; 4] = *b"PK\x05\x06";

    /// Signature plus fixed fields.
    pub const SIZE: usize = 4 + std::mem::size_of::<Self>();

    /// Check for the ZIP64 sentinels.
    pub fn is_zip64(&self) -> bool {
        self.entries_total.get() == u16::MAX
            || self.central_dir_size.get() == u32::MAX
            || self.central_dir_offset.get() == u32::MAX
    }
}

/// ZIP64 end of central directory locator.
#[derive(Debug, Clone, Copy, FromBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct Zip64Locator {
    pub eocd_disk: U32,
    pub eocd_offset: U64,
    pub total_disks: U32,
}

impl Zip64Locator {
    pub const SIGNATURE: [u8; 4] = *b"PK\x06\x07";

    pub const SIZE: usize = 4 + std::mem::size_of::<Self>();
}

/// ZIP64 end of central directory record.
#[derive(Debug, Clone, Copy, FromBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct Zip64EndOfCentralDirectory {
    pub record_size: U64,
    pub version_made_by: U16,
    pub version_needed: U16,
    pub disk_number: U32,
    pub central_dir_disk: U32,
    pub entries_on_disk: U64,
    pub entries_total: U64,
    pub central_dir_size: U64,
    pub central_dir_offset: U64,
}

impl Zip64EndOfCentralDirectory {
    pub const SIGNATURE: [u8; 4] = *b"PK\x06\x06";
}

/// Central directory file header.
#[derive(Debug, Clone, Copy, FromBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct CentralDirectoryHeader {
    pub version_made_by: U16,
    pub version_needed: U16,
    pub flags: U16,
    pub method: U16,
    pub dos_time: U32,
    pub crc32: U32,
    pub compressed_size: U32,
    pub uncompressed_size: U32,
    pub name_length: U16,
    pub extra_length: U16,
    pub comment_length: U16,
    pub disk_start: U16,
    pub internal_attrs: U16,
    pub external_attrs: U32,
    pub local_header_offset: U32,
}

impl CentralDirectoryHeader {
    pub const SIGNATURE: [u8; 4] = *b"PK\x01\x02";

    /// Bit 0 of the general purpose flags: traditional PKWARE encryption.
    pub fn is_pkware_encrypted(&self) -> bool {
        self.flags.get() & 1 != 0
    }
}

/// Local file header.
#[derive(Debug, Clone, Copy, FromBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct LocalFileHeader {
    pub version_needed: U16,
    pub flags: U16,
    pub method: U16,
    pub dos_time: U32,
    pub crc32: U32,
    pub compressed_size: U32,
    pub uncompressed_size: U32,
    pub name_length: U16,
    pub extra_length: U16,
}

impl LocalFileHeader {
    pub const SIGNATURE: [u8; 4] = *b"PK\x03\x04";

    /// P4K writes this variant of the local signature.
    pub const SIGNATURE_P4K: [u8; 4] = *b"PK\x03\x14";

    pub const SIZE: usize = 4 + std::mem::size_of::<Self>();

    /// Bytes between the end of the fixed header and the payload.
    pub fn variable_size(&self) -> u64 {
        self.name_length.get() as u64 + self.extra_length.get() as u64
    }
}

/// Extra field ids.
pub mod extra_field {
    pub const ZIP64: u16 = 0x0001;
    /// P4K field, contents unknown. Its size includes the 4-byte header.
    pub const P4K_5000: u16 = 0x5000;
    /// P4K encryption flag. Its size includes the 4-byte header.
    pub const P4K_ENCRYPTION: u16 = 0x5002;
    /// P4K field, contents unknown. Its size includes the 4-byte header.
    pub const P4K_5003: u16 = 0x5003;
}
