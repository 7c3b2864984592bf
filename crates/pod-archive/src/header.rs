//! POD header and table record layout.
//!
//! All integers are little-endian. The header is sparse: only the magic,
//! the version digit, the file count and the table offset are known.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// Magic bytes at offset 0.
pub const MAGIC: [u8; 3] = *b"POD";

/// The only format version this crate reads.
pub const SUPPORTED_VERSION: u32 = 5;

/// Offset of the ASCII version digit.
pub const VERSION_OFFSET: i64 = 3;

/// Offset of the file count.
pub const FILE_COUNT_OFFSET: i64 = 88;

/// Offset of the absolute table of contents position.
pub const TABLE_OFFSET_OFFSET: i64 = 264;

/// Size of one table of contents record.
pub const TABLE_RECORD_SIZE: usize = std::mem::size_of::<TableRecord>();

/// Decoded POD header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ArchiveHeader {
    /// Magic bytes, always `POD`.
    pub magic: [u8; 3],
    /// Format version.
    pub version: u32,
    /// Number of table records.
    pub file_count: u32,
    /// Absolute offset of the first table record.
    pub table_offset: u32,
}

impl ArchiveHeader {
    /// Absolute offset of the name table that follows the records.
    pub fn name_table_offset(&self) -> u64 {
        self.table_offset as u64 + self.file_count as u64 * TABLE_RECORD_SIZE as u64
    }
}

/// One table of contents record, as stored.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C, packed)]
pub(crate) struct TableRecord {
    /// Name offset relative to the end of the record array
    pub name_offset: i32,
    /// Body size in bytes
    pub size: i32,
    /// Absolute body offset
    pub offset: i32,
    /// Secondary size, purpose unknown
    pub size2: i32,
    pub unknown1: [u8; 4],
    pub unknown2: [u8; 4],
    pub unknown3: [u8; 4],
}

impl TableRecord {
    #[inline]
    pub fn name_offset(&self) -> i32 {
        i32::from_le(self.name_offset)
    }

    #[inline]
    pub fn size(&self) -> i32 {
        i32::from_le(self.size)
    }

    #[inline]
    pub fn offset(&self) -> i32 {
        i32::from_le(self.offset)
    }

    #[inline]
    pub fn size2(&self) -> i32 {
        i32::from_le(self.size2)
    }
}
