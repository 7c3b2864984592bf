//! POD archive entry.

use std::fmt;
use std::path::{Component, Path, PathBuf};

use crate::header::TableRecord;
use crate::{Error, Result};

/// An entry (file) within a POD archive.
///
/// This contains metadata about the file, not the file data itself.
/// Use [`ArchiveReader::extract_entry`](crate::ArchiveReader::extract_entry)
/// to stream the actual contents.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FileEntry {
    /// Path within the archive, backslash-separated as stored.
    name: String,
    /// Stored name bytes, kept only when they are not valid UTF-8.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    raw_name: Option<Vec<u8>>,
    /// Body size in bytes.
    size: i32,
    /// Absolute offset of the body.
    offset: i32,
    /// Secondary size field. Not used for extraction.
    size2: i32,
    unknown1: [u8; 4],
    unknown2: [u8; 4],
    unknown3: [u8; 4],
}

impl FileEntry {
    /// Create a new POD entry.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        name: String,
        size: i32,
        offset: i32,
        size2: i32,
        unknown1: [u8; 4],
        unknown2: [u8; 4],
        unknown3: [u8; 4],
    ) -> Self {
        Self {
            name,
            raw_name: None,
            size,
            offset,
            size2,
            unknown1,
            unknown2,
            unknown3,
        }
    }

    /// Build an entry from a table record and its stored name bytes.
    ///
    /// Names that are not valid UTF-8 are displayed lossily, but the raw
    /// bytes are kept so distinct names never map to the same output path.
    pub(crate) fn from_record(name: Vec<u8>, record: &TableRecord) -> Self {
        let (name, raw_name) = match String::from_utf8(name) {
            Ok(name) => (name, None),
            Err(e) => {
                let lossy = String::from_utf8_lossy(e.as_bytes()).into_owned();
                (lossy, Some(e.into_bytes()))
            }
        };

        let mut entry = Self::new(
            name,
            record.size(),
            record.offset(),
            record.size2(),
            record.unknown1,
            record.unknown2,
            record.unknown3,
        );
        entry.raw_name = raw_name;
        entry
    }

    /// Get the file name/path, lossily decoded as UTF-8.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the name bytes exactly as stored in the archive.
    #[inline]
    pub fn name_bytes(&self) -> &[u8] {
        self.raw_name.as_deref().unwrap_or(self.name.as_bytes())
    }

    /// Get the body size in bytes.
    #[inline]
    pub fn size(&self) -> i32 {
        self.size
    }

    /// Get the absolute offset of the body.
    #[inline]
    pub fn offset(&self) -> i32 {
        self.offset
    }

    /// Get the secondary size field.
    ///
    /// Often equal to [`size`](Self::size), but not always. Its meaning is
    /// unconfirmed so it is kept for display only.
    #[inline]
    pub fn size2(&self) -> i32 {
        self.size2
    }

    /// First opaque field.
    #[inline]
    pub fn unknown1(&self) -> [u8; 4] {
        self.unknown1
    }

    /// Second opaque field.
    #[inline]
    pub fn unknown2(&self) -> [u8; 4] {
        self.unknown2
    }

    /// Third opaque field.
    #[inline]
    pub fn unknown3(&self) -> [u8; 4] {
        self.unknown3
    }

    /// Offset one past the last body byte, if offset and size are usable.
    pub fn end_offset(&self) -> Option<u64> {
        let offset = u64::try_from(self.offset).ok()?;
        let size = u64::try_from(self.size).ok()?;
        Some(offset + size)
    }

    /// Check whether the body lies inside an archive of `archive_len` bytes.
    pub fn fits_within(&self, archive_len: u64) -> bool {
        self.end_offset().is_some_and(|end| end <= archive_len)
    }

    /// Get the relative output path for extraction.
    ///
    /// Converts Windows path separators to forward slashes. On Unix the
    /// path is built from the stored bytes, so names that are not valid
    /// UTF-8 keep their exact spelling.
    pub fn output_path(&self) -> PathBuf {
        let bytes: Vec<u8> = self
            .name_bytes()
            .iter()
            .map(|&b| if b == b'\\' { b'/' } else { b })
            .collect();
        path_from_bytes(bytes)
    }

    /// Get the output path, rejecting names that would land outside of the
    /// extraction directory.
    ///
    /// Absolute paths, drive prefixes and `..` components are refused.
    pub fn safe_output_path(&self) -> Result<PathBuf> {
        let path = self.output_path();
        let normalized = path.to_string_lossy();

        let has_drive = normalized.len() >= 2
            && normalized.as_bytes()[0].is_ascii_alphabetic()
            && normalized.as_bytes()[1] == b':';

        let escapes = path.components().any(|c| {
            matches!(
                c,
                Component::ParentDir | Component::RootDir | Component::Prefix(_)
            )
        });

        let has_file = path
            .components()
            .any(|c| matches!(c, Component::Normal(_)));

        if path.is_absolute() || has_drive || escapes || !has_file {
            return Err(Error::UnsafePath(self.name.clone()));
        }

        Ok(path)
    }

    /// Get the file extension, if any.
    pub fn extension(&self) -> Option<&str> {
        let file_name = self.name.rsplit('\\').next()?;
        Path::new(file_name)
            .extension()
            .and_then(|ext| ext.to_str())
    }
}

#[cfg(unix)]
fn path_from_bytes(bytes: Vec<u8>) -> PathBuf {
    use std::ffi::OsString;
    use std::os::unix::ffi::OsStringExt;

    PathBuf::from(OsString::from_vec(bytes))
}

#[cfg(not(unix))]
fn path_from_bytes(bytes: Vec<u8>) -> PathBuf {
    PathBuf::from(String::from_utf8_lossy(&bytes).into_owned())
}

/// Renders the one-line listing form:
/// `name (size bytes / size2 bytes), u1: .., u2: .., u3: ..`.
impl fmt::Display for FileEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} bytes / {} bytes), u1: {}, u2: {}, u3: {}",
            self.name,
            self.size,
            self.size2,
            Hex(&self.unknown1),
            Hex(&self.unknown2),
            Hex(&self.unknown3),
        )
    }
}

struct Hex<'a>(&'a [u8]);

impl fmt::Display for Hex<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}
