//! Error types for the POD archive crate.

use std::fmt;

use thiserror::Error;

/// Which pass of the table decode was running when it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TablePass {
    /// Fixed-size record pass.
    Records,
    /// Name table pass.
    Names,
}

impl fmt::Display for TablePass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TablePass::Records => f.write_str("record"),
            TablePass::Names => f.write_str("name"),
        }
    }
}

/// Errors that can occur when working with POD archives.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Byte stream error (seek failure, short read).
    #[error("{0}")]
    Stream(#[from] pod_common::Error),

    /// The source does not start with the POD magic.
    #[error("not a POD archive: expected magic \"POD\", got {found:02x?}")]
    InvalidFormat { found: Vec<u8> },

    /// The version byte is not the ASCII digit 5.
    #[error("unsupported POD version: {:?}", char::from(*.0))]
    UnsupportedVersion(u8),

    /// A header integer holds a value the format cannot use.
    #[error("invalid header field {field}: {value}")]
    InvalidHeaderField { field: &'static str, value: i32 },

    /// A table record holds a value the format cannot use.
    #[error("invalid {field} for entry {name}: {value}")]
    InvalidEntryField {
        name: String,
        field: &'static str,
        value: i32,
    },

    /// Decoding the table of contents or the name table failed.
    #[error("malformed table of contents ({pass} pass, entry {index}): {source}")]
    MalformedTable {
        pass: TablePass,
        index: usize,
        #[source]
        source: pod_common::Error,
    },

    /// The archive ended before an entry body was fully delivered.
    #[error("unexpected end of archive in {name}: expected {expected} bytes, got {copied}")]
    UnexpectedEof {
        name: String,
        expected: u64,
        copied: u64,
    },

    /// The sink rejected a write during extraction.
    #[error("failed writing {name} after {written} bytes: {source}")]
    WriteError {
        name: String,
        written: u64,
        #[source]
        source: std::io::Error,
    },

    /// An entry's body does not fit inside the archive.
    #[error("entry {name} lies outside the archive: offset {offset}, size {size}, archive length {archive_len}")]
    EntryOutOfBounds {
        name: String,
        offset: i32,
        size: i32,
        archive_len: u64,
    },

    /// Entry not found.
    #[error("entry not found: {0}")]
    EntryNotFound(String),

    /// The entry name resolves outside of a relative output directory.
    #[error("refusing to extract {0}: path is absolute or leaves the output directory")]
    UnsafePath(String),
}

impl Error {
    /// Whether this error was caused by the archive running out of bytes.
    pub fn is_unexpected_eof(&self) -> bool {
        match self {
            Error::UnexpectedEof { .. } => true,
            Error::Stream(e) | Error::MalformedTable { source: e, .. } => e.is_unexpected_eof(),
            _ => false,
        }
    }
}

/// Result type for POD operations.
pub type Result<T> = std::result::Result<T, Error>;
