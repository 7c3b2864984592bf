//! Error types for pod-common.

use thiserror::Error;

/// Error type for byte stream operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The underlying source rejected a seek.
    #[error("failed to seek to offset {offset}: {source}")]
    SeekFailure {
        offset: i64,
        #[source]
        source: std::io::Error,
    },

    /// End of stream reached before a fixed-length read completed.
    #[error(
        "unexpected end of stream at offset {offset}: needed {needed} bytes but only {available} available"
    )]
    UnexpectedEof {
        offset: u64,
        needed: usize,
        available: usize,
    },

    /// End of stream reached before a null terminator was found.
    #[error("unexpected end of stream: string at offset {offset} missing null terminator after {scanned} bytes")]
    UnterminatedString { offset: u64, scanned: usize },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error means the source ran out of bytes.
    ///
    /// Covers both short fixed-length reads and strings whose terminator
    /// was never found.
    pub fn is_unexpected_eof(&self) -> bool {
        matches!(
            self,
            Error::UnexpectedEof { .. } | Error::UnterminatedString { .. }
        )
    }
}

/// Result type alias using the common Error type.
pub type Result<T> = std::result::Result<T, Error>;
