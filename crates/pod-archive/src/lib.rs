//! POD archive reader for game asset bundles.
//!
//! POD (version 5) is an uncompressed container: a sparse header, a table of
//! fixed-size records, a table of null-terminated names and the concatenated
//! file bodies. This crate supports:
//!
//! - Header validation (magic `POD`, version digit `5`)
//! - Two-pass table decoding: records first, then names addressed by
//!   relative offsets in any order
//! - Streaming extraction into any [`std::io::Write`] sink
//! - Memory-mapped sessions with independent per-thread readers
//!   (parallel extraction with the `parallel` feature)
//!
//! Writing archives is not supported.
//!
//! # Example
//!
//! ```no_run
//! use pod_archive::PodArchive;
//!
//! let archive = PodArchive::open("game.pod")?;
//!
//! for entry in archive.iter() {
//!     println!("{}: {} bytes", entry.name(), entry.size());
//! }
//!
//! // Read a specific file
//! if archive.get(0).is_some() {
//!     let data = archive.read(0)?;
//! }
//! # Ok::<(), pod_archive::Error>(())
//! ```

mod archive;
mod entry;
mod error;
pub mod header;
mod session;

#[cfg(test)]
mod test_support;

pub use archive::{ArchiveReader, COPY_CHUNK};
pub use entry::FileEntry;
pub use error::{Error, Result, TablePass};
pub use header::ArchiveHeader;
pub use session::{ArchiveBytes, PodArchive, SharedReader};
