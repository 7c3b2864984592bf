//! POD - game archive reading library.
//!
//! This crate provides a unified interface to the POD library crates.
//!
//! # Crates
//!
//! - [`pod_common`] - Seekable byte stream reading
//! - [`pod_archive`] - POD v5 header, table of contents and extraction
//!
//! # Example
//!
//! ```no_run
//! use pod::prelude::*;
//!
//! let archive = PodArchive::open("game.pod")?;
//!
//! if let Some(entry) = archive.find("data/file.bin") {
//!     println!("{entry}");
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub use pod_archive as archive;
pub use pod_common as common;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use pod_archive::{ArchiveHeader, ArchiveReader, FileEntry, PodArchive};
    pub use pod_common::ByteStream;
}

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
