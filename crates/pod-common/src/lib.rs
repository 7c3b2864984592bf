//! Common utilities for the POD toolkit.
//!
//! This crate provides the leaf layer every other POD crate builds on:
//!
//! - [`ByteStream`] - Stateful cursor over any seekable byte source
//! - [`Error`] - Typed failures for seeks and short reads

mod error;
mod stream;

pub use error::{Error, Result};
pub use stream::ByteStream;

/// Re-export zerocopy traits for convenience
pub use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};
