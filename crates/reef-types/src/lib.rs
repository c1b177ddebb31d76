//! Foundation types for Reef, an encrypted content-addressed object store.
//!
//! Every other Reef crate depends on `reef-types`.
//!
//! # Key Types
//!
//! - [`Id`] -- 32-byte content identifier addressing a stored blob
//! - [`SliceReader`] -- positional reads over files, buffers, and sub-ranges
//! - [`Section`] -- a bounded, independently seekable window over a reader
//! - [`text`] -- the fixed-length URL-safe base64 encoding shared by ids and keys

pub mod error;
pub mod id;
pub mod io;
pub mod text;

pub use error::{TypeError, TypeResult};
pub use id::{Id, ID_LEN, ID_TEXT_LEN};
pub use io::{Section, SharedReader, SliceReader};
