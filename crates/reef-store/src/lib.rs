//! Content-addressed blob storage for Reef.
//!
//! Blobs are opaque byte strings addressed by a 32-byte [`Id`](reef_types::Id).
//! A store never interprets them; in practice they are sealed envelopes.
//!
//! # Storage Backends
//!
//! All backends implement the [`BlobStore`] trait:
//!
//! - [`OsStore`] -- one directory per store, a file per blob, plus an index
//! - [`InMemoryBlobStore`] -- `HashMap`-based store for tests and embedding
//!
//! [`OsStorehouse`] implements [`Storehouser`], managing one `OsStore` per
//! owning identity.
//!
//! # Design Rules
//!
//! 1. Blobs are immutable once stored; a second store under the same id fails.
//! 2. Stage, then link: a blob becomes visible only when complete.
//! 3. Used bytes are tracked in the index together with the item sequence.
//! 4. The store never interprets blob contents.
//! 5. All I/O errors are propagated, never silently ignored.

pub mod error;
pub mod memory;
pub mod os;
pub mod storehouse;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use memory::InMemoryBlobStore;
pub use os::{Blobs, OsStore};
pub use storehouse::OsStorehouse;
pub use traits::{BlobStore, IdIter, Storehouser};
