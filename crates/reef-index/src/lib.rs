//! Embedded index for Reef blob stores.
//!
//! A single SQLite file holds two tables: `kv`, a string key-value map with
//! last-write-wins semantics, and `items`, an append-only sequence mapping an
//! auto-incrementing counter to an [`Id`](reef_types::Id). The schema carries
//! a version stamp that is checked on every open; there is no migration.
//!
//! # Key Types
//!
//! - [`Index`] -- connection wrapper with get/set/delete/append and scans
//! - [`IndexTransaction`] -- batch of writes committed together or not at all
//! - [`KvScan`] / [`ItemScan`] -- forward-only batched scans over a snapshot

pub mod error;
pub mod index;
pub mod scan;
mod rows;
pub mod transaction;

pub use error::{IndexError, IndexResult};
pub use index::{
    Index, META_CAPACITY, META_OWNER, META_SCHEMA_VERSION, META_USED, SCHEMA_VERSION,
};
pub use scan::{ItemScan, KvScan, Scan, ScanRow};
pub use transaction::IndexTransaction;
