use std::path::PathBuf;

use reef_index::IndexError;
use reef_types::{Id, TypeError};

/// Errors from blob store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// An id of the wrong length or encoding was supplied.
    #[error("invalid id: {0}")]
    InvalidId(#[from] TypeError),

    /// No blob is stored under the id.
    #[error("blob not found: {0}")]
    NotFound(Id),

    /// A blob is already stored under the id. The existing blob is untouched.
    #[error("blob already exists: {0}")]
    AlreadyExists(Id),

    /// Storing the blob would exceed the store's capacity.
    #[error("capacity exceeded: {used} + {needed} bytes > {capacity}")]
    CapacityExceeded { needed: u64, used: u64, capacity: u64 },

    /// No store is allocated for the owner.
    #[error("no store allocated for owner {0}")]
    OwnerNotFound(String),

    /// A store is already allocated for the owner.
    #[error("store already allocated for owner {0}")]
    AlreadyAllocated(String),

    /// The store is still shared and cannot be removed.
    #[error("store for owner {0} is in use")]
    Busy(String),

    /// Something already exists where a new store root was requested.
    #[error("store root already exists: {}", .0.display())]
    RootExists(PathBuf),

    /// The directory is not a store.
    #[error("not a store: {}", .0.display())]
    NotAStore(PathBuf),

    /// On-disk state that cannot be interpreted.
    #[error("corrupt store: {0}")]
    Corrupt(String),

    #[error("index error: {0}")]
    Index(#[from] IndexError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        match self {
            StoreError::NotFound(_) | StoreError::OwnerNotFound(_) => true,
            StoreError::Index(e) => e.is_not_found(),
            _ => false,
        }
    }

    /// `true` when the target already exists.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            StoreError::AlreadyExists(_)
                | StoreError::AlreadyAllocated(_)
                | StoreError::RootExists(_)
        )
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
