use std::sync::Arc;

use reef_crypto::PublicKey;
use reef_types::Id;

use crate::error::StoreResult;

/// Iterator over stored ids.
pub type IdIter<'a> = Box<dyn Iterator<Item = StoreResult<Id>> + 'a>;

/// Content-addressed blob store.
///
/// All implementations must satisfy these invariants:
/// - A blob is immutable once stored. Storing under an existing id fails with
///   [`StoreError::AlreadyExists`](crate::StoreError::AlreadyExists) and keeps
///   the first blob.
/// - A blob is either fully present or absent; readers never see a partial one.
/// - The store never interprets blob contents.
/// - All I/O errors are propagated, never silently ignored.
pub trait BlobStore: Send + Sync {
    /// Store `data` under `id`.
    fn put(&self, id: &Id, data: &[u8]) -> StoreResult<()>;

    /// Read a whole blob.
    fn get(&self, id: &Id) -> StoreResult<Vec<u8>>;

    fn contains(&self, id: &Id) -> StoreResult<bool>;

    /// Every stored id, in no particular order.
    ///
    /// Each call starts a fresh, finite pass. Entries that cannot be decoded
    /// are reported as errors, not skipped.
    fn iterate(&self) -> StoreResult<IdIter<'_>>;

    /// `(used, capacity)` in bytes. A capacity of zero means unlimited.
    fn size(&self) -> StoreResult<(u64, u64)>;

    /// The identity that owns this store.
    fn owner(&self) -> &PublicKey;
}

/// Manages one [`BlobStore`] per owning identity.
pub trait Storehouser: Send + Sync {
    type Store: BlobStore;

    /// Create a store for `owner`. Fails if one already exists.
    fn allocate(&self, owner: &PublicKey, capacity: u64) -> StoreResult<Arc<Self::Store>>;

    /// The store for `owner`.
    fn get(&self, owner: &PublicKey) -> StoreResult<Arc<Self::Store>>;

    /// Owners with an allocated store.
    fn owners(&self) -> StoreResult<Vec<PublicKey>>;
}
