use std::collections::HashMap;
use std::sync::RwLock;

use reef_crypto::PublicKey;
use reef_types::Id;

use crate::error::{StoreError, StoreResult};
use crate::traits::{BlobStore, IdIter};

/// In-memory, HashMap-based blob store.
///
/// Intended for tests and embedding. Blobs are held behind a `RwLock` and
/// copied on read and write. Follows the same conflict and capacity rules as
/// the directory-backed store.
pub struct InMemoryBlobStore {
    owner: PublicKey,
    capacity: u64,
    blobs: RwLock<HashMap<Id, Vec<u8>>>,
}

impl InMemoryBlobStore {
    /// Create an empty store. A capacity of zero means unlimited.
    pub fn new(owner: PublicKey, capacity: u64) -> Self {
        Self {
            owner,
            capacity,
            blobs: RwLock::new(HashMap::new()),
        }
    }

    /// Number of blobs currently stored.
    pub fn len(&self) -> usize {
        self.blobs.read().expect("lock poisoned").len()
    }

    /// Returns `true` if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.blobs.read().expect("lock poisoned").is_empty()
    }

    /// Total bytes across all stored blobs.
    pub fn total_bytes(&self) -> u64 {
        self.blobs
            .read()
            .expect("lock poisoned")
            .values()
            .map(|blob| blob.len() as u64)
            .sum()
    }

    /// Sorted list of all stored ids.
    pub fn all_ids(&self) -> Vec<Id> {
        let map = self.blobs.read().expect("lock poisoned");
        let mut ids: Vec<Id> = map.keys().copied().collect();
        ids.sort();
        ids
    }
}

impl BlobStore for InMemoryBlobStore {
    fn put(&self, id: &Id, data: &[u8]) -> StoreResult<()> {
        let mut map = self.blobs.write().expect("lock poisoned");
        if map.contains_key(id) {
            return Err(StoreError::AlreadyExists(*id));
        }
        let used: u64 = map.values().map(|blob| blob.len() as u64).sum();
        let needed = data.len() as u64;
        if self.capacity > 0 && used + needed > self.capacity {
            return Err(StoreError::CapacityExceeded {
                needed,
                used,
                capacity: self.capacity,
            });
        }
        map.insert(*id, data.to_vec());
        Ok(())
    }

    fn get(&self, id: &Id) -> StoreResult<Vec<u8>> {
        let map = self.blobs.read().expect("lock poisoned");
        map.get(id).cloned().ok_or(StoreError::NotFound(*id))
    }

    fn contains(&self, id: &Id) -> StoreResult<bool> {
        Ok(self.blobs.read().expect("lock poisoned").contains_key(id))
    }

    fn iterate(&self) -> StoreResult<IdIter<'_>> {
        let ids = self.all_ids();
        Ok(Box::new(ids.into_iter().map(Ok)))
    }

    fn size(&self) -> StoreResult<(u64, u64)> {
        Ok((self.total_bytes(), self.capacity))
    }

    fn owner(&self) -> &PublicKey {
        &self.owner
    }
}

impl std::fmt::Debug for InMemoryBlobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryBlobStore")
            .field("owner", &self.owner)
            .field("blob_count", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}
