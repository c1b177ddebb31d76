use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use reef_crypto::PublicKey;
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};
use crate::os::OsStore;
use crate::traits::{BlobStore, Storehouser};

/// One [`OsStore`] per owner, each in `root/<owner public key text>`.
///
/// Opened stores are cached and shared as `Arc`s.
pub struct OsStorehouse {
    root: PathBuf,
    stores: RwLock<HashMap<String, Arc<OsStore>>>,
}

impl OsStorehouse {
    /// Use `root` as the storehouse directory, creating it if needed.
    pub fn open(root: impl AsRef<Path>) -> StoreResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            stores: RwLock::new(HashMap::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn store_root(&self, owner: &str) -> PathBuf {
        self.root.join(owner)
    }

    /// Delete the store for `owner` from disk.
    ///
    /// Fails with [`StoreError::Busy`] while any other handle to it is alive.
    pub fn remove(&self, owner: &PublicKey) -> StoreResult<()> {
        let key = owner.to_text();
        let cached = self.stores.write().expect("lock poisoned").remove(&key);
        let store = match cached {
            Some(shared) => match Arc::try_unwrap(shared) {
                Ok(store) => store,
                Err(shared) => {
                    self.stores
                        .write()
                        .expect("lock poisoned")
                        .insert(key.clone(), shared);
                    return Err(StoreError::Busy(key));
                }
            },
            None => {
                let root = self.store_root(&key);
                if !root.exists() {
                    return Err(StoreError::OwnerNotFound(key));
                }
                OsStore::open(root)?
            }
        };
        store.delete()?;
        debug!(owner = %key, "removed store");
        Ok(())
    }
}

impl Storehouser for OsStorehouse {
    type Store = OsStore;

    fn allocate(&self, owner: &PublicKey, capacity: u64) -> StoreResult<Arc<OsStore>> {
        let key = owner.to_text();
        let mut stores = self.stores.write().expect("lock poisoned");
        if stores.contains_key(&key) {
            return Err(StoreError::AlreadyAllocated(key));
        }
        let store = OsStore::create(self.store_root(&key), owner, capacity).map_err(|e| match e {
            StoreError::RootExists(_) => StoreError::AlreadyAllocated(key.clone()),
            other => other,
        })?;
        let store = Arc::new(store);
        stores.insert(key, Arc::clone(&store));
        Ok(store)
    }

    fn get(&self, owner: &PublicKey) -> StoreResult<Arc<OsStore>> {
        let key = owner.to_text();
        if let Some(store) = self.stores.read().expect("lock poisoned").get(&key) {
            return Ok(Arc::clone(store));
        }

        let mut stores = self.stores.write().expect("lock poisoned");
        if let Some(store) = stores.get(&key) {
            return Ok(Arc::clone(store));
        }
        let root = self.store_root(&key);
        if !root.is_dir() {
            return Err(StoreError::OwnerNotFound(key));
        }
        let store = Arc::new(OsStore::open(root)?);
        if store.owner() != owner {
            return Err(StoreError::Corrupt(format!(
                "store {key} records owner {}",
                store.owner()
            )));
        }
        stores.insert(key, Arc::clone(&store));
        Ok(store)
    }

    fn owners(&self) -> StoreResult<Vec<PublicKey>> {
        let mut owners = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                warn!(entry = ?entry.file_name(), "non UTF-8 entry in storehouse");
                return Err(StoreError::Corrupt(format!(
                    "storehouse entry {:?}",
                    entry.file_name()
                )));
            };
            // In-progress store setups.
            if name.starts_with('.') || !entry.file_type()?.is_dir() {
                continue;
            }
            let owner = PublicKey::from_text(name)
                .map_err(|e| StoreError::Corrupt(format!("storehouse entry {name:?}: {e}")))?;
            owners.push(owner);
        }
        owners.sort_by(|a, b| a.as_bytes().cmp(b.as_bytes()));
        Ok(owners)
    }
}

impl std::fmt::Debug for OsStorehouse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OsStorehouse")
            .field("root", &self.root)
            .field("open_stores", &self.stores.read().expect("lock poisoned").len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reef_crypto::Identity;
    use reef_types::Id;

    #[test]
    fn allocate_get_and_owners() {
        let dir = tempfile::tempdir().unwrap();
        let house = OsStorehouse::open(dir.path()).unwrap();
        let alice = Identity::generate();
        let bob = Identity::generate();

        let store = house.allocate(alice.public_key(), 1024).unwrap();
        store.put(&Id::of(b"a"), b"a").unwrap();
        house.allocate(bob.public_key(), 0).unwrap();

        let again = house.get(alice.public_key()).unwrap();
        assert!(Arc::ptr_eq(&store, &again));
        assert!(again.contains(&Id::of(b"a")).unwrap());

        let mut expected = vec![alice.public_key().clone(), bob.public_key().clone()];
        expected.sort_by(|a, b| a.as_bytes().cmp(b.as_bytes()));
        assert_eq!(house.owners().unwrap(), expected);
    }

    #[test]
    fn allocate_twice_conflicts() {
        let dir = tempfile::tempdir().unwrap();
        let house = OsStorehouse::open(dir.path()).unwrap();
        let alice = Identity::generate();
        house.allocate(alice.public_key(), 0).unwrap();
        let err = house.allocate(alice.public_key(), 0).unwrap_err();
        assert!(matches!(err, StoreError::AlreadyAllocated(_)));

        // A fresh handle on the same directory sees the store on disk.
        let other = OsStorehouse::open(dir.path()).unwrap();
        let err = other.allocate(alice.public_key(), 0).unwrap_err();
        assert!(matches!(err, StoreError::AlreadyAllocated(_)));
        assert!(other.get(alice.public_key()).is_ok());
    }

    #[test]
    fn unknown_owner_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let house = OsStorehouse::open(dir.path()).unwrap();
        let err = house.get(Identity::generate().public_key()).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn remove_requires_exclusive_handle() {
        let dir = tempfile::tempdir().unwrap();
        let house = OsStorehouse::open(dir.path()).unwrap();
        let alice = Identity::generate();
        let store = house.allocate(alice.public_key(), 0).unwrap();
        let err = house.remove(alice.public_key()).unwrap_err();
        assert!(matches!(err, StoreError::Busy(_)));

        drop(store);
        house.remove(alice.public_key()).unwrap();
        assert!(house.owners().unwrap().is_empty());
        assert!(house.get(alice.public_key()).unwrap_err().is_not_found());
    }
}
