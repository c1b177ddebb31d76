//! Directory-backed blob store.
//!
//! ```text
//! root/
//!   index.sqlite     kv metadata + item sequence
//!   data/<id text>   one file per blob, owner read/write only
//!   tmp/             staging area for blobs being written
//! ```
//!
//! A blob is written to `tmp/` first and then linked into `data/` with a
//! no-clobber rename, so a reader sees either the whole blob or nothing and
//! two writers racing on one id cannot both succeed.

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use reef_crypto::PublicKey;
use reef_index::{Index, IndexTransaction, ItemScan, META_CAPACITY, META_OWNER, META_USED};
use reef_types::Id;
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};
use crate::traits::{BlobStore, IdIter};

const DATA_DIR: &str = "data";
const TMP_DIR: &str = "tmp";
const INDEX_FILE: &str = "index.sqlite";
const SETUP_PREFIX: &str = ".reef-setup-";
const STAGING_PREFIX: &str = ".put-";

/// A blob store rooted at one directory.
pub struct OsStore {
    root: PathBuf,
    index: Index,
    owner: PublicKey,
    capacity: u64,
}

impl OsStore {
    /// Create a new store at `root`, which must not exist yet.
    ///
    /// The directory tree and index are assembled in a sibling staging
    /// directory and renamed into place, so `root` either appears complete or
    /// not at all.
    pub fn create(
        root: impl AsRef<Path>,
        owner: &PublicKey,
        capacity: u64,
    ) -> StoreResult<Self> {
        let root = root.as_ref();
        if root.exists() {
            return Err(StoreError::RootExists(root.to_path_buf()));
        }
        let parent = match root.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        fs::create_dir_all(parent)?;

        let staging = tempfile::Builder::new()
            .prefix(SETUP_PREFIX)
            .tempdir_in(parent)?;
        fs::create_dir(staging.path().join(DATA_DIR))?;
        fs::create_dir(staging.path().join(TMP_DIR))?;
        let index = Index::open(staging.path().join(INDEX_FILE))?;
        index.transaction(|tx| {
            tx.set(META_CAPACITY, &capacity.to_string())?;
            tx.set(META_OWNER, &owner.to_text())?;
            tx.set(META_USED, "0")
        })?;
        index.close()?;

        fs::rename(staging.path(), root).map_err(|e| {
            if root.exists() {
                StoreError::RootExists(root.to_path_buf())
            } else {
                StoreError::Io(e)
            }
        })?;
        debug!(root = %root.display(), owner = %owner, capacity, "created store");
        Self::open(root)
    }

    /// Open an existing store.
    pub fn open(root: impl AsRef<Path>) -> StoreResult<Self> {
        let root = root.as_ref().to_path_buf();
        let index_path = root.join(INDEX_FILE);
        if !root.join(DATA_DIR).is_dir() || !index_path.is_file() {
            return Err(StoreError::NotAStore(root));
        }
        fs::create_dir_all(root.join(TMP_DIR))?;
        clear_staging(&root.join(TMP_DIR))?;

        let index = Index::open(&index_path)?;
        let owner = index.get(META_OWNER)?;
        let owner = PublicKey::from_text(&owner)
            .map_err(|e| StoreError::Corrupt(format!("owner {owner:?}: {e}")))?;
        let capacity = parse_u64(META_CAPACITY, &index.get(META_CAPACITY)?)?;
        debug!(root = %root.display(), owner = %owner, capacity, "opened store");

        Ok(Self {
            root,
            index,
            owner,
            capacity,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The store's metadata index.
    pub fn index(&self) -> &Index {
        &self.index
    }

    /// Capacity in bytes; zero means unlimited.
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Bytes used by stored blobs.
    pub fn used(&self) -> StoreResult<u64> {
        match self.index.get_optional(META_USED)? {
            Some(raw) => parse_u64(META_USED, &raw),
            None => Ok(0),
        }
    }

    /// Path of the blob for a raw id, which must be exactly 32 bytes.
    pub fn path_for(&self, id: &[u8]) -> StoreResult<PathBuf> {
        Ok(self.blob_path(&Id::from_slice(id)?))
    }

    fn blob_path(&self, id: &Id) -> PathBuf {
        self.root.join(DATA_DIR).join(id.to_text())
    }

    /// Store `data` under a raw id.
    pub fn store(&self, id: &[u8], data: &[u8]) -> StoreResult<()> {
        self.put(&Id::from_slice(id)?, data)
    }

    /// Stream a blob from `reader` into the store. Returns its length.
    ///
    /// Capacity is checked once the length is known; on any failure nothing
    /// is left behind.
    pub fn put_from<R: Read>(&self, id: &Id, mut reader: R) -> StoreResult<u64> {
        let target = self.blob_path(id);
        if target.exists() {
            return Err(StoreError::AlreadyExists(*id));
        }

        // Staging files are created 0600 and keep that mode when linked.
        let mut staged = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempfile_in(self.root.join(TMP_DIR))?;
        let len = io::copy(&mut reader, staged.as_file_mut())?;
        staged.as_file_mut().flush()?;
        staged.as_file().sync_all()?;

        let mut linked = false;
        let result = self.index.transaction(|tx| {
            let used = used_in(tx)?;
            if self.capacity > 0 && used.saturating_add(len) > self.capacity {
                return Err(StoreError::CapacityExceeded {
                    needed: len,
                    used,
                    capacity: self.capacity,
                });
            }
            staged.persist_noclobber(&target).map_err(|e| {
                if e.error.kind() == io::ErrorKind::AlreadyExists {
                    StoreError::AlreadyExists(*id)
                } else {
                    StoreError::Io(e.error)
                }
            })?;
            linked = true;
            let counter = tx.append_item(id)?;
            tx.set(META_USED, &(used + len).to_string())?;
            Ok(counter)
        });

        match result {
            Ok(counter) => {
                debug!(id = %id, len, counter, "stored blob");
                Ok(len)
            }
            Err(e) => {
                if linked {
                    if let Err(rm) = fs::remove_file(&target) {
                        warn!(id = %id, error = %rm, "failed to unlink blob after index error");
                    }
                }
                Err(e)
            }
        }
    }

    /// Open a stored blob for positional reads.
    pub fn open_blob(&self, id: &Id) -> StoreResult<File> {
        File::open(self.blob_path(id)).map_err(|e| not_found_or(e, id))
    }

    /// Items in the order they were stored, starting at `start`.
    pub fn sequence(
        &self,
        start: u64,
        limit: usize,
    ) -> StoreResult<impl Iterator<Item = StoreResult<(u64, Id)>>> {
        let scan: ItemScan = self.index.scan_items(start, limit)?;
        Ok(scan.map(|item| item.map_err(StoreError::from)))
    }

    /// Fresh pass over the data directory.
    pub fn blobs(&self) -> StoreResult<Blobs> {
        Ok(Blobs {
            entries: fs::read_dir(self.root.join(DATA_DIR))?,
        })
    }

    /// Close the index and remove the whole store from disk. Irreversible.
    pub fn delete(self) -> StoreResult<()> {
        let root = self.root;
        self.index.close()?;
        fs::remove_dir_all(&root)?;
        debug!(root = %root.display(), "deleted store");
        Ok(())
    }
}

impl BlobStore for OsStore {
    fn put(&self, id: &Id, data: &[u8]) -> StoreResult<()> {
        self.put_from(id, data).map(|_| ())
    }

    fn get(&self, id: &Id) -> StoreResult<Vec<u8>> {
        fs::read(self.blob_path(id)).map_err(|e| not_found_or(e, id))
    }

    fn contains(&self, id: &Id) -> StoreResult<bool> {
        Ok(self.blob_path(id).try_exists()?)
    }

    fn iterate(&self) -> StoreResult<IdIter<'_>> {
        Ok(Box::new(self.blobs()?))
    }

    fn size(&self) -> StoreResult<(u64, u64)> {
        Ok((self.used()?, self.capacity))
    }

    fn owner(&self) -> &PublicKey {
        &self.owner
    }
}

impl std::fmt::Debug for OsStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OsStore")
            .field("root", &self.root)
            .field("owner", &self.owner)
            .field("capacity", &self.capacity)
            .finish()
    }
}

/// Ids found in a store's data directory.
///
/// Names that do not decode to an id are yielded as
/// [`StoreError::Corrupt`].
#[derive(Debug)]
pub struct Blobs {
    entries: fs::ReadDir,
}

impl Iterator for Blobs {
    type Item = StoreResult<Id>;

    fn next(&mut self) -> Option<Self::Item> {
        let entry = match self.entries.next()? {
            Ok(entry) => entry,
            Err(e) => return Some(Err(e.into())),
        };
        let name = entry.file_name();
        let decoded = name
            .to_str()
            .ok_or_else(|| "name is not UTF-8".to_string())
            .and_then(|text| Id::from_text(text).map_err(|e| e.to_string()));
        Some(decoded.map_err(|reason| {
            warn!(entry = ?name, %reason, "undecodable blob name");
            StoreError::Corrupt(format!("blob entry {name:?}: {reason}"))
        }))
    }
}

/// Remove staging files left behind by an interrupted put.
fn clear_staging(tmp: &Path) -> StoreResult<()> {
    for entry in fs::read_dir(tmp)? {
        let entry = entry?;
        let name = entry.file_name();
        if !name.to_string_lossy().starts_with(STAGING_PREFIX) {
            continue;
        }
        match fs::remove_file(entry.path()) {
            Ok(()) => debug!(file = ?name, "removed stale staging file"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

fn used_in(tx: &IndexTransaction<'_>) -> StoreResult<u64> {
    match tx.get_optional(META_USED)? {
        Some(raw) => parse_u64(META_USED, &raw),
        None => Ok(0),
    }
}

fn parse_u64(key: &str, raw: &str) -> StoreResult<u64> {
    raw.parse()
        .map_err(|_| StoreError::Corrupt(format!("{key} = {raw:?}")))
}

fn not_found_or(err: io::Error, id: &Id) -> StoreError {
    if err.kind() == io::ErrorKind::NotFound {
        StoreError::NotFound(*id)
    } else {
        StoreError::Io(err)
    }
}
