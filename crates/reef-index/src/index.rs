//! The SQLite-backed [`Index`].

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use reef_types::Id;
use rusqlite::{Connection, TransactionBehavior};
use tracing::{debug, warn};

use crate::error::{IndexError, IndexResult};
use crate::rows;
use crate::scan::{ItemScan, KvScan, Scan};
use crate::transaction::IndexTransaction;

/// Schema version written to new indexes and required of existing ones.
pub const SCHEMA_VERSION: u32 = 1;

/// Reserved key holding the schema version.
pub const META_SCHEMA_VERSION: &str = "meta:schema_version";

/// Reserved key holding a store's capacity in bytes.
pub const META_CAPACITY: &str = "meta:capacity";

/// Reserved key holding the owning identity's public key text.
pub const META_OWNER: &str = "meta:owner";

/// Reserved key holding the bytes used by stored blobs.
pub const META_USED: &str = "meta:used";

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const CREATE_SCHEMA: &str = "
    CREATE TABLE kv (k TEXT PRIMARY KEY, v TEXT NOT NULL);
    CREATE TABLE items (counter INTEGER PRIMARY KEY AUTOINCREMENT, id TEXT NOT NULL);
";

/// A key-value map plus an append-only item sequence in one SQLite file.
///
/// The connection is shared behind a mutex, so an `Index` can be used from
/// several threads; individual calls are serialized. Use
/// [`transaction`](Self::transaction) when several writes must land together.
pub struct Index {
    conn: Mutex<Connection>,
    path: PathBuf,
}

impl Index {
    /// Open the index at `path`, creating and stamping the schema if the file
    /// is new or empty.
    ///
    /// Fails with a schema error if the file holds tables without a version
    /// stamp, a different version, or only part of the schema.
    pub fn open(path: impl AsRef<Path>) -> IndexResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut conn = Connection::open(&path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        debug!(path = %path.display(), journal_mode = %mode, "opening index");

        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let tables = {
            let mut stmt = tx.prepare(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
            )?;
            let names = stmt.query_map([], |row| row.get::<_, String>(0))?;
            names.collect::<Result<Vec<_>, _>>()?
        };

        if tables.is_empty() {
            tx.execute_batch(CREATE_SCHEMA)?;
            rows::set(&tx, META_SCHEMA_VERSION, &SCHEMA_VERSION.to_string())?;
            tx.commit()?;
            debug!(path = %path.display(), version = SCHEMA_VERSION, "created index schema");
        } else {
            check_schema(&tx, &tables)?;
            tx.commit()?;
        }

        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    /// Path of the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The stamped schema version.
    pub fn schema_version(&self) -> IndexResult<u32> {
        let raw = self.get(META_SCHEMA_VERSION)?;
        raw.parse()
            .map_err(|_| IndexError::Corrupt(format!("schema version {raw:?}")))
    }

    pub fn get(&self, key: &str) -> IndexResult<String> {
        rows::get(&self.lock(), key)
    }

    /// Like [`get`](Self::get) but absence is `Ok(None)`.
    pub fn get_optional(&self, key: &str) -> IndexResult<Option<String>> {
        rows::get_optional(&self.lock(), key)
    }

    /// Insert or replace.
    pub fn set(&self, key: &str, value: &str) -> IndexResult<()> {
        rows::set(&self.lock(), key, value)
    }

    /// Remove a key. Returns `true` if a row was removed.
    pub fn delete(&self, key: &str) -> IndexResult<bool> {
        rows::delete(&self.lock(), key)
    }

    /// Append `id` to the item sequence, returning its counter.
    pub fn append_item(&self, id: &Id) -> IndexResult<u64> {
        rows::append_item(&self.lock(), id)
    }

    /// Number of items appended so far.
    pub fn item_count(&self) -> IndexResult<u64> {
        let count: i64 = self
            .lock()
            .query_row("SELECT COUNT(*) FROM items", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Up to `limit` key-value pairs with key `>= start`, ascending.
    pub fn scan(&self, start: &str, limit: usize) -> IndexResult<KvScan> {
        Scan::open(&self.path, start.to_string(), limit)
    }

    /// Up to `limit` items with counter `>= start`, ascending.
    pub fn scan_items(&self, start: u64, limit: usize) -> IndexResult<ItemScan> {
        Scan::open(&self.path, i64::try_from(start).unwrap_or(i64::MAX), limit)
    }

    /// Run `f` inside an immediate transaction.
    ///
    /// Commits if `f` returns `Ok`; rolls back if it returns `Err`.
    pub fn transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&IndexTransaction<'_>) -> Result<T, E>,
        E: From<IndexError>,
    {
        let mut conn = self.lock();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(IndexError::from)?;
        let out = f(&IndexTransaction::new(&tx))?;
        tx.commit().map_err(IndexError::from)?;
        Ok(out)
    }

    /// Close the connection, reporting any error SQLite raises on close.
    pub fn close(self) -> IndexResult<()> {
        let conn = self.conn.into_inner().expect("lock poisoned");
        conn.close().map_err(|(_, e)| IndexError::from(e))?;
        debug!(path = %self.path.display(), "closed index");
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().expect("lock poisoned")
    }
}

fn check_schema(conn: &Connection, tables: &[String]) -> IndexResult<()> {
    let has = |name: &str| tables.iter().any(|t| t == name);
    if !has("kv") {
        warn!(?tables, "index holds tables but no kv table");
        return Err(IndexError::Unversioned);
    }
    let found = match rows::get_optional(conn, META_SCHEMA_VERSION)? {
        Some(found) => found,
        None => {
            warn!("index has no schema version stamp");
            return Err(IndexError::Unversioned);
        }
    };
    if found != SCHEMA_VERSION.to_string() {
        warn!(%found, expected = SCHEMA_VERSION, "rejecting index schema version");
        return Err(IndexError::SchemaMismatch {
            found,
            expected: SCHEMA_VERSION,
        });
    }
    if !has("items") {
        return Err(IndexError::IncompleteSchema("items"));
    }
    Ok(())
}

impl std::fmt::Debug for Index {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Index").field("path", &self.path).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_temp() -> (TempDir, Index) {
        let dir = tempfile::tempdir().unwrap();
        let index = Index::open(dir.path().join("index.sqlite")).unwrap();
        (dir, index)
    }

    #[test]
    fn new_index_is_stamped() {
        let (_dir, index) = open_temp();
        assert_eq!(index.schema_version().unwrap(), SCHEMA_VERSION);
        assert_eq!(index.item_count().unwrap(), 0);
    }

    #[test]
    fn reopen_keeps_version_and_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.sqlite");
        let index = Index::open(&path).unwrap();
        index.set("a", "1").unwrap();
        index.close().unwrap();

        let index = Index::open(&path).unwrap();
        assert_eq!(index.schema_version().unwrap(), SCHEMA_VERSION);
        assert_eq!(index.get("a").unwrap(), "1");
    }

    #[test]
    fn get_set_delete() {
        let (_dir, index) = open_temp();
        let err = index.get("missing").unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(index.get_optional("missing").unwrap(), None);

        index.set("k", "v1").unwrap();
        index.set("k", "v2").unwrap();
        assert_eq!(index.get("k").unwrap(), "v2");

        assert!(index.delete("k").unwrap());
        assert!(!index.delete("k").unwrap());
        assert!(index.get("k").unwrap_err().is_not_found());
    }

    #[test]
    fn append_item_counts_up() {
        let (_dir, index) = open_temp();
        let first = index.append_item(&Id::of(b"one")).unwrap();
        let second = index.append_item(&Id::of(b"two")).unwrap();
        assert!(second > first);
        assert_eq!(index.item_count().unwrap(), 2);
    }

    #[test]
    fn transaction_commits_together() {
        let (_dir, index) = open_temp();
        let counter = index
            .transaction(|tx| {
                tx.set("x", "1")?;
                tx.set("y", "2")?;
                tx.append_item(&Id::of(b"item"))
            })
            .unwrap();
        assert_eq!(counter, 1);
        assert_eq!(index.get("x").unwrap(), "1");
        assert_eq!(index.get("y").unwrap(), "2");
    }

    #[test]
    fn transaction_rolls_back_on_error() {
        let (_dir, index) = open_temp();
        index.set("keep", "old").unwrap();
        let result: IndexResult<()> = index.transaction(|tx| {
            tx.set("keep", "new")?;
            tx.set("extra", "1")?;
            tx.append_item(&Id::of(b"gone"))?;
            Err(IndexError::Corrupt("abort".into()))
        });
        assert!(result.is_err());
        assert_eq!(index.get("keep").unwrap(), "old");
        assert!(index.get("extra").unwrap_err().is_not_found());
        assert_eq!(index.item_count().unwrap(), 0);
    }

    #[test]
    fn transaction_delete_commits_or_rolls_back() {
        let (_dir, index) = open_temp();
        index.set("a", "1").unwrap();
        index.set("b", "2").unwrap();

        let result: IndexResult<()> = index.transaction(|tx| {
            assert!(tx.delete("a")?);
            assert!(tx.get_optional("a")?.is_none());
            Err(IndexError::Corrupt("abort".into()))
        });
        assert!(result.is_err());
        assert_eq!(index.get("a").unwrap(), "1");

        let removed = index
            .transaction(|tx| {
                let a = tx.delete("a")?;
                let missing = tx.delete("missing")?;
                tx.set("b", "3")?;
                Ok::<_, IndexError>((a, missing))
            })
            .unwrap();
        assert_eq!(removed, (true, false));
        assert!(index.get("a").unwrap_err().is_not_found());
        assert_eq!(index.get("b").unwrap(), "3");
    }

    #[test]
    fn mismatched_version_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.sqlite");
        let index = Index::open(&path).unwrap();
        index.set(META_SCHEMA_VERSION, "99").unwrap();
        drop(index);

        let err = Index::open(&path).unwrap_err();
        assert!(err.is_schema());
        assert!(matches!(err, IndexError::SchemaMismatch { found, .. } if found == "99"));
    }

    #[test]
    fn unversioned_database_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.sqlite");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch("CREATE TABLE notes (body TEXT);").unwrap();
        drop(conn);
        assert!(matches!(Index::open(&path), Err(IndexError::Unversioned)));

        let other = dir.path().join("kv-only.sqlite");
        let conn = Connection::open(&other).unwrap();
        conn.execute_batch("CREATE TABLE kv (k TEXT PRIMARY KEY, v TEXT);").unwrap();
        drop(conn);
        assert!(matches!(Index::open(&other), Err(IndexError::Unversioned)));
    }

    #[test]
    fn missing_items_table_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.sqlite");
        drop(Index::open(&path).unwrap());
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch("DROP TABLE items;").unwrap();
        drop(conn);
        assert!(matches!(
            Index::open(&path),
            Err(IndexError::IncompleteSchema("items"))
        ));
    }

    #[test]
    fn concurrent_appends_get_distinct_counters() {
        let (_dir, index) = open_temp();
        let mut counters: Vec<u64> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..4u8)
                .map(|t| {
                    let index = &index;
                    s.spawn(move || {
                        (0..25u8)
                            .map(|i| index.append_item(&Id::of(&[t, i])).unwrap())
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            handles
                .into_iter()
                .flat_map(|h| h.join().unwrap())
                .collect()
        });
        counters.sort_unstable();
        counters.dedup();
        assert_eq!(counters.len(), 100);
        assert_eq!(index.item_count().unwrap(), 100);
    }
}
