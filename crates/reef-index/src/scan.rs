//! Forward-only batched scans.
//!
//! A scan runs on its own read-only connection inside a read transaction
//! opened when the scan is created, so it sees the index as it was at that
//! moment no matter what is written afterwards. Rows are fetched in batches
//! of [`BATCH_SIZE`] using keyset pagination.

use std::collections::VecDeque;
use std::path::Path;

use reef_types::Id;
use rusqlite::types::ToSql;
use rusqlite::{params, Connection, OpenFlags, Row};

use crate::error::{IndexError, IndexResult};

/// Rows fetched per round trip.
pub const BATCH_SIZE: usize = 50;

/// A row type a [`Scan`] can page through.
pub trait ScanRow: Sized {
    /// Ordering column value used to resume after a batch.
    type Cursor: ToSql;

    /// Rows at or after `?1`, ordered, at most `?2`.
    const FROM: &'static str;

    /// Rows strictly after `?1`, ordered, at most `?2`.
    const AFTER: &'static str;

    fn cursor(&self) -> Self::Cursor;

    fn from_row(row: &Row<'_>) -> IndexResult<Self>;
}

impl ScanRow for (String, String) {
    type Cursor = String;

    const FROM: &'static str = "SELECT k, v FROM kv WHERE k >= ?1 ORDER BY k LIMIT ?2";
    const AFTER: &'static str = "SELECT k, v FROM kv WHERE k > ?1 ORDER BY k LIMIT ?2";

    fn cursor(&self) -> String {
        self.0.clone()
    }

    fn from_row(row: &Row<'_>) -> IndexResult<Self> {
        Ok((row.get(0)?, row.get(1)?))
    }
}

impl ScanRow for (u64, Id) {
    type Cursor = i64;

    const FROM: &'static str =
        "SELECT counter, id FROM items WHERE counter >= ?1 ORDER BY counter LIMIT ?2";
    const AFTER: &'static str =
        "SELECT counter, id FROM items WHERE counter > ?1 ORDER BY counter LIMIT ?2";

    fn cursor(&self) -> i64 {
        self.0 as i64
    }

    fn from_row(row: &Row<'_>) -> IndexResult<Self> {
        let counter: i64 = row.get(0)?;
        let text: String = row.get(1)?;
        let id = Id::from_text(&text)
            .map_err(|e| IndexError::Corrupt(format!("item {counter}: {e}")))?;
        Ok((counter as u64, id))
    }
}

/// Scan over `kv`, yielding `(key, value)` in ascending key order.
pub type KvScan = Scan<(String, String)>;

/// Scan over `items`, yielding `(counter, id)` in ascending counter order.
pub type ItemScan = Scan<(u64, Id)>;

/// A one-shot, forward-only iterator over a snapshot of one table.
///
/// A row that fails to decode is reported after every row before it, and
/// ends the scan.
pub struct Scan<T: ScanRow> {
    conn: Connection,
    cursor: T::Cursor,
    inclusive: bool,
    remaining: usize,
    batch: VecDeque<T>,
    pending_err: Option<IndexError>,
    exhausted: bool,
}

impl<T: ScanRow> Scan<T> {
    pub(crate) fn open(path: &Path, start: T::Cursor, limit: usize) -> IndexResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.execute_batch("BEGIN")?;
        let mut scan = Self {
            conn,
            cursor: start,
            inclusive: true,
            remaining: limit,
            batch: VecDeque::with_capacity(BATCH_SIZE),
            pending_err: None,
            exhausted: false,
        };
        // The first read pins the snapshot.
        scan.fill()?;
        Ok(scan)
    }

    fn fill(&mut self) -> IndexResult<()> {
        let want = self.remaining.min(BATCH_SIZE);
        if want == 0 {
            self.exhausted = true;
            return Ok(());
        }
        let sql = if self.inclusive { T::FROM } else { T::AFTER };
        let mut fetched = Vec::with_capacity(want);
        {
            let mut stmt = self.conn.prepare_cached(sql)?;
            let mut rows = stmt.query(params![self.cursor, want as i64])?;
            while let Some(row) = rows.next()? {
                match T::from_row(row) {
                    Ok(item) => fetched.push(item),
                    Err(e) => {
                        self.pending_err = Some(e);
                        break;
                    }
                }
            }
        }
        if self.pending_err.is_some() || fetched.len() < want {
            self.exhausted = true;
        }
        self.remaining -= fetched.len();
        if let Some(last) = fetched.last() {
            self.cursor = last.cursor();
            self.inclusive = false;
        }
        self.batch.extend(fetched);
        Ok(())
    }
}

impl<T: ScanRow> Iterator for Scan<T> {
    type Item = IndexResult<T>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(row) = self.batch.pop_front() {
                return Some(Ok(row));
            }
            if let Some(e) = self.pending_err.take() {
                return Some(Err(e));
            }
            if self.exhausted {
                return None;
            }
            if let Err(e) = self.fill() {
                self.exhausted = true;
                return Some(Err(e));
            }
        }
    }
}

impl<T: ScanRow> std::fmt::Debug for Scan<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scan")
            .field("buffered", &self.batch.len())
            .field("remaining", &self.remaining)
            .field("failed", &self.pending_err.is_some())
            .field("exhausted", &self.exhausted)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::Index;
    use reef_types::Id;
    use tempfile::TempDir;

    fn filled(keys: usize) -> (TempDir, Index) {
        let dir = tempfile::tempdir().unwrap();
        let index = Index::open(dir.path().join("index.sqlite")).unwrap();
        index
            .transaction(|tx| {
                for i in 0..keys {
                    tx.set(&format!("key-{i:03}"), &i.to_string())?;
                }
                Ok::<_, crate::IndexError>(())
            })
            .unwrap();
        (dir, index)
    }

    #[test]
    fn kv_scan_is_ordered_and_limited() {
        let (_dir, index) = filled(120);
        let rows: Vec<_> = index
            .scan("key-010", 75)
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(rows.len(), 75);
        assert_eq!(rows[0], ("key-010".to_string(), "10".to_string()));
        assert_eq!(rows[74].0, "key-084");
        assert!(rows.windows(2).all(|w| w[0].0 < w[1].0));
    }

    #[test]
    fn kv_scan_includes_meta_keys_in_order() {
        let (_dir, index) = filled(3);
        let keys: Vec<String> = index
            .scan("", usize::MAX)
            .unwrap()
            .map(|row| row.unwrap().0)
            .collect();
        assert_eq!(
            keys,
            ["key-000", "key-001", "key-002", crate::META_SCHEMA_VERSION]
        );
    }

    #[test]
    fn zero_limit_yields_nothing() {
        let (_dir, index) = filled(5);
        assert_eq!(index.scan("", 0).unwrap().count(), 0);
    }

    #[test]
    fn scan_sees_snapshot_at_open() {
        let (_dir, index) = filled(120);
        let scan = index.scan("key-", usize::MAX).unwrap();
        index.set("key-500", "late").unwrap();
        index.delete("key-100").unwrap();
        let keys: Vec<String> = scan
            .map(|row| row.unwrap().0)
            .filter(|k| k.starts_with("key-"))
            .collect();
        assert_eq!(keys.len(), 120);
        assert!(keys.iter().any(|k| k == "key-100"));
        assert!(!keys.iter().any(|k| k == "key-500"));
    }

    #[test]
    fn item_scan_pages_through_batches() {
        let dir = tempfile::tempdir().unwrap();
        let index = Index::open(dir.path().join("index.sqlite")).unwrap();
        let ids: Vec<Id> = (0..130u32).map(|i| Id::of(&i.to_be_bytes())).collect();
        for id in &ids {
            index.append_item(id).unwrap();
        }
        let items: Vec<(u64, Id)> = index
            .scan_items(10, usize::MAX)
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(items.len(), 121);
        assert_eq!(items[0], (10, ids[9]));
        assert_eq!(items.last().unwrap(), &(130, ids[129]));
        assert!(items.windows(2).all(|w| w[0].0 + 1 == w[1].0));
    }

    #[test]
    fn corrupt_item_row_is_reported_after_the_rows_before_it() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.sqlite");
        let index = Index::open(&path).unwrap();
        for i in 0..55u32 {
            index.append_item(&Id::of(&i.to_be_bytes())).unwrap();
        }
        let conn = rusqlite::Connection::open(&path).unwrap();
        conn.execute("INSERT INTO items (id) VALUES ('not-an-id')", [])
            .unwrap();
        drop(conn);
        index.append_item(&Id::of(b"after")).unwrap();

        let results: Vec<_> = index.scan_items(0, usize::MAX).unwrap().collect();
        assert_eq!(results.len(), 56);
        assert!(results[..55].iter().all(Result::is_ok));
        assert_eq!(results[54].as_ref().unwrap().0, 55);
        assert!(matches!(results[55], Err(crate::IndexError::Corrupt(_))));

        // Same inside the first batch: the open succeeds and the good rows come first.
        let results: Vec<_> = index.scan_items(40, usize::MAX).unwrap().collect();
        assert_eq!(results.len(), 17);
        assert!(results[..16].iter().all(Result::is_ok));
        assert!(matches!(results[16], Err(crate::IndexError::Corrupt(_))));

        let mut scan = index.scan_items(56, usize::MAX).unwrap();
        assert!(matches!(scan.next(), Some(Err(crate::IndexError::Corrupt(_)))));
        assert!(scan.next().is_none());
    }
}
