use reef_types::Id;
use rusqlite::Connection;

use crate::error::IndexResult;
use crate::rows;

/// Writes and reads inside an open transaction.
///
/// Handed to the closure passed to [`Index::transaction`](crate::Index::transaction).
/// Everything done through it commits together when the closure returns `Ok`
/// and rolls back otherwise.
pub struct IndexTransaction<'a> {
    conn: &'a Connection,
}

impl<'a> IndexTransaction<'a> {
    pub(crate) fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn get(&self, key: &str) -> IndexResult<String> {
        rows::get(self.conn, key)
    }

    pub fn get_optional(&self, key: &str) -> IndexResult<Option<String>> {
        rows::get_optional(self.conn, key)
    }

    pub fn set(&self, key: &str, value: &str) -> IndexResult<()> {
        rows::set(self.conn, key, value)
    }

    /// Returns `true` if a row was removed.
    pub fn delete(&self, key: &str) -> IndexResult<bool> {
        rows::delete(self.conn, key)
    }

    pub fn append_item(&self, id: &Id) -> IndexResult<u64> {
        rows::append_item(self.conn, id)
    }
}

impl std::fmt::Debug for IndexTransaction<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexTransaction").finish_non_exhaustive()
    }
}
