//! Statements shared by [`Index`](crate::Index) and
//! [`IndexTransaction`](crate::IndexTransaction).

use reef_types::Id;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{IndexError, IndexResult};

pub(crate) fn get_optional(conn: &Connection, key: &str) -> IndexResult<Option<String>> {
    Ok(conn
        .query_row("SELECT v FROM kv WHERE k = ?1", params![key], |row| row.get(0))
        .optional()?)
}

pub(crate) fn get(conn: &Connection, key: &str) -> IndexResult<String> {
    get_optional(conn, key)?.ok_or_else(|| IndexError::NotFound(key.to_string()))
}

pub(crate) fn set(conn: &Connection, key: &str, value: &str) -> IndexResult<()> {
    conn.execute(
        "INSERT INTO kv (k, v) VALUES (?1, ?2) ON CONFLICT(k) DO UPDATE SET v = excluded.v",
        params![key, value],
    )?;
    Ok(())
}

pub(crate) fn delete(conn: &Connection, key: &str) -> IndexResult<bool> {
    Ok(conn.execute("DELETE FROM kv WHERE k = ?1", params![key])? > 0)
}

pub(crate) fn append_item(conn: &Connection, id: &Id) -> IndexResult<u64> {
    conn.execute("INSERT INTO items (id) VALUES (?1)", params![id.to_text()])?;
    Ok(conn.last_insert_rowid() as u64)
}
