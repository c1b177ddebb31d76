//! Error types for the index crate.

/// Errors that can occur during index operations.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// No row exists for the key.
    #[error("key not found in index: {0}")]
    NotFound(String),

    /// The database holds tables but no schema version stamp.
    #[error("index has no schema version")]
    Unversioned,

    /// The schema version stamp is not the one this build understands.
    #[error("index schema version {found} is not supported (expected {expected})")]
    SchemaMismatch { found: String, expected: u32 },

    /// A versioned index is missing one of its tables.
    #[error("index schema is missing table {0}")]
    IncompleteSchema(&'static str),

    /// A stored row could not be decoded.
    #[error("corrupt index row: {0}")]
    Corrupt(String),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl IndexError {
    /// `true` if the error only means the key is absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, IndexError::NotFound(_))
    }

    /// `true` for any schema version or shape problem found at open.
    pub fn is_schema(&self) -> bool {
        matches!(
            self,
            IndexError::Unversioned
                | IndexError::SchemaMismatch { .. }
                | IndexError::IncompleteSchema(_)
        )
    }
}

/// Convenience alias for index results.
pub type IndexResult<T> = Result<T, IndexError>;
