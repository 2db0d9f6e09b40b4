//! Error types for storage operations.

use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur while building or executing statements.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The SQLite driver reported an error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A query builder was executed a second time.
    #[error("query already executed")]
    AlreadyExecuted,

    /// The builder configuration cannot be rendered.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// A result row was shorter than expected.
    #[error("result row has no column {0}")]
    MissingColumn(usize),

    /// A result column had an unexpected type.
    #[error("column {index} is not {expected}")]
    UnexpectedType {
        /// Column index.
        index: usize,
        /// Expected type name.
        expected: &'static str,
    },

    /// A transaction was requested while one is already open.
    #[error("transaction already in progress")]
    NestedTransaction,
}

impl StorageError {
    /// Returns true if the backend rejected a write because of a constraint.
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            StorageError::Sqlite(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation
        )
    }

    /// Returns true if the backend was busy or locked.
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            StorageError::Sqlite(rusqlite::Error::SqliteFailure(e, _))
                if matches!(e.code, rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked)
        )
    }
}
