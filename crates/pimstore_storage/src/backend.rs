//! Relational backend trait definition.

use crate::dialect::Dialect;
use crate::error::StorageResult;
use crate::value::{Row, Value};

/// A rendered, parameter-bound statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    /// SQL text with dialect placeholders.
    pub sql: String,
    /// Values bound to the placeholders, in order.
    pub binds: Vec<Value>,
}

impl Statement {
    /// Creates a statement without bound values.
    pub fn raw(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            binds: Vec::new(),
        }
    }
}

/// Outcome of a data-modifying statement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecOutcome {
    /// Rows inserted, updated or deleted.
    pub affected_rows: usize,
    /// Id assigned by the most recent insert on this connection.
    pub last_insert_id: i64,
}

/// A connection to a relational store.
///
/// Backends execute statements built by [`crate::QueryBuilder`]; they never
/// render SQL themselves. One backend value is one connection and is used by
/// a single session at a time.
///
/// # Invariants
///
/// - `begin` opens exactly one transaction; nesting is rejected by
///   [`crate::Transaction`]
/// - `commit` and `rollback` end the open transaction
/// - `in_transaction` reflects the connection state, including transactions
///   ended by the backend itself
pub trait Backend: Send {
    /// Dialect used to render statements for this backend.
    fn dialect(&self) -> Dialect;

    /// Runs a statement that returns rows.
    fn query(&self, statement: &Statement) -> StorageResult<Vec<Row>>;

    /// Runs a statement that modifies data.
    fn execute(&self, statement: &Statement) -> StorageResult<ExecOutcome>;

    /// Runs one or more unparameterized statements.
    fn execute_batch(&self, sql: &str) -> StorageResult<()>;

    /// Opens a transaction.
    fn begin(&self) -> StorageResult<()>;

    /// Commits the open transaction.
    fn commit(&self) -> StorageResult<()>;

    /// Rolls back the open transaction.
    fn rollback(&self) -> StorageResult<()>;

    /// Returns true while a transaction is open.
    fn in_transaction(&self) -> bool;
}
