//! SQLite backend on top of `rusqlite`.

use crate::backend::{Backend, ExecOutcome, Statement};
use crate::dialect::Dialect;
use crate::error::StorageResult;
use crate::value::{Row, Value};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection};
use std::path::Path;
use std::time::Duration;

/// Busy timeout applied by [`SqliteBackend::open`].
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// A single SQLite connection.
///
/// Each session opens its own connection to the shared database file; SQLite
/// serializes writers at transaction granularity.
pub struct SqliteBackend {
    conn: Connection,
}

impl SqliteBackend {
    /// Opens (or creates) the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        Self::open_with_busy_timeout(path, DEFAULT_BUSY_TIMEOUT)
    }

    /// Opens the database with a specific busy timeout.
    pub fn open_with_busy_timeout(path: impl AsRef<Path>, timeout: Duration) -> StorageResult<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(timeout)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        Ok(Self { conn })
    }

    /// Opens a private in-memory database.
    pub fn open_in_memory() -> StorageResult<Self> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
        })
    }
}

fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Integer(i) => SqlValue::Integer(*i),
        Value::Real(r) => SqlValue::Real(*r),
        Value::Text(s) => SqlValue::Text(s.clone()),
        Value::Blob(b) => SqlValue::Blob(b.clone()),
    }
}

fn from_sql(value: SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Integer(i) => Value::Integer(i),
        SqlValue::Real(r) => Value::Real(r),
        SqlValue::Text(s) => Value::Text(s),
        SqlValue::Blob(b) => Value::Blob(b),
    }
}

impl Backend for SqliteBackend {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn query(&self, statement: &Statement) -> StorageResult<Vec<Row>> {
        let mut stmt = self.conn.prepare_cached(&statement.sql)?;
        let width = stmt.column_count();
        let mut rows = stmt.query(params_from_iter(statement.binds.iter().map(to_sql)))?;

        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(width);
            for i in 0..width {
                values.push(from_sql(row.get::<_, SqlValue>(i)?));
            }
            out.push(values);
        }
        Ok(out)
    }

    fn execute(&self, statement: &Statement) -> StorageResult<ExecOutcome> {
        let mut stmt = self.conn.prepare_cached(&statement.sql)?;
        let affected_rows = stmt.execute(params_from_iter(statement.binds.iter().map(to_sql)))?;
        Ok(ExecOutcome {
            affected_rows,
            last_insert_id: self.conn.last_insert_rowid(),
        })
    }

    fn execute_batch(&self, sql: &str) -> StorageResult<()> {
        self.conn.execute_batch(sql)?;
        Ok(())
    }

    fn begin(&self) -> StorageResult<()> {
        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        Ok(())
    }

    fn commit(&self) -> StorageResult<()> {
        self.conn.execute_batch("COMMIT")?;
        Ok(())
    }

    fn rollback(&self) -> StorageResult<()> {
        self.conn.execute_batch("ROLLBACK")?;
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        !self.conn.is_autocommit()
    }
}
