//! Transaction guard.

use crate::backend::Backend;
use crate::error::{StorageError, StorageResult};
use tracing::{debug, warn};

/// An open transaction on one backend connection.
///
/// The guard commits only through [`Transaction::commit`]. Dropping it on any
/// other path, including early returns through `?`, rolls back.
pub struct Transaction<'a> {
    backend: &'a dyn Backend,
    finished: bool,
}

impl<'a> Transaction<'a> {
    /// Begins a transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NestedTransaction`] if the connection already
    /// has an open transaction.
    pub fn begin(backend: &'a dyn Backend) -> StorageResult<Self> {
        if backend.in_transaction() {
            return Err(StorageError::NestedTransaction);
        }
        backend.begin()?;
        debug!("transaction started");
        Ok(Self {
            backend,
            finished: false,
        })
    }

    /// The connection this transaction runs on.
    pub fn backend(&self) -> &'a dyn Backend {
        self.backend
    }

    /// Commits the transaction.
    ///
    /// If the commit fails, the guard still rolls back when dropped.
    pub fn commit(mut self) -> StorageResult<()> {
        self.backend.commit()?;
        self.finished = true;
        debug!("transaction committed");
        Ok(())
    }

    /// Rolls back the transaction explicitly.
    pub fn rollback(mut self) -> StorageResult<()> {
        self.finished = true;
        self.backend.rollback()?;
        debug!("transaction rolled back");
        Ok(())
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if self.finished || !self.backend.in_transaction() {
            return;
        }
        match self.backend.rollback() {
            Ok(()) => debug!("transaction rolled back on drop"),
            Err(e) => warn!(error = %e, "rollback on drop failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Statement;
    use crate::sqlite::SqliteBackend;
    use crate::value::Value;

    fn backend() -> SqliteBackend {
        let b = SqliteBackend::open_in_memory().unwrap();
        b.execute_batch("CREATE TABLE t (v INTEGER)").unwrap();
        b
    }

    fn insert(backend: &dyn Backend, v: i64) -> StorageResult<()> {
        backend.execute(&Statement {
            sql: "INSERT INTO t (v) VALUES (?)".into(),
            binds: vec![Value::Integer(v)],
        })?;
        Ok(())
    }

    fn count(backend: &dyn Backend) -> usize {
        backend.query(&Statement::raw("SELECT v FROM t")).unwrap().len()
    }

    #[test]
    fn commit_persists() {
        let b = backend();
        let tx = Transaction::begin(&b).unwrap();
        insert(tx.backend(), 1).unwrap();
        tx.commit().unwrap();
        assert_eq!(count(&b), 1);
        assert!(!b.in_transaction());
    }

    #[test]
    fn drop_rolls_back() {
        let b = backend();
        {
            let tx = Transaction::begin(&b).unwrap();
            insert(tx.backend(), 1).unwrap();
        }
        assert_eq!(count(&b), 0);
        assert!(!b.in_transaction());
    }

    #[test]
    fn error_path_rolls_back() {
        fn failing(b: &dyn Backend) -> StorageResult<()> {
            let tx = Transaction::begin(b)?;
            insert(tx.backend(), 1)?;
            tx.backend().execute(&Statement::raw("INSERT INTO missing VALUES (1)"))?;
            tx.commit()
        }

        let b = backend();
        assert!(failing(&b).is_err());
        assert_eq!(count(&b), 0);
    }

    #[test]
    fn nesting_is_rejected() {
        let b = backend();
        let _outer = Transaction::begin(&b).unwrap();
        assert!(matches!(
            Transaction::begin(&b),
            Err(StorageError::NestedTransaction)
        ));
    }
}
