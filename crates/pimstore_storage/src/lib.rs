//! # PimStore Storage
//!
//! Dialect-neutral statement building and relational backends.
//!
//! This crate provides:
//! - [`Condition`] trees rendered into parameter-bound `WHERE` clauses
//! - [`QueryBuilder`] for `SELECT`/`INSERT`/`UPDATE`/`DELETE`
//! - [`Dialect`] seams for SQLite, MySQL and PostgreSQL
//! - The [`Backend`] trait and the [`SqliteBackend`] implementation
//! - The [`Transaction`] guard that rolls back unless committed
//!
//! ## Example
//!
//! ```rust
//! use pimstore_storage::{schema, CompareOperator, QueryBuilder, SqliteBackend};
//!
//! let backend = SqliteBackend::open_in_memory().unwrap();
//! schema::apply(&backend).unwrap();
//!
//! let mut insert = QueryBuilder::insert("resources");
//! insert.set_column_value("name", "imap").set_column_value("is_virtual", false);
//! insert.exec(&backend).unwrap();
//!
//! let mut select = QueryBuilder::select("resources");
//! select
//!     .add_column("name")
//!     .add_value_condition("id", CompareOperator::Equals, insert.insert_id());
//! select.exec(&backend).unwrap();
//! assert_eq!(select.rows().len(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod backend;
mod builder;
mod dialect;
mod error;
mod query;
pub mod schema;
mod sqlite;
mod transaction;
mod value;

pub use backend::{Backend, ExecOutcome, Statement};
pub use builder::{QueryBuilder, QueryType, SortOrder};
pub use dialect::{ColumnType, Dialect};
pub use error::{StorageError, StorageResult};
pub use query::{CompareOperator, Condition, LogicOperator};
pub use sqlite::{SqliteBackend, DEFAULT_BUSY_TIMEOUT};
pub use transaction::Transaction;
pub use value::{Row, RowExt, Value};
