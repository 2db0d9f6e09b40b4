//! Bound values and result rows.

use crate::error::{StorageError, StorageResult};

/// A value bound into a statement or read back from a row.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// SQL `NULL`.
    Null,
    /// Boolean; encoded per dialect.
    Bool(bool),
    /// 64-bit integer.
    Integer(i64),
    /// Floating point.
    Real(f64),
    /// UTF-8 text.
    Text(String),
    /// Raw bytes.
    Blob(Vec<u8>),
}

impl Value {
    /// Returns true for `NULL`.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(i64::from(v))
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Integer(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<&String> for Value {
    fn from(v: &String) -> Self {
        Value::Text(v.clone())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Blob(v)
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Blob(v.to_vec())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// One result row.
pub type Row = Vec<Value>;

/// Typed column access for result rows.
pub trait RowExt {
    /// Reads an integer column.
    fn int(&self, index: usize) -> StorageResult<i64>;
    /// Reads a nullable integer column.
    fn opt_int(&self, index: usize) -> StorageResult<Option<i64>>;
    /// Reads a text column; `NULL` reads as empty text.
    fn text(&self, index: usize) -> StorageResult<String>;
    /// Reads a boolean column stored as bool or integer.
    fn boolean(&self, index: usize) -> StorageResult<bool>;
    /// Reads a binary column; text is returned as its bytes.
    fn blob(&self, index: usize) -> StorageResult<Option<Vec<u8>>>;
}

impl RowExt for [Value] {
    fn int(&self, index: usize) -> StorageResult<i64> {
        self.opt_int(index)?.ok_or(StorageError::UnexpectedType {
            index,
            expected: "an integer",
        })
    }

    fn opt_int(&self, index: usize) -> StorageResult<Option<i64>> {
        match self.get(index) {
            Some(Value::Integer(v)) => Ok(Some(*v)),
            Some(Value::Bool(v)) => Ok(Some(i64::from(*v))),
            Some(Value::Null) => Ok(None),
            Some(_) => Err(StorageError::UnexpectedType {
                index,
                expected: "an integer",
            }),
            None => Err(StorageError::MissingColumn(index)),
        }
    }

    fn text(&self, index: usize) -> StorageResult<String> {
        match self.get(index) {
            Some(Value::Text(s)) => Ok(s.clone()),
            Some(Value::Blob(b)) => Ok(String::from_utf8_lossy(b).into_owned()),
            Some(Value::Null) => Ok(String::new()),
            Some(Value::Integer(v)) => Ok(v.to_string()),
            Some(_) => Err(StorageError::UnexpectedType {
                index,
                expected: "text",
            }),
            None => Err(StorageError::MissingColumn(index)),
        }
    }

    fn boolean(&self, index: usize) -> StorageResult<bool> {
        match self.get(index) {
            Some(Value::Bool(v)) => Ok(*v),
            Some(Value::Integer(v)) => Ok(*v != 0),
            Some(Value::Null) => Ok(false),
            Some(_) => Err(StorageError::UnexpectedType {
                index,
                expected: "a boolean",
            }),
            None => Err(StorageError::MissingColumn(index)),
        }
    }

    fn blob(&self, index: usize) -> StorageResult<Option<Vec<u8>>> {
        match self.get(index) {
            Some(Value::Blob(b)) => Ok(Some(b.clone())),
            Some(Value::Text(s)) => Ok(Some(s.clone().into_bytes())),
            Some(Value::Null) => Ok(None),
            Some(_) => Err(StorageError::UnexpectedType {
                index,
                expected: "a blob",
            }),
            None => Err(StorageError::MissingColumn(index)),
        }
    }
}
