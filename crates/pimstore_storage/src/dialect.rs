//! SQL dialect seams.
//!
//! Statement structure is dialect-independent. Only the facts below differ
//! between backends.

use crate::value::Value;

/// Supported SQL dialects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Dialect {
    /// SQLite.
    #[default]
    Sqlite,
    /// MySQL / MariaDB.
    MySql,
    /// PostgreSQL.
    PostgreSql,
}

/// Logical column types used by the schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    /// Auto-assigned integer primary key.
    PrimaryKey,
    /// 64-bit integer.
    Integer,
    /// Boolean.
    Bool,
    /// Short text (names, remote ids).
    Text,
    /// Binary payload.
    Binary,
}

impl Dialect {
    /// Maps a driver name such as `QSQLITE3` or `postgres` to a dialect.
    pub fn from_driver_name(name: &str) -> Option<Self> {
        let name = name.to_ascii_lowercase();
        if name.contains("sqlite") {
            Some(Dialect::Sqlite)
        } else if name.contains("mysql") || name.contains("mariadb") {
            Some(Dialect::MySql)
        } else if name.contains("psql") || name.contains("postgres") {
            Some(Dialect::PostgreSql)
        } else {
            None
        }
    }

    /// Bind placeholder for the 1-based parameter `index`.
    pub fn placeholder(self, index: usize) -> String {
        match self {
            Dialect::PostgreSql => format!("${index}"),
            Dialect::Sqlite | Dialect::MySql => "?".to_string(),
        }
    }

    /// Column definition of an auto-assigned primary key.
    pub fn autoincrement_primary_key(self) -> &'static str {
        match self {
            Dialect::Sqlite => "INTEGER PRIMARY KEY AUTOINCREMENT",
            Dialect::MySql => "BIGINT NOT NULL AUTO_INCREMENT PRIMARY KEY",
            Dialect::PostgreSql => "BIGSERIAL PRIMARY KEY",
        }
    }

    /// Literal form of a boolean.
    pub fn bool_literal(self, value: bool) -> &'static str {
        match (self, value) {
            (Dialect::PostgreSql, true) => "TRUE",
            (Dialect::PostgreSql, false) => "FALSE",
            (_, true) => "1",
            (_, false) => "0",
        }
    }

    /// Column type name for a logical type.
    pub fn column_type(self, ty: ColumnType) -> &'static str {
        match (self, ty) {
            (_, ColumnType::PrimaryKey) => self.autoincrement_primary_key(),
            (Dialect::Sqlite, ColumnType::Integer) => "INTEGER",
            (_, ColumnType::Integer) => "BIGINT",
            (Dialect::PostgreSql, ColumnType::Bool) => "BOOLEAN",
            (_, ColumnType::Bool) => "BOOL",
            (Dialect::Sqlite, ColumnType::Text) => "TEXT",
            (Dialect::MySql, ColumnType::Text) => "VARBINARY(255)",
            (Dialect::PostgreSql, ColumnType::Text) => "VARCHAR(255)",
            (Dialect::Sqlite, ColumnType::Binary) => "BLOB",
            (Dialect::MySql, ColumnType::Binary) => "LONGBLOB",
            (Dialect::PostgreSql, ColumnType::Binary) => "BYTEA",
        }
    }

    /// Literal for a column default.
    pub fn default_value(self, value: &Value) -> String {
        match value {
            Value::Null => "NULL".to_string(),
            Value::Bool(b) => self.bool_literal(*b).to_string(),
            Value::Integer(i) => i.to_string(),
            Value::Real(r) => r.to_string(),
            Value::Text(s) => format!("'{}'", s.replace('\'', "''")),
            Value::Blob(_) => "NULL".to_string(),
        }
    }

    /// Converts a value into the form the driver binds.
    pub fn bind_value(self, value: Value) -> Value {
        match (self, value) {
            (Dialect::PostgreSql, v) => v,
            (_, Value::Bool(b)) => Value::Integer(i64::from(b)),
            (_, v) => v,
        }
    }

    /// Returns true if inserts report their id through a `RETURNING` clause.
    pub fn returns_insert_id(self) -> bool {
        self == Dialect::PostgreSql
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn driver_names() {
        assert_eq!(Dialect::from_driver_name("QSQLITE3"), Some(Dialect::Sqlite));
        assert_eq!(Dialect::from_driver_name("QMYSQL"), Some(Dialect::MySql));
        assert_eq!(Dialect::from_driver_name("QPSQL"), Some(Dialect::PostgreSql));
        assert_eq!(Dialect::from_driver_name("oracle"), None);
    }

    #[test]
    fn seams_differ_per_dialect() {
        assert_eq!(Dialect::Sqlite.placeholder(3), "?");
        assert_eq!(Dialect::PostgreSql.placeholder(3), "$3");
        assert_eq!(Dialect::MySql.bool_literal(true), "1");
        assert_eq!(Dialect::PostgreSql.bool_literal(false), "FALSE");
        assert_eq!(Dialect::PostgreSql.column_type(ColumnType::Binary), "BYTEA");
        assert_eq!(
            Dialect::Sqlite.default_value(&Value::Text("it's".into())),
            "'it''s'"
        );
    }

    #[test]
    fn booleans_bind_as_integers_outside_postgres() {
        assert_eq!(Dialect::Sqlite.bind_value(Value::Bool(true)), Value::Integer(1));
        assert_eq!(
            Dialect::PostgreSql.bind_value(Value::Bool(true)),
            Value::Bool(true)
        );
    }
}
