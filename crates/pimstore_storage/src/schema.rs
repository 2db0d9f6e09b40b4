//! Store table layout.
//!
//! The command engine only reads and writes these tables. Creating them is
//! an operational step (`pimstored init`, test fixtures); statements are
//! rendered through the same dialect seams as queries and are idempotent.

use crate::backend::Backend;
use crate::dialect::{ColumnType, Dialect};
use crate::error::StorageResult;
use crate::value::Value;
use tracing::info;

/// One column of a table definition.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    /// Column name.
    pub name: &'static str,
    /// Logical type.
    pub ty: ColumnType,
    /// Whether `NULL` is allowed.
    pub nullable: bool,
    /// Whether values must be unique.
    pub unique: bool,
    /// Default value, if any.
    pub default: Option<Value>,
}

impl ColumnDef {
    fn new(name: &'static str, ty: ColumnType) -> Self {
        Self {
            name,
            ty,
            nullable: false,
            unique: false,
            default: None,
        }
    }

    fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    fn render(&self, dialect: Dialect) -> String {
        let mut out = format!("{} {}", self.name, dialect.column_type(self.ty));
        if self.ty == ColumnType::PrimaryKey {
            return out;
        }
        if !self.nullable {
            out.push_str(" NOT NULL");
        }
        if self.unique {
            out.push_str(" UNIQUE");
        }
        if let Some(default) = &self.default {
            out.push_str(" DEFAULT ");
            out.push_str(&dialect.default_value(default));
        }
        out
    }
}

/// A table definition.
#[derive(Debug, Clone, PartialEq)]
pub struct TableDef {
    /// Table name.
    pub name: &'static str,
    /// Columns in declaration order.
    pub columns: Vec<ColumnDef>,
    /// Columns indexed for lookups.
    pub indexes: Vec<&'static str>,
}

impl TableDef {
    /// Renders `CREATE TABLE IF NOT EXISTS` for `dialect`.
    pub fn create_statement(&self, dialect: Dialect) -> String {
        let columns: Vec<String> = self.columns.iter().map(|c| c.render(dialect)).collect();
        format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            self.name,
            columns.join(", ")
        )
    }

    /// Renders one `CREATE INDEX IF NOT EXISTS` per indexed column.
    pub fn index_statements(&self) -> Vec<String> {
        self.indexes
            .iter()
            .map(|column| {
                format!(
                    "CREATE INDEX IF NOT EXISTS {table}_{column}_idx ON {table} ({column})",
                    table = self.name
                )
            })
            .collect()
    }
}

/// Returns the store tables in creation order.
pub fn tables() -> Vec<TableDef> {
    use ColumnType::{Binary, Bool, Integer, PrimaryKey, Text};

    let id = || ColumnDef::new("id", PrimaryKey);
    vec![
        TableDef {
            name: "resources",
            columns: vec![
                id(),
                ColumnDef::new("name", Text).unique(),
                ColumnDef::new("is_virtual", Bool).default(false),
            ],
            indexes: vec![],
        },
        TableDef {
            name: "mime_types",
            columns: vec![id(), ColumnDef::new("name", Text).unique()],
            indexes: vec![],
        },
        TableDef {
            name: "collections",
            columns: vec![
                id(),
                ColumnDef::new("remote_id", Text).nullable(),
                ColumnDef::new("remote_revision", Text).nullable(),
                ColumnDef::new("name", Text),
                ColumnDef::new("parent_id", Integer).nullable(),
                ColumnDef::new("resource_id", Integer),
                ColumnDef::new("enabled", Bool).default(true),
                ColumnDef::new("subscribed", Bool).default(true),
                ColumnDef::new("is_virtual", Bool).default(false),
                // 0 false, 1 true, 2 follow `enabled`
                ColumnDef::new("display_pref", Integer).default(2i64),
                ColumnDef::new("sync_pref", Integer).default(2i64),
                ColumnDef::new("index_pref", Integer).default(2i64),
                ColumnDef::new("cache_policy_inherit", Bool).default(true),
                ColumnDef::new("cache_policy_check_interval", Integer).default(-1i64),
                ColumnDef::new("cache_policy_cache_timeout", Integer).default(-1i64),
                ColumnDef::new("cache_policy_sync_on_demand", Bool).default(false),
                ColumnDef::new("cache_policy_local_parts", Text).default(""),
            ],
            indexes: vec!["parent_id", "resource_id", "remote_id"],
        },
        TableDef {
            name: "collection_mime_types",
            columns: vec![
                ColumnDef::new("collection_id", Integer),
                ColumnDef::new("mime_type_id", Integer),
            ],
            indexes: vec!["collection_id"],
        },
        TableDef {
            name: "collection_attributes",
            columns: vec![
                id(),
                ColumnDef::new("collection_id", Integer),
                ColumnDef::new("type", Binary),
                ColumnDef::new("value", Binary).nullable(),
            ],
            indexes: vec!["collection_id"],
        },
        TableDef {
            name: "pim_items",
            columns: vec![
                id(),
                ColumnDef::new("rev", Integer).default(0i64),
                ColumnDef::new("remote_id", Text).nullable(),
                ColumnDef::new("remote_revision", Text).nullable(),
                ColumnDef::new("collection_id", Integer),
                ColumnDef::new("mime_type_id", Integer),
                ColumnDef::new("size", Integer).default(0i64),
            ],
            indexes: vec!["collection_id", "remote_id"],
        },
        TableDef {
            name: "flags",
            columns: vec![id(), ColumnDef::new("name", Text).unique()],
            indexes: vec![],
        },
        TableDef {
            name: "pim_item_flags",
            columns: vec![
                ColumnDef::new("pim_item_id", Integer),
                ColumnDef::new("flag_id", Integer),
            ],
            indexes: vec!["pim_item_id"],
        },
        TableDef {
            name: "parts",
            columns: vec![
                id(),
                ColumnDef::new("pim_item_id", Integer),
                ColumnDef::new("name", Text),
                ColumnDef::new("data", Binary).nullable(),
                ColumnDef::new("data_size", Integer).default(0i64),
            ],
            indexes: vec!["pim_item_id"],
        },
        TableDef {
            name: "collection_pim_items",
            columns: vec![
                ColumnDef::new("collection_id", Integer),
                ColumnDef::new("pim_item_id", Integer),
            ],
            indexes: vec!["collection_id", "pim_item_id"],
        },
    ]
}

/// Creates every store table and index that does not exist yet.
pub fn apply(backend: &dyn Backend) -> StorageResult<()> {
    let dialect = backend.dialect();
    let tables = tables();
    for table in &tables {
        backend.execute_batch(&table.create_statement(dialect))?;
        for index in table.index_statements() {
            backend.execute_batch(&index)?;
        }
    }
    info!(tables = tables.len(), ?dialect, "schema applied");
    Ok(())
}
