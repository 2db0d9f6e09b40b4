//! Backend-neutral statement builder.

use crate::backend::{Backend, Statement};
use crate::dialect::Dialect;
use crate::error::{StorageError, StorageResult};
use crate::query::{CompareOperator, Condition, LogicOperator};
use crate::value::{Row, RowExt, Value};
use tracing::debug;

/// Statement kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryType {
    /// `SELECT`
    Select,
    /// `INSERT`
    Insert,
    /// `UPDATE`
    Update,
    /// `DELETE`
    Delete,
}

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    /// Ascending.
    #[default]
    Ascending,
    /// Descending.
    Descending,
}

#[derive(Debug, Default)]
struct Outcome {
    rows: Vec<Row>,
    affected_rows: usize,
    insert_id: i64,
}

/// Builds one statement and executes it once.
///
/// Configuring a builder never touches a backend; only [`QueryBuilder::exec`]
/// does.
///
/// # Example
///
/// ```
/// use pimstore_storage::{CompareOperator, Dialect, QueryBuilder, SortOrder};
///
/// let mut qb = QueryBuilder::select("collections");
/// qb.add_columns(["id", "name"])
///     .add_value_condition("resource_id", CompareOperator::Equals, 3i64)
///     .add_sort_column("id", SortOrder::Ascending);
///
/// let statement = qb.build(Dialect::Sqlite).unwrap();
/// assert_eq!(
///     statement.sql,
///     "SELECT id, name FROM collections WHERE resource_id = ? ORDER BY id ASC"
/// );
/// ```
#[derive(Debug)]
pub struct QueryBuilder {
    query_type: QueryType,
    tables: Vec<String>,
    columns: Vec<String>,
    values: Vec<(String, Value)>,
    condition: Condition,
    sort: Vec<(String, SortOrder)>,
    distinct: bool,
    limit: Option<u64>,
    outcome: Option<Outcome>,
}

impl QueryBuilder {
    /// Creates an empty builder of the given type on `table`.
    pub fn new(query_type: QueryType, table: impl Into<String>) -> Self {
        Self {
            query_type,
            tables: vec![table.into()],
            columns: Vec::new(),
            values: Vec::new(),
            condition: Condition::new(LogicOperator::And),
            sort: Vec::new(),
            distinct: false,
            limit: None,
            outcome: None,
        }
    }

    /// Creates a `SELECT` builder.
    pub fn select(table: impl Into<String>) -> Self {
        Self::new(QueryType::Select, table)
    }

    /// Creates an `INSERT` builder.
    pub fn insert(table: impl Into<String>) -> Self {
        Self::new(QueryType::Insert, table)
    }

    /// Creates an `UPDATE` builder.
    pub fn update(table: impl Into<String>) -> Self {
        Self::new(QueryType::Update, table)
    }

    /// Creates a `DELETE` builder.
    pub fn delete(table: impl Into<String>) -> Self {
        Self::new(QueryType::Delete, table)
    }

    /// Returns the statement kind.
    pub fn query_type(&self) -> QueryType {
        self.query_type
    }

    /// Adds a table (`SELECT` only joins by conditions).
    pub fn add_table(&mut self, table: impl Into<String>) -> &mut Self {
        self.tables.push(table.into());
        self
    }

    /// Adds a result column.
    pub fn add_column(&mut self, column: impl Into<String>) -> &mut Self {
        self.columns.push(column.into());
        self
    }

    /// Adds several result columns.
    pub fn add_columns<I, S>(&mut self, columns: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns.extend(columns.into_iter().map(Into::into));
        self
    }

    /// Adds `column op value` to the root condition.
    pub fn add_value_condition(
        &mut self,
        column: impl Into<String>,
        op: CompareOperator,
        value: impl Into<Value>,
    ) -> &mut Self {
        self.condition.add_value_condition(column, op, value);
        self
    }

    /// Adds `column IN (…)` or `column NOT IN (…)` to the root condition.
    pub fn add_value_list_condition<I, V>(
        &mut self,
        column: impl Into<String>,
        op: CompareOperator,
        values: I,
    ) -> &mut Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.condition.add_value_list_condition(column, op, values);
        self
    }

    /// Adds `column op column2` to the root condition.
    pub fn add_column_condition(
        &mut self,
        column: impl Into<String>,
        op: CompareOperator,
        column2: impl Into<String>,
    ) -> &mut Self {
        self.condition.add_column_condition(column, op, column2);
        self
    }

    /// Adds a subtree to the root condition.
    pub fn add_condition(&mut self, condition: Condition) -> &mut Self {
        self.condition.add_condition(condition);
        self
    }

    /// Sets the combinator of the root condition only.
    ///
    /// Conditions added directly to the builder are joined with `mode`.
    /// For a different combinator on a nested level, build a [`Condition`],
    /// call [`Condition::set_sub_query_mode`] on it and pass it to
    /// [`add_condition`](Self::add_condition).
    pub fn set_sub_query_mode(&mut self, mode: LogicOperator) -> &mut Self {
        self.condition.set_sub_query_mode(mode);
        self
    }

    /// Appends a sort key.
    pub fn add_sort_column(&mut self, column: impl Into<String>, order: SortOrder) -> &mut Self {
        self.sort.push((column.into(), order));
        self
    }

    /// Assigns a column value (`INSERT` and `UPDATE`).
    pub fn set_column_value(
        &mut self,
        column: impl Into<String>,
        value: impl Into<Value>,
    ) -> &mut Self {
        let column = column.into();
        let value = value.into();
        match self.values.iter_mut().find(|(c, _)| *c == column) {
            Some(slot) => slot.1 = value,
            None => self.values.push((column, value)),
        }
        self
    }

    /// Requests `SELECT DISTINCT`.
    pub fn set_distinct(&mut self, distinct: bool) -> &mut Self {
        self.distinct = distinct;
        self
    }

    /// Limits the number of result rows.
    pub fn set_limit(&mut self, limit: u64) -> &mut Self {
        self.limit = Some(limit);
        self
    }

    /// Renders the statement for `dialect`.
    pub fn build(&self, dialect: Dialect) -> StorageResult<Statement> {
        let mut binds = Vec::new();
        let mut sql = match self.query_type {
            QueryType::Select => {
                if self.columns.is_empty() {
                    return Err(StorageError::InvalidQuery("select without columns".into()));
                }
                format!(
                    "SELECT {}{} FROM {}",
                    if self.distinct { "DISTINCT " } else { "" },
                    self.columns.join(", "),
                    self.tables.join(", ")
                )
            }
            QueryType::Insert => {
                let table = self.single_table()?;
                if self.values.is_empty() {
                    return Err(StorageError::InvalidQuery("insert without values".into()));
                }
                let columns: Vec<&str> = self.values.iter().map(|(c, _)| c.as_str()).collect();
                let placeholders: Vec<String> = self
                    .values
                    .iter()
                    .map(|(_, v)| {
                        binds.push(dialect.bind_value(v.clone()));
                        dialect.placeholder(binds.len())
                    })
                    .collect();
                let mut sql = format!(
                    "INSERT INTO {table} ({}) VALUES ({})",
                    columns.join(", "),
                    placeholders.join(", ")
                );
                if dialect.returns_insert_id() {
                    sql.push_str(" RETURNING id");
                }
                sql
            }
            QueryType::Update => {
                let table = self.single_table()?;
                if self.values.is_empty() {
                    return Err(StorageError::InvalidQuery("update without values".into()));
                }
                let assignments: Vec<String> = self
                    .values
                    .iter()
                    .map(|(c, v)| {
                        binds.push(dialect.bind_value(v.clone()));
                        format!("{c} = {}", dialect.placeholder(binds.len()))
                    })
                    .collect();
                format!("UPDATE {table} SET {}", assignments.join(", "))
            }
            QueryType::Delete => format!("DELETE FROM {}", self.single_table()?),
        };

        if self.query_type != QueryType::Insert {
            let filter = self.condition.render(dialect, &mut binds)?;
            if !filter.is_empty() {
                sql.push_str(" WHERE ");
                sql.push_str(&filter);
            }
        }

        if self.query_type == QueryType::Select {
            if !self.sort.is_empty() {
                let keys: Vec<String> = self
                    .sort
                    .iter()
                    .map(|(column, order)| match order {
                        SortOrder::Ascending => format!("{column} ASC"),
                        SortOrder::Descending => format!("{column} DESC"),
                    })
                    .collect();
                sql.push_str(" ORDER BY ");
                sql.push_str(&keys.join(", "));
            }
            if let Some(limit) = self.limit {
                sql.push_str(&format!(" LIMIT {limit}"));
            }
        }

        Ok(Statement { sql, binds })
    }

    fn single_table(&self) -> StorageResult<&str> {
        match self.tables.as_slice() {
            [table] => Ok(table),
            _ => Err(StorageError::InvalidQuery(format!(
                "{:?} needs exactly one table",
                self.query_type
            ))),
        }
    }

    /// Executes the statement on `backend`.
    ///
    /// A builder executes at most once; later calls fail with
    /// [`StorageError::AlreadyExecuted`].
    pub fn exec(&mut self, backend: &dyn Backend) -> StorageResult<()> {
        if self.outcome.is_some() {
            return Err(StorageError::AlreadyExecuted);
        }
        self.outcome = Some(Outcome::default());

        let dialect = backend.dialect();
        let statement = self.build(dialect)?;
        debug!(sql = %statement.sql, binds = statement.binds.len(), "exec");

        let outcome = match self.query_type {
            QueryType::Select => Outcome {
                rows: backend.query(&statement)?,
                ..Outcome::default()
            },
            QueryType::Insert if dialect.returns_insert_id() => {
                let rows = backend.query(&statement)?;
                let insert_id = match rows.first() {
                    Some(row) => row.int(0)?,
                    None => -1,
                };
                Outcome {
                    affected_rows: rows.len(),
                    insert_id,
                    ..Outcome::default()
                }
            }
            QueryType::Insert => {
                let done = backend.execute(&statement)?;
                Outcome {
                    affected_rows: done.affected_rows,
                    insert_id: done.last_insert_id,
                    ..Outcome::default()
                }
            }
            QueryType::Update | QueryType::Delete => Outcome {
                affected_rows: backend.execute(&statement)?.affected_rows,
                ..Outcome::default()
            },
        };
        self.outcome = Some(outcome);
        Ok(())
    }

    /// Result rows of an executed `SELECT`.
    pub fn rows(&self) -> &[Row] {
        self.outcome.as_ref().map_or(&[], |o| o.rows.as_slice())
    }

    /// Takes the result rows of an executed `SELECT`.
    pub fn into_rows(self) -> Vec<Row> {
        self.outcome.map(|o| o.rows).unwrap_or_default()
    }

    /// Rows affected by an executed `INSERT`, `UPDATE` or `DELETE`.
    pub fn affected_rows(&self) -> usize {
        self.outcome.as_ref().map_or(0, |o| o.affected_rows)
    }

    /// Id assigned by an executed `INSERT`; `-1` for every other statement.
    pub fn insert_id(&self) -> i64 {
        match (&self.outcome, self.query_type) {
            (Some(o), QueryType::Insert) => o.insert_id,
            _ => -1,
        }
    }
}
