//! Condition trees rendered into parameter-bound `WHERE` clauses.

use crate::dialect::Dialect;
use crate::error::{StorageError, StorageResult};
use crate::value::Value;

/// Comparison operators for leaf conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOperator {
    /// `=`
    Equals,
    /// `<>`
    NotEquals,
    /// `<`
    Less,
    /// `<=`
    LessOrEqual,
    /// `>`
    Greater,
    /// `>=`
    GreaterOrEqual,
    /// `IS`
    Is,
    /// `IS NOT`
    IsNot,
    /// `IN`
    In,
    /// `NOT IN`
    NotIn,
    /// `LIKE`
    Like,
}

impl CompareOperator {
    fn as_sql(self) -> &'static str {
        match self {
            CompareOperator::Equals => "=",
            CompareOperator::NotEquals => "<>",
            CompareOperator::Less => "<",
            CompareOperator::LessOrEqual => "<=",
            CompareOperator::Greater => ">",
            CompareOperator::GreaterOrEqual => ">=",
            CompareOperator::Is => "IS",
            CompareOperator::IsNot => "IS NOT",
            CompareOperator::In => "IN",
            CompareOperator::NotIn => "NOT IN",
            CompareOperator::Like => "LIKE",
        }
    }
}

/// How sibling conditions combine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogicOperator {
    /// All must hold.
    #[default]
    And,
    /// Any must hold.
    Or,
}

impl LogicOperator {
    fn as_sql(self) -> &'static str {
        match self {
            LogicOperator::And => " AND ",
            LogicOperator::Or => " OR ",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Operand {
    Value(Value),
    List(Vec<Value>),
    Column(String),
}

#[derive(Debug, Clone, PartialEq)]
enum ConditionItem {
    Compare {
        column: String,
        op: CompareOperator,
        operand: Operand,
    },
    Nested(Condition),
}

/// A node of the condition tree.
///
/// Leaves compare a column with a value, a list of values or another column.
/// Each node combines its children with its own [`LogicOperator`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Condition {
    mode: LogicOperator,
    items: Vec<ConditionItem>,
}

impl Condition {
    /// Creates an empty node with the given combinator.
    pub fn new(mode: LogicOperator) -> Self {
        Self {
            mode,
            items: Vec::new(),
        }
    }

    /// Adds `column op value`.
    pub fn add_value_condition(
        &mut self,
        column: impl Into<String>,
        op: CompareOperator,
        value: impl Into<Value>,
    ) -> &mut Self {
        self.items.push(ConditionItem::Compare {
            column: column.into(),
            op,
            operand: Operand::Value(value.into()),
        });
        self
    }

    /// Adds `column IN (values…)` or `column NOT IN (values…)`.
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
        self.items.push(ConditionItem::Compare {
            column: column.into(),
            op,
            operand: Operand::List(values.into_iter().map(Into::into).collect()),
        });
        self
    }

    /// Adds `column op column2`.
    pub fn add_column_condition(
        &mut self,
        column: impl Into<String>,
        op: CompareOperator,
        column2: impl Into<String>,
    ) -> &mut Self {
        self.items.push(ConditionItem::Compare {
            column: column.into(),
            op,
            operand: Operand::Column(column2.into()),
        });
        self
    }

    /// Adds a nested subtree.
    pub fn add_condition(&mut self, condition: Condition) -> &mut Self {
        self.items.push(ConditionItem::Nested(condition));
        self
    }

    /// Sets the combinator of this node only.
    pub fn set_sub_query_mode(&mut self, mode: LogicOperator) -> &mut Self {
        self.mode = mode;
        self
    }

    /// Returns true if the node has no children.
    pub fn is_empty(&self) -> bool {
        self.items.iter().all(|item| match item {
            ConditionItem::Compare { .. } => false,
            ConditionItem::Nested(c) => c.is_empty(),
        })
    }

    /// Renders this node, appending bound values to `binds`.
    ///
    /// Returns an empty string for an empty node.
    pub(crate) fn render(&self, dialect: Dialect, binds: &mut Vec<Value>) -> StorageResult<String> {
        let mut parts = Vec::with_capacity(self.items.len());
        for item in &self.items {
            match item {
                ConditionItem::Compare {
                    column,
                    op,
                    operand,
                } => parts.push(render_compare(column, *op, operand, dialect, binds)?),
                ConditionItem::Nested(child) => {
                    let rendered = child.render(dialect, binds)?;
                    if !rendered.is_empty() {
                        parts.push(format!("({rendered})"));
                    }
                }
            }
        }
        Ok(parts.join(self.mode.as_sql()))
    }
}

fn bind(dialect: Dialect, binds: &mut Vec<Value>, value: Value) -> String {
    binds.push(dialect.bind_value(value));
    dialect.placeholder(binds.len())
}

fn render_compare(
    column: &str,
    op: CompareOperator,
    operand: &Operand,
    dialect: Dialect,
    binds: &mut Vec<Value>,
) -> StorageResult<String> {
    use CompareOperator::{Equals, In, Is, IsNot, NotEquals, NotIn};

    match (op, operand) {
        (Equals | Is, Operand::Value(Value::Null)) => Ok(format!("{column} IS NULL")),
        (NotEquals | IsNot, Operand::Value(Value::Null)) => Ok(format!("{column} IS NOT NULL")),
        (In, Operand::List(values)) if values.is_empty() => Ok("1 = 0".to_string()),
        (NotIn, Operand::List(values)) if values.is_empty() => Ok("1 = 1".to_string()),
        (In | NotIn, Operand::List(values)) => {
            let placeholders: Vec<String> = values
                .iter()
                .map(|v| bind(dialect, binds, v.clone()))
                .collect();
            Ok(format!("{column} {} ({})", op.as_sql(), placeholders.join(", ")))
        }
        (In | NotIn, Operand::Value(value)) => {
            let placeholder = bind(dialect, binds, value.clone());
            Ok(format!("{column} {} ({placeholder})", op.as_sql()))
        }
        (_, Operand::List(_)) => Err(StorageError::InvalidQuery(format!(
            "operator {} does not take a value list",
            op.as_sql()
        ))),
        (_, Operand::Value(value)) => {
            let placeholder = bind(dialect, binds, value.clone());
            Ok(format!("{column} {} {placeholder}", op.as_sql()))
        }
        (In | NotIn, Operand::Column(_)) => Err(StorageError::InvalidQuery(format!(
            "operator {} does not take a column",
            op.as_sql()
        ))),
        (_, Operand::Column(other)) => Ok(format!("{column} {} {other}", op.as_sql())),
    }
}
