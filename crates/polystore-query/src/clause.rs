//! WHERE and ORDER BY clause types.

use crate::operator::Operator;
use polystore_core::{Dialect, Order, Value};

/// One WHERE condition. Conditions are joined with `AND`.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Compare {
        column: String,
        op: Operator,
        value: Value,
    },
    In {
        column: String,
        values: Vec<Value>,
    },
    Null(String),
    NotNull(String),
}

impl Condition {
    pub fn column(&self) -> &str {
        match self {
            Condition::Compare { column, .. }
            | Condition::In { column, .. }
            | Condition::Null(column)
            | Condition::NotNull(column) => column,
        }
    }

    /// Render the condition, appending its bound values to `params`.
    /// Placeholders are numbered after the values already in `params`.
    pub fn build(&self, dialect: Dialect, params: &mut Vec<Value>) -> String {
        let column = dialect.quote_qualified(self.column());
        match self {
            Condition::Compare { op, value, .. } => {
                params.push(value.clone());
                format!("{} {} {}", column, op.as_sql(), dialect.placeholder(params.len()))
            }
            // matches nothing
            Condition::In { values, .. } if values.is_empty() => "1 = 0".to_string(),
            Condition::In { values, .. } => {
                let start = params.len() + 1;
                params.extend(values.iter().cloned());
                format!("{} IN ({})", column, dialect.placeholders(start, values.len()))
            }
            Condition::Null(_) => format!("{} IS NULL", column),
            Condition::NotNull(_) => format!("{} IS NOT NULL", column),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub column: String,
    pub order: Order,
}

impl OrderBy {
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            order: Order::Asc,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            order: Order::Desc,
        }
    }

    pub fn to_sql(&self, dialect: Dialect) -> String {
        format!("{} {}", dialect.quote_qualified(&self.column), self.order.as_sql())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholders_continue_numbering() {
        let mut params = vec![Value::BigInt(1)];
        let sql = Condition::In {
            column: "id".into(),
            values: vec![Value::BigInt(2), Value::BigInt(3)],
        }
        .build(Dialect::Postgres, &mut params);
        assert_eq!(sql, "\"id\" IN ($2, $3)");
        assert_eq!(params.len(), 3);
    }

    #[test]
    fn test_empty_in_matches_nothing() {
        let mut params = Vec::new();
        let sql = Condition::In {
            column: "id".into(),
            values: Vec::new(),
        }
        .build(Dialect::MySql, &mut params);
        assert_eq!(sql, "1 = 0");
        assert!(params.is_empty());
    }

    #[test]
    fn test_order_by_quotes_column() {
        assert_eq!(OrderBy::desc("created_at").to_sql(Dialect::SqlServer), "[created_at] DESC");
    }
}
