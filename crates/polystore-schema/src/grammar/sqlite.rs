//! SQLite DDL.

use super::Grammar;
use crate::blueprint::{IndexCommand, IndexKind};
use crate::column::{Column, ColumnType};
use crate::foreign_key::ForeignKey;
use polystore_core::{Dialect, Error, Result};

/// SQLite grammar, also used for libSQL.
///
/// SQLite cannot alter a column, a primary key or a foreign key after the
/// table exists; those forms are refused with [`Error::InvalidState`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteGrammar;

fn unsupported(what: &str) -> Error {
    Error::invalid_state(format!("sqlite cannot {what} on an existing table"))
}

impl Grammar for SqliteGrammar {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn type_sql(&self, column: &Column) -> String {
        match &column.kind {
            ColumnType::Increments
            | ColumnType::BigIncrements
            | ColumnType::Integer
            | ColumnType::BigInteger
            | ColumnType::SmallInteger
            | ColumnType::TinyInteger => "INTEGER".to_string(),
            ColumnType::String(n) => format!("VARCHAR({n})"),
            ColumnType::Char(n) => format!("CHAR({n})"),
            ColumnType::Text | ColumnType::Json => "TEXT".to_string(),
            ColumnType::Boolean => "BOOLEAN".to_string(),
            ColumnType::Float => "FLOAT".to_string(),
            ColumnType::Double => "DOUBLE".to_string(),
            ColumnType::Decimal(p, s) => format!("DECIMAL({p}, {s})"),
            ColumnType::Date => "DATE".to_string(),
            ColumnType::DateTime | ColumnType::Timestamp => "DATETIME".to_string(),
            ColumnType::Time => "TIME".to_string(),
            ColumnType::Binary => "BLOB".to_string(),
            ColumnType::Uuid => "VARCHAR(36)".to_string(),
        }
    }

    fn key_sql(&self, column: &Column) -> Option<String> {
        match (column.primary, column.auto_increment) {
            (true, true) => Some("PRIMARY KEY AUTOINCREMENT".to_string()),
            (true, false) => Some("PRIMARY KEY".to_string()),
            (false, _) => None,
        }
    }

    fn change_column_sql(&self, _table: &str, column: &Column) -> Result<String> {
        Err(unsupported(&format!("change column '{}'", column.name)))
    }

    fn add_index_sql(&self, table: &str, index: &IndexCommand) -> Result<String> {
        if index.kind == IndexKind::Primary {
            return Err(unsupported("add a primary key"));
        }
        Ok(self.create_index_sql(table, index))
    }

    fn drop_index_sql(&self, _table: &str, name: &str, kind: IndexKind) -> Result<String> {
        if kind == IndexKind::Primary {
            return Err(unsupported("drop a primary key"));
        }
        Ok(format!("DROP INDEX {}", self.quote(name)))
    }

    fn add_foreign_sql(&self, _table: &str, foreign: &ForeignKey) -> Result<String> {
        Err(unsupported(&format!(
            "add foreign key '{}'",
            foreign.constraint_name()
        )))
    }

    fn drop_foreign_sql(&self, _table: &str, name: &str) -> Result<String> {
        Err(unsupported(&format!("drop foreign key '{name}'")))
    }

    fn tables_sql(&self) -> &'static str {
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name"
    }

    fn columns_sql(&self) -> &'static str {
        "SELECT name FROM pragma_table_info(?) ORDER BY cid"
    }

    fn disable_foreign_keys_sql(&self) -> &'static str {
        "PRAGMA foreign_keys = OFF"
    }

    fn enable_foreign_keys_sql(&self) -> &'static str {
        "PRAGMA foreign_keys = ON"
    }
}
