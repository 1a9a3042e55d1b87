//! PostgreSQL DDL.

use super::{Grammar, hex};
use crate::column::{Column, ColumnType};
use polystore_core::{Dialect, Result};

#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresGrammar;

impl PostgresGrammar {
    fn base_type(kind: &ColumnType) -> String {
        match kind {
            ColumnType::Increments | ColumnType::Integer => "INTEGER".to_string(),
            ColumnType::BigIncrements | ColumnType::BigInteger => "BIGINT".to_string(),
            ColumnType::SmallInteger | ColumnType::TinyInteger => "SMALLINT".to_string(),
            ColumnType::String(n) => format!("VARCHAR({n})"),
            ColumnType::Char(n) => format!("CHAR({n})"),
            ColumnType::Text => "TEXT".to_string(),
            ColumnType::Boolean => "BOOLEAN".to_string(),
            ColumnType::Float => "REAL".to_string(),
            ColumnType::Double => "DOUBLE PRECISION".to_string(),
            ColumnType::Decimal(p, s) => format!("DECIMAL({p}, {s})"),
            ColumnType::Date => "DATE".to_string(),
            ColumnType::DateTime | ColumnType::Timestamp => "TIMESTAMP".to_string(),
            ColumnType::Time => "TIME".to_string(),
            ColumnType::Json => "JSON".to_string(),
            ColumnType::Binary => "BYTEA".to_string(),
            ColumnType::Uuid => "UUID".to_string(),
        }
    }
}

impl Grammar for PostgresGrammar {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    /// Auto-incrementing integers become the matching `SERIAL` pseudo-type.
    fn type_sql(&self, column: &Column) -> String {
        if column.auto_increment {
            match column.kind {
                ColumnType::Increments | ColumnType::Integer => return "SERIAL".to_string(),
                ColumnType::BigIncrements | ColumnType::BigInteger => {
                    return "BIGSERIAL".to_string();
                }
                ColumnType::SmallInteger | ColumnType::TinyInteger => {
                    return "SMALLSERIAL".to_string();
                }
                _ => {}
            }
        }
        Self::base_type(&column.kind)
    }

    fn bool_literal(&self, value: bool) -> &'static str {
        if value { "TRUE" } else { "FALSE" }
    }

    fn bytes_literal(&self, bytes: &[u8]) -> String {
        format!("'\\x{}'", hex(bytes))
    }

    fn change_column_sql(&self, table: &str, column: &Column) -> Result<String> {
        let name = self.quote(&column.name);
        let mut actions = vec![format!(
            "ALTER COLUMN {} TYPE {}",
            name,
            Self::base_type(&column.kind)
        )];
        actions.push(format!(
            "ALTER COLUMN {} {} NOT NULL",
            name,
            if column.nullable { "DROP" } else { "SET" }
        ));
        actions.push(match self.default_sql(column) {
            Some(default) => format!("ALTER COLUMN {name} SET DEFAULT {default}"),
            None => format!("ALTER COLUMN {name} DROP DEFAULT"),
        });
        Ok(format!(
            "ALTER TABLE {} {}",
            self.quote(table),
            actions.join(", ")
        ))
    }

    fn drop_all_tables_sql(&self, tables: &[String]) -> Vec<String> {
        if tables.is_empty() {
            return Vec::new();
        }
        vec![format!("DROP TABLE {} CASCADE", self.quote_list(tables))]
    }

    fn tables_sql(&self) -> &'static str {
        "SELECT table_name AS name FROM information_schema.tables \
         WHERE table_schema = current_schema() AND table_type = 'BASE TABLE' ORDER BY table_name"
    }

    fn columns_sql(&self) -> &'static str {
        "SELECT column_name AS name FROM information_schema.columns \
         WHERE table_schema = current_schema() AND table_name = $1 ORDER BY ordinal_position"
    }

    fn disable_foreign_keys_sql(&self) -> &'static str {
        "SET CONSTRAINTS ALL DEFERRED"
    }

    fn enable_foreign_keys_sql(&self) -> &'static str {
        "SET CONSTRAINTS ALL IMMEDIATE"
    }
}
