//! Per-dialect DDL generation.
//!
//! A [`Grammar`] turns columns, index commands and foreign keys into the SQL
//! one backend understands. The provided methods produce the common ANSI
//! forms; each dialect overrides what it spells differently or refuses.

mod mysql;
mod postgres;
mod sqlite;
mod sqlserver;

pub use mysql::MySqlGrammar;
pub use postgres::PostgresGrammar;
pub use sqlite::SqliteGrammar;
pub use sqlserver::SqlServerGrammar;

use crate::blueprint::{IndexCommand, IndexKind};
use crate::column::Column;
use crate::foreign_key::ForeignKey;
use polystore_core::{Dialect, Result, Value};

/// DDL spelling for one dialect.
pub trait Grammar {
    fn dialect(&self) -> Dialect;

    fn quote(&self, name: &str) -> String {
        self.dialect().quote_identifier(name)
    }

    fn quote_list(&self, names: &[String]) -> String {
        names
            .iter()
            .map(|name| self.quote(name))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Native type name, including length and sign where the dialect has them.
    fn type_sql(&self, column: &Column) -> String;

    /// Auto-increment and primary key clause.
    fn key_sql(&self, column: &Column) -> Option<String> {
        column.primary.then(|| "PRIMARY KEY".to_string())
    }

    fn bool_literal(&self, value: bool) -> &'static str {
        if value { "1" } else { "0" }
    }

    fn string_literal(&self, value: &str) -> String {
        format!("'{}'", value.replace('\'', "''"))
    }

    fn bytes_literal(&self, bytes: &[u8]) -> String {
        format!("X'{}'", hex(bytes))
    }

    /// A value spelled as a DDL literal. Only used for column defaults.
    fn literal(&self, value: &Value) -> String {
        match value {
            Value::Null => "NULL".to_string(),
            Value::Bool(b) => self.bool_literal(*b).to_string(),
            Value::BigInt(i) => i.to_string(),
            Value::Double(f) => f.to_string(),
            Value::Text(s) => self.string_literal(s),
            Value::Bytes(b) => self.bytes_literal(b),
            Value::Json(_) | Value::Array(_) => self.string_literal(&value.to_json().to_string()),
        }
    }

    fn default_sql(&self, column: &Column) -> Option<String> {
        match &column.default {
            Some(value) => Some(self.literal(value)),
            None if column.use_current => Some("CURRENT_TIMESTAMP".to_string()),
            None => None,
        }
    }

    /// Clauses between the default and the key clause.
    fn column_modifiers(&self, _column: &Column) -> Vec<String> {
        Vec::new()
    }

    /// Clauses after the key clause.
    fn column_trailer(&self, _column: &Column) -> Vec<String> {
        Vec::new()
    }

    fn column_sql(&self, column: &Column) -> String {
        let mut parts = vec![self.quote(&column.name), self.type_sql(column)];
        parts.push(if column.nullable { "NULL" } else { "NOT NULL" }.to_string());
        if let Some(default) = self.default_sql(column) {
            parts.push(format!("DEFAULT {default}"));
        }
        parts.extend(self.column_modifiers(column));
        parts.extend(self.key_sql(column));
        parts.extend(self.column_trailer(column));
        parts.join(" ")
    }

    /// Index clause inside `CREATE TABLE`, or `None` when the index needs
    /// its own `CREATE INDEX` statement.
    fn index_clause(&self, index: &IndexCommand) -> Option<String> {
        let constraint = match index.kind {
            IndexKind::Primary => "PRIMARY KEY",
            IndexKind::Unique => "UNIQUE",
            IndexKind::Index => return None,
        };
        Some(format!(
            "CONSTRAINT {} {} ({})",
            self.quote(&index.name),
            constraint,
            self.quote_list(&index.columns)
        ))
    }

    fn foreign_clause(&self, foreign: &ForeignKey) -> Result<String> {
        let (table, references) = foreign.target()?;
        let mut sql = format!(
            "CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
            self.quote(&foreign.constraint_name()),
            self.quote_list(&foreign.columns),
            self.quote(table),
            self.quote_list(references)
        );
        if let Some(action) = foreign.on_delete {
            sql.push_str(&format!(" ON DELETE {action}"));
        }
        if let Some(action) = foreign.on_update {
            sql.push_str(&format!(" ON UPDATE {action}"));
        }
        Ok(sql)
    }

    fn create_table_sql(&self, table: &str, clauses: &[String]) -> String {
        format!("CREATE TABLE {} ({})", self.quote(table), clauses.join(", "))
    }

    fn create_index_sql(&self, table: &str, index: &IndexCommand) -> String {
        let unique = if index.kind == IndexKind::Unique { "UNIQUE " } else { "" };
        format!(
            "CREATE {}INDEX {} ON {} ({})",
            unique,
            self.quote(&index.name),
            self.quote(table),
            self.quote_list(&index.columns)
        )
    }

    fn add_column_sql(&self, table: &str, column: &Column) -> String {
        format!(
            "ALTER TABLE {} ADD COLUMN {}",
            self.quote(table),
            self.column_sql(column)
        )
    }

    fn change_column_sql(&self, table: &str, column: &Column) -> Result<String>;

    fn drop_column_sql(&self, table: &str, column: &str) -> String {
        format!(
            "ALTER TABLE {} DROP COLUMN {}",
            self.quote(table),
            self.quote(column)
        )
    }

    fn rename_column_sql(&self, table: &str, from: &str, to: &str) -> String {
        format!(
            "ALTER TABLE {} RENAME COLUMN {} TO {}",
            self.quote(table),
            self.quote(from),
            self.quote(to)
        )
    }

    fn add_index_sql(&self, table: &str, index: &IndexCommand) -> Result<String> {
        Ok(match self.index_clause(index) {
            Some(clause) if index.kind != IndexKind::Index => {
                format!("ALTER TABLE {} ADD {}", self.quote(table), clause)
            }
            _ => self.create_index_sql(table, index),
        })
    }

    fn drop_index_sql(&self, table: &str, name: &str, kind: IndexKind) -> Result<String> {
        Ok(match kind {
            IndexKind::Index => format!("DROP INDEX {}", self.quote(name)),
            IndexKind::Primary | IndexKind::Unique => format!(
                "ALTER TABLE {} DROP CONSTRAINT {}",
                self.quote(table),
                self.quote(name)
            ),
        })
    }

    fn add_foreign_sql(&self, table: &str, foreign: &ForeignKey) -> Result<String> {
        Ok(format!(
            "ALTER TABLE {} ADD {}",
            self.quote(table),
            self.foreign_clause(foreign)?
        ))
    }

    fn drop_foreign_sql(&self, table: &str, name: &str) -> Result<String> {
        Ok(format!(
            "ALTER TABLE {} DROP CONSTRAINT {}",
            self.quote(table),
            self.quote(name)
        ))
    }

    fn drop_table_sql(&self, table: &str) -> String {
        format!("DROP TABLE {}", self.quote(table))
    }

    fn drop_table_if_exists_sql(&self, table: &str) -> String {
        format!("DROP TABLE IF EXISTS {}", self.quote(table))
    }

    fn rename_table_sql(&self, from: &str, to: &str) -> String {
        format!("ALTER TABLE {} RENAME TO {}", self.quote(from), self.quote(to))
    }

    /// Statements that drop every table in `tables`.
    fn drop_all_tables_sql(&self, tables: &[String]) -> Vec<String> {
        tables.iter().map(|table| self.drop_table_sql(table)).collect()
    }

    /// Query listing the base tables of the current database, one name per row.
    fn tables_sql(&self) -> &'static str;

    /// Query listing a table's columns in ordinal order; binds the table name
    /// as its only parameter.
    fn columns_sql(&self) -> &'static str;

    /// Query yielding `(table, constraint)` rows for every foreign key, when
    /// they must be dropped before the tables can be.
    fn foreign_keys_sql(&self) -> Option<&'static str> {
        None
    }

    fn disable_foreign_keys_sql(&self) -> &'static str;

    fn enable_foreign_keys_sql(&self) -> &'static str;
}

/// The grammar for `dialect`.
pub fn grammar_for(dialect: Dialect) -> Box<dyn Grammar> {
    match dialect {
        Dialect::MySql => Box::new(MySqlGrammar),
        Dialect::Postgres => Box::new(PostgresGrammar),
        Dialect::Sqlite => Box::new(SqliteGrammar),
        Dialect::SqlServer => Box::new(SqlServerGrammar),
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::ColumnType;

    #[test]
    fn test_literals() {
        let grammar = grammar_for(Dialect::Sqlite);
        assert_eq!(grammar.literal(&Value::from("O'Brien")), "'O''Brien'");
        assert_eq!(grammar.literal(&Value::Bool(true)), "1");
        assert_eq!(grammar.literal(&Value::Bytes(vec![0xde, 0xad])), "X'dead'");
        assert_eq!(grammar.literal(&Value::Null), "NULL");
        assert_eq!(
            grammar.literal(&Value::Json(serde_json::json!({"a": 1}))),
            "'{\"a\":1}'"
        );
    }

    #[test]
    fn test_foreign_clause_includes_actions() {
        let grammar = grammar_for(Dialect::Postgres);
        let mut fk = ForeignKey::new("posts", vec!["user_id".into()]);
        fk.references("id").on("users").cascade_on_delete();
        assert_eq!(
            grammar.foreign_clause(&fk).unwrap(),
            "CONSTRAINT \"posts_user_id_foreign\" FOREIGN KEY (\"user_id\") REFERENCES \"users\" (\"id\") ON DELETE CASCADE"
        );
    }

    #[test]
    fn test_use_current_default() {
        let mut column = Column::new("created_at", ColumnType::Timestamp);
        column.nullable().use_current();
        for dialect in [Dialect::MySql, Dialect::Postgres, Dialect::Sqlite, Dialect::SqlServer] {
            let sql = column.to_sql(grammar_for(dialect).as_ref());
            assert!(sql.ends_with("NULL DEFAULT CURRENT_TIMESTAMP"), "{dialect}: {sql}");
        }
    }
}
