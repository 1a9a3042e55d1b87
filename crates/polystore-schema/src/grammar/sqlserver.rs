//! SQL Server DDL.

use super::{Grammar, hex};
use crate::blueprint::IndexKind;
use crate::column::{Column, ColumnType};
use polystore_core::{Dialect, Result};

#[derive(Debug, Clone, Copy, Default)]
pub struct SqlServerGrammar;

impl Grammar for SqlServerGrammar {
    fn dialect(&self) -> Dialect {
        Dialect::SqlServer
    }

    fn type_sql(&self, column: &Column) -> String {
        match &column.kind {
            ColumnType::Increments | ColumnType::Integer => "INT".to_string(),
            ColumnType::BigIncrements | ColumnType::BigInteger => "BIGINT".to_string(),
            ColumnType::SmallInteger => "SMALLINT".to_string(),
            ColumnType::TinyInteger => "TINYINT".to_string(),
            ColumnType::String(n) => format!("NVARCHAR({n})"),
            ColumnType::Char(n) => format!("NCHAR({n})"),
            ColumnType::Text | ColumnType::Json => "NVARCHAR(MAX)".to_string(),
            ColumnType::Boolean => "BIT".to_string(),
            ColumnType::Float => "REAL".to_string(),
            ColumnType::Double => "FLOAT".to_string(),
            ColumnType::Decimal(p, s) => format!("DECIMAL({p}, {s})"),
            ColumnType::Date => "DATE".to_string(),
            ColumnType::DateTime | ColumnType::Timestamp => "DATETIME2".to_string(),
            ColumnType::Time => "TIME".to_string(),
            ColumnType::Binary => "VARBINARY(MAX)".to_string(),
            ColumnType::Uuid => "UNIQUEIDENTIFIER".to_string(),
        }
    }

    fn key_sql(&self, column: &Column) -> Option<String> {
        match (column.auto_increment, column.primary) {
            (true, true) => Some("IDENTITY(1,1) PRIMARY KEY".to_string()),
            (true, false) => Some("IDENTITY(1,1)".to_string()),
            (false, true) => Some("PRIMARY KEY".to_string()),
            (false, false) => None,
        }
    }

    fn string_literal(&self, value: &str) -> String {
        format!("N'{}'", value.replace('\'', "''"))
    }

    fn bytes_literal(&self, bytes: &[u8]) -> String {
        format!("0x{}", hex(bytes))
    }

    fn add_column_sql(&self, table: &str, column: &Column) -> String {
        format!("ALTER TABLE {} ADD {}", self.quote(table), self.column_sql(column))
    }

    fn change_column_sql(&self, table: &str, column: &Column) -> Result<String> {
        Ok(format!(
            "ALTER TABLE {} ALTER COLUMN {} {} {}",
            self.quote(table),
            self.quote(&column.name),
            self.type_sql(column),
            if column.nullable { "NULL" } else { "NOT NULL" }
        ))
    }

    fn rename_column_sql(&self, table: &str, from: &str, to: &str) -> String {
        format!(
            "EXEC sp_rename {}, {}, 'COLUMN'",
            self.string_literal(&format!("{table}.{from}")),
            self.string_literal(to)
        )
    }

    fn drop_index_sql(&self, table: &str, name: &str, kind: IndexKind) -> Result<String> {
        Ok(match kind {
            IndexKind::Index => format!("DROP INDEX {} ON {}", self.quote(name), self.quote(table)),
            IndexKind::Primary | IndexKind::Unique => format!(
                "ALTER TABLE {} DROP CONSTRAINT {}",
                self.quote(table),
                self.quote(name)
            ),
        })
    }

    fn rename_table_sql(&self, from: &str, to: &str) -> String {
        format!(
            "EXEC sp_rename {}, {}",
            self.string_literal(from),
            self.string_literal(to)
        )
    }

    fn tables_sql(&self) -> &'static str {
        "SELECT TABLE_NAME AS name FROM INFORMATION_SCHEMA.TABLES \
         WHERE TABLE_TYPE = 'BASE TABLE' ORDER BY TABLE_NAME"
    }

    fn columns_sql(&self) -> &'static str {
        "SELECT COLUMN_NAME AS name FROM INFORMATION_SCHEMA.COLUMNS \
         WHERE TABLE_NAME = @P1 ORDER BY ORDINAL_POSITION"
    }

    fn foreign_keys_sql(&self) -> Option<&'static str> {
        Some("SELECT OBJECT_NAME(parent_object_id) AS table_name, name FROM sys.foreign_keys")
    }

    fn disable_foreign_keys_sql(&self) -> &'static str {
        "EXEC sp_MSforeachtable 'ALTER TABLE ? NOCHECK CONSTRAINT all'"
    }

    fn enable_foreign_keys_sql(&self) -> &'static str {
        "EXEC sp_MSforeachtable 'ALTER TABLE ? WITH CHECK CHECK CONSTRAINT all'"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polystore_core::Value;

    #[test]
    fn test_identity_column() {
        let column = Column::new("id", ColumnType::Increments);
        assert_eq!(
            SqlServerGrammar.column_sql(&column),
            "[id] INT NOT NULL IDENTITY(1,1) PRIMARY KEY"
        );
    }

    #[test]
    fn test_alter_forms() {
        let mut column = Column::new("name", ColumnType::String(80));
        column.nullable().default("none");
        assert_eq!(
            SqlServerGrammar.add_column_sql("widgets", &column),
            "ALTER TABLE [widgets] ADD [name] NVARCHAR(80) NULL DEFAULT N'none'"
        );
        assert_eq!(
            SqlServerGrammar.change_column_sql("widgets", &column).unwrap(),
            "ALTER TABLE [widgets] ALTER COLUMN [name] NVARCHAR(80) NULL"
        );
        assert_eq!(
            SqlServerGrammar.rename_column_sql("widgets", "name", "title"),
            "EXEC sp_rename N'widgets.name', N'title', 'COLUMN'"
        );
        assert_eq!(
            SqlServerGrammar
                .drop_index_sql("widgets", "widgets_name_index", IndexKind::Index)
                .unwrap(),
            "DROP INDEX [widgets_name_index] ON [widgets]"
        );
    }

    #[test]
    fn test_bytes_literal() {
        assert_eq!(SqlServerGrammar.literal(&Value::Bytes(vec![0xab])), "0xab");
    }
}
