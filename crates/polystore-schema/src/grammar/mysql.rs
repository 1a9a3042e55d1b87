//! MySQL DDL.

use super::Grammar;
use crate::blueprint::{IndexCommand, IndexKind};
use crate::column::{Column, ColumnType};
use polystore_core::{Dialect, Result};

/// MySQL 8 grammar. Indexes are declared inline and columns can carry
/// comments, `ON UPDATE` timestamps and `AFTER` placement.
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlGrammar;

impl MySqlGrammar {
    fn placed(&self, sql: String, column: &Column) -> String {
        match &column.after {
            Some(after) => format!("{} AFTER {}", sql, self.quote(after)),
            None => sql,
        }
    }
}

impl Grammar for MySqlGrammar {
    fn dialect(&self) -> Dialect {
        Dialect::MySql
    }

    fn type_sql(&self, column: &Column) -> String {
        let base = match &column.kind {
            ColumnType::Increments | ColumnType::Integer => "INT".to_string(),
            ColumnType::BigIncrements | ColumnType::BigInteger => "BIGINT".to_string(),
            ColumnType::SmallInteger => "SMALLINT".to_string(),
            ColumnType::TinyInteger => "TINYINT".to_string(),
            ColumnType::String(n) => format!("VARCHAR({n})"),
            ColumnType::Char(n) => format!("CHAR({n})"),
            ColumnType::Text => "TEXT".to_string(),
            ColumnType::Boolean => "TINYINT(1)".to_string(),
            ColumnType::Float => "FLOAT".to_string(),
            ColumnType::Double => "DOUBLE".to_string(),
            ColumnType::Decimal(p, s) => format!("DECIMAL({p}, {s})"),
            ColumnType::Date => "DATE".to_string(),
            ColumnType::DateTime => "DATETIME".to_string(),
            ColumnType::Timestamp => "TIMESTAMP".to_string(),
            ColumnType::Time => "TIME".to_string(),
            ColumnType::Json => "JSON".to_string(),
            ColumnType::Binary => "BLOB".to_string(),
            ColumnType::Uuid => "CHAR(36)".to_string(),
        };
        if column.unsigned && column.kind.is_integer() {
            format!("{base} UNSIGNED")
        } else {
            base
        }
    }

    fn key_sql(&self, column: &Column) -> Option<String> {
        match (column.auto_increment, column.primary) {
            (true, true) => Some("AUTO_INCREMENT PRIMARY KEY".to_string()),
            (true, false) => Some("AUTO_INCREMENT".to_string()),
            (false, true) => Some("PRIMARY KEY".to_string()),
            (false, false) => None,
        }
    }

    fn string_literal(&self, value: &str) -> String {
        format!("'{}'", value.replace('\\', "\\\\").replace('\'', "''"))
    }

    fn column_modifiers(&self, column: &Column) -> Vec<String> {
        if column.use_current_on_update {
            vec!["ON UPDATE CURRENT_TIMESTAMP".to_string()]
        } else {
            Vec::new()
        }
    }

    fn column_trailer(&self, column: &Column) -> Vec<String> {
        column
            .comment
            .iter()
            .map(|comment| format!("COMMENT {}", self.string_literal(comment)))
            .collect()
    }

    fn index_clause(&self, index: &IndexCommand) -> Option<String> {
        let columns = self.quote_list(&index.columns);
        Some(match index.kind {
            IndexKind::Primary => format!("PRIMARY KEY ({columns})"),
            IndexKind::Unique => format!("UNIQUE {} ({})", self.quote(&index.name), columns),
            IndexKind::Index => format!("INDEX {} ({})", self.quote(&index.name), columns),
        })
    }

    fn add_column_sql(&self, table: &str, column: &Column) -> String {
        let sql = format!(
            "ALTER TABLE {} ADD COLUMN {}",
            self.quote(table),
            self.column_sql(column)
        );
        self.placed(sql, column)
    }

    fn change_column_sql(&self, table: &str, column: &Column) -> Result<String> {
        let sql = format!(
            "ALTER TABLE {} MODIFY {}",
            self.quote(table),
            self.column_sql(column)
        );
        Ok(self.placed(sql, column))
    }

    fn add_index_sql(&self, table: &str, index: &IndexCommand) -> Result<String> {
        let clause = self.index_clause(index).unwrap_or_default();
        Ok(format!("ALTER TABLE {} ADD {}", self.quote(table), clause))
    }

    fn drop_index_sql(&self, table: &str, name: &str, kind: IndexKind) -> Result<String> {
        Ok(match kind {
            IndexKind::Primary => format!("ALTER TABLE {} DROP PRIMARY KEY", self.quote(table)),
            IndexKind::Unique | IndexKind::Index => format!(
                "ALTER TABLE {} DROP INDEX {}",
                self.quote(table),
                self.quote(name)
            ),
        })
    }

    fn drop_foreign_sql(&self, table: &str, name: &str) -> Result<String> {
        Ok(format!(
            "ALTER TABLE {} DROP FOREIGN KEY {}",
            self.quote(table),
            self.quote(name)
        ))
    }

    fn rename_table_sql(&self, from: &str, to: &str) -> String {
        format!("RENAME TABLE {} TO {}", self.quote(from), self.quote(to))
    }

    fn tables_sql(&self) -> &'static str {
        "SELECT table_name AS name FROM information_schema.tables \
         WHERE table_schema = DATABASE() AND table_type = 'BASE TABLE' ORDER BY table_name"
    }

    fn columns_sql(&self) -> &'static str {
        "SELECT column_name AS name FROM information_schema.columns \
         WHERE table_schema = DATABASE() AND table_name = ? ORDER BY ordinal_position"
    }

    fn disable_foreign_keys_sql(&self) -> &'static str {
        "SET FOREIGN_KEY_CHECKS = 0"
    }

    fn enable_foreign_keys_sql(&self) -> &'static str {
        "SET FOREIGN_KEY_CHECKS = 1"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_increments_column() {
        let column = Column::new("id", ColumnType::BigIncrements);
        assert_eq!(
            MySqlGrammar.column_sql(&column),
            "`id` BIGINT UNSIGNED NOT NULL AUTO_INCREMENT PRIMARY KEY"
        );
    }

    #[test]
    fn test_mysql_only_modifiers() {
        let mut column = Column::new("updated_at", ColumnType::Timestamp);
        column
            .nullable()
            .use_current()
            .use_current_on_update()
            .comment("touched")
            .after("name");
        assert_eq!(
            MySqlGrammar.add_column_sql("widgets", &column),
            "ALTER TABLE `widgets` ADD COLUMN `updated_at` TIMESTAMP NULL DEFAULT CURRENT_TIMESTAMP \
             ON UPDATE CURRENT_TIMESTAMP COMMENT 'touched' AFTER `name`"
        );
    }

    #[test]
    fn test_string_literal_escapes_backslash() {
        assert_eq!(MySqlGrammar.string_literal("a\\'b"), "'a\\\\''b'");
    }

    #[test]
    fn test_index_forms() {
        let index = IndexCommand {
            kind: IndexKind::Index,
            name: "widgets_name_index".into(),
            columns: vec!["name".into()],
        };
        assert_eq!(
            MySqlGrammar.index_clause(&index).unwrap(),
            "INDEX `widgets_name_index` (`name`)"
        );
        assert_eq!(
            MySqlGrammar.add_index_sql("widgets", &index).unwrap(),
            "ALTER TABLE `widgets` ADD INDEX `widgets_name_index` (`name`)"
        );
        assert_eq!(
            MySqlGrammar
                .drop_index_sql("widgets", "widgets_pkey", IndexKind::Primary)
                .unwrap(),
            "ALTER TABLE `widgets` DROP PRIMARY KEY"
        );
        assert_eq!(
            MySqlGrammar.drop_foreign_sql("posts", "posts_user_id_foreign").unwrap(),
            "ALTER TABLE `posts` DROP FOREIGN KEY `posts_user_id_foreign`"
        );
    }
}
