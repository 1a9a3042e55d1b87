//! SQL flavors.

use crate::config::Backend;
use std::fmt;

/// SQL flavor used for placeholders, identifier quoting and paging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    /// MySQL (`?` placeholders, backtick quoting)
    MySql,
    /// PostgreSQL (`$1`, `$2` placeholders, double-quote quoting)
    Postgres,
    /// SQLite and libSQL (`?` placeholders, double-quote quoting)
    Sqlite,
    /// SQL Server (`@P1`, `@P2` placeholders, bracket quoting)
    SqlServer,
}

impl Dialect {
    /// Placeholder for the parameter at `index` (1-based).
    pub fn placeholder(self, index: usize) -> String {
        match self {
            Dialect::MySql | Dialect::Sqlite => "?".to_string(),
            Dialect::Postgres => format!("${index}"),
            Dialect::SqlServer => format!("@P{index}"),
        }
    }

    /// Comma-separated placeholders for parameters `start..start + count`.
    pub fn placeholders(self, start: usize, count: usize) -> String {
        (start..start + count)
            .map(|i| self.placeholder(i))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Quote one identifier, doubling embedded quote characters.
    pub fn quote_identifier(self, name: &str) -> String {
        match self {
            Dialect::MySql => format!("`{}`", name.replace('`', "``")),
            Dialect::Postgres | Dialect::Sqlite => format!("\"{}\"", name.replace('"', "\"\"")),
            Dialect::SqlServer => format!("[{}]", name.replace(']', "]]")),
        }
    }

    /// Quote a possibly qualified name (`schema.table`, `table.column`).
    ///
    /// `*` segments are left bare.
    pub fn quote_qualified(self, name: &str) -> String {
        name.split('.')
            .map(|part| {
                if part == "*" {
                    part.to_string()
                } else {
                    self.quote_identifier(part)
                }
            })
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Paging clause, or an empty string when neither bound is set.
    ///
    /// SQL Server's `OFFSET … FETCH` form needs an `ORDER BY` in front of it;
    /// callers without one must supply `ORDER BY (SELECT NULL)`.
    pub fn limit_clause(self, limit: Option<u64>, offset: Option<u64>) -> String {
        match (self, limit, offset) {
            (_, None, None) => String::new(),
            (Dialect::SqlServer, Some(n), offset) => format!(
                "OFFSET {} ROWS FETCH NEXT {} ROWS ONLY",
                offset.unwrap_or(0),
                n
            ),
            (Dialect::SqlServer, None, Some(m)) => format!("OFFSET {m} ROWS"),
            (_, Some(n), None) => format!("LIMIT {n}"),
            (_, Some(n), Some(m)) => format!("LIMIT {n} OFFSET {m}"),
            (Dialect::Postgres, None, Some(m)) => format!("OFFSET {m}"),
            (Dialect::Sqlite, None, Some(m)) => format!("LIMIT -1 OFFSET {m}"),
            (Dialect::MySql, None, Some(m)) => format!("LIMIT {} OFFSET {m}", u64::MAX),
        }
    }

    /// The relational backend whose SQL this dialect describes.
    pub const fn backend(self) -> Backend {
        match self {
            Dialect::MySql => Backend::MySql,
            Dialect::Postgres => Backend::Postgres,
            Dialect::Sqlite => Backend::Sqlite,
            Dialect::SqlServer => Backend::SqlServer,
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.backend().name())
    }
}
