//! Migrations and where they come from.

use polystore_core::{DataAccess, Error, Result};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

/// A named, reversible schema change.
///
/// Names order migrations lexically, so they are conventionally prefixed
/// with a timestamp or sequence number (`0001_create_users`).
pub trait Migration {
    fn name(&self) -> &str;

    fn up(&self, db: &mut dyn DataAccess) -> Result<()>;

    fn down(&self, db: &mut dyn DataAccess) -> Result<()>;

    /// The statements `up` executes, if they are known without running it.
    fn up_statements(&self) -> Option<&[String]> {
        None
    }
}

/// A migration made of plain SQL statements, usually loaded from a
/// `<name>.up.sql` / `<name>.down.sql` file pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlMigration {
    name: String,
    up: Vec<String>,
    down: Vec<String>,
}

impl SqlMigration {
    /// Build from two SQL scripts, split with [`split_statements`].
    pub fn new(name: impl Into<String>, up: &str, down: &str) -> Result<Self> {
        let name = name.into();
        validate_name(&name)?;
        Ok(Self {
            name,
            up: split_statements(up),
            down: split_statements(down),
        })
    }

    pub fn down_statements(&self) -> &[String] {
        &self.down
    }
}

fn execute_all(db: &mut dyn DataAccess, name: &str, statements: &[String]) -> Result<()> {
    for sql in statements {
        tracing::debug!(migration = name, sql = %sql, "migration statement");
        db.execute(sql, &[])?;
    }
    Ok(())
}

impl Migration for SqlMigration {
    fn name(&self) -> &str {
        &self.name
    }

    fn up(&self, db: &mut dyn DataAccess) -> Result<()> {
        execute_all(db, &self.name, &self.up)
    }

    fn down(&self, db: &mut dyn DataAccess) -> Result<()> {
        execute_all(db, &self.name, &self.down)
    }

    fn up_statements(&self) -> Option<&[String]> {
        Some(&self.up)
    }
}

/// Split a script into statements.
///
/// A statement ends at a line whose last non-blank character is `;`. Lines
/// starting with `--` are dropped. Trailing text without a `;` is one more
/// statement.
///
/// The split is line based and does not parse SQL. A line of a multi-line
/// string literal that ends in `;` ends the statement there. Several
/// statements on one line stay one statement, which only the SQLite driver
/// runs as a batch; put one statement per line for the other backends.
pub fn split_statements(script: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    for line in script.lines() {
        if line.trim_start().starts_with("--") {
            continue;
        }
        let trimmed = line.trim_end();
        if let Some(body) = trimmed.strip_suffix(';') {
            current.push_str(body);
            let statement = current.trim();
            if !statement.is_empty() {
                statements.push(statement.to_string());
            }
            current.clear();
        } else {
            current.push_str(trimmed);
            current.push('\n');
        }
    }
    let rest = current.trim();
    if !rest.is_empty() {
        statements.push(rest.to_string());
    }
    statements
}

fn validate_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(Error::invalid_state(format!(
            "invalid migration name '{name}': use letters, digits, '_' and '-'"
        )))
    }
}

/// The migrations available to a [`Migrator`](crate::Migrator), keyed and
/// ordered by name.
#[derive(Default)]
pub struct MigrationSet {
    migrations: BTreeMap<String, Box<dyn Migration>>,
}

impl fmt::Debug for MigrationSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.migrations.keys()).finish()
    }
}

impl MigrationSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Discover `<name>.up.sql` / `<name>.down.sql` pairs in `dir`.
    pub fn from_directory(dir: impl AsRef<Path>) -> Result<Self> {
        let mut set = Self::new();
        set.load_directory(dir)?;
        Ok(set)
    }

    /// Register a migration. Names must be unique.
    pub fn add(&mut self, migration: impl Migration + 'static) -> Result<()> {
        let name = migration.name().to_string();
        validate_name(&name)?;
        if self.migrations.contains_key(&name) {
            return Err(Error::invalid_state(format!(
                "migration '{name}' is registered twice"
            )));
        }
        self.migrations.insert(name, Box::new(migration));
        Ok(())
    }

    /// Add every SQL file pair in `dir` and return how many were found.
    ///
    /// Files without a `.sql` extension are ignored. A `.sql` file that is not
    /// an `up` or `down` half, a pair missing one half, or an invalid name is
    /// an [`Error::InvalidState`].
    pub fn load_directory(&mut self, dir: impl AsRef<Path>) -> Result<usize> {
        let mut halves: BTreeMap<String, (Option<String>, Option<String>)> = BTreeMap::new();
        for entry in fs::read_dir(dir.as_ref())? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some(stem) = file_name.strip_suffix(".sql") else {
                continue;
            };
            let (name, is_up) = if let Some(name) = stem.strip_suffix(".up") {
                (name, true)
            } else if let Some(name) = stem.strip_suffix(".down") {
                (name, false)
            } else {
                return Err(Error::invalid_state(format!(
                    "migration file '{file_name}' must end in .up.sql or .down.sql"
                )));
            };
            validate_name(name)?;
            let script = fs::read_to_string(&path)?;
            let slot = halves.entry(name.to_string()).or_default();
            if is_up {
                slot.0 = Some(script);
            } else {
                slot.1 = Some(script);
            }
        }

        let found = halves.len();
        for (name, halves) in halves {
            match halves {
                (Some(up), Some(down)) => self.add(SqlMigration::new(name, &up, &down)?)?,
                (None, _) => {
                    return Err(Error::invalid_state(format!(
                        "migration '{name}' has no {name}.up.sql"
                    )));
                }
                (_, None) => {
                    return Err(Error::invalid_state(format!(
                        "migration '{name}' has no {name}.down.sql"
                    )));
                }
            }
        }
        tracing::debug!(dir = %dir.as_ref().display(), found, "discovered migrations");
        Ok(found)
    }

    pub fn get(&self, name: &str) -> Option<&dyn Migration> {
        self.migrations.get(name).map(|m| &**m)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.migrations.contains_key(name)
    }

    /// Names in lexical order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.migrations.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_split_statements() {
        let script = "-- create things\n\
                      CREATE TABLE a (\n    id INTEGER\n);\n\
                      \n\
                      INSERT INTO a VALUES (1);  \n\
                      -- trailing comment\n\
                      UPDATE a SET id = 2";
        assert_eq!(
            split_statements(script),
            vec![
                "CREATE TABLE a (\n    id INTEGER\n)",
                "INSERT INTO a VALUES (1)",
                "UPDATE a SET id = 2",
            ]
        );
        assert!(split_statements("-- nothing\n\n").is_empty());
    }

    #[test]
    fn test_semicolon_inside_line_does_not_split() {
        assert_eq!(
            split_statements("INSERT INTO t VALUES ('a;b');"),
            vec!["INSERT INTO t VALUES ('a;b')"]
        );
        assert_eq!(split_statements("SELECT 1; SELECT 2;"), vec!["SELECT 1; SELECT 2"]);
    }

    #[test]
    fn test_semicolon_ending_a_literal_line_splits() {
        let script = "INSERT INTO notes (body) VALUES ('first;\nsecond');\nSELECT 1;";
        assert_eq!(
            split_statements(script),
            vec!["INSERT INTO notes (body) VALUES ('first", "second')", "SELECT 1"]
        );
    }

    #[test]
    fn test_discover_pairs_in_order() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("0002_create_b.up.sql"), "CREATE TABLE b (id INTEGER);").unwrap();
        fs::write(dir.path().join("0002_create_b.down.sql"), "DROP TABLE b;").unwrap();
        fs::write(dir.path().join("0001_create_a.up.sql"), "CREATE TABLE a (id INTEGER);").unwrap();
        fs::write(dir.path().join("0001_create_a.down.sql"), "DROP TABLE a;").unwrap();
        fs::write(dir.path().join("README.md"), "notes").unwrap();

        let set = MigrationSet::from_directory(dir.path()).unwrap();
        assert_eq!(set.names().collect::<Vec<_>>(), vec!["0001_create_a", "0002_create_b"]);
        let a = set.get("0001_create_a").unwrap();
        assert_eq!(a.up_statements().unwrap(), ["CREATE TABLE a (id INTEGER)".to_string()]);
    }

    #[test]
    fn test_missing_half_is_invalid_state() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("0001_create_a.up.sql"), "CREATE TABLE a (id INTEGER);").unwrap();
        assert!(matches!(
            MigrationSet::from_directory(dir.path()),
            Err(Error::InvalidState(_))
        ));
    }

    #[test]
    fn test_bad_file_names_are_invalid_state() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("0001_seed.sql"), "SELECT 1;").unwrap();
        assert!(matches!(
            MigrationSet::from_directory(dir.path()),
            Err(Error::InvalidState(_))
        ));

        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("0001 bad name.up.sql"), "SELECT 1;").unwrap();
        fs::write(dir.path().join("0001 bad name.down.sql"), "SELECT 1;").unwrap();
        assert!(matches!(
            MigrationSet::from_directory(dir.path()),
            Err(Error::InvalidState(_))
        ));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let mut set = MigrationSet::new();
        set.add(SqlMigration::new("0001_a", "SELECT 1;", "SELECT 2;").unwrap())
            .unwrap();
        assert!(set
            .add(SqlMigration::new("0001_a", "SELECT 1;", "SELECT 2;").unwrap())
            .is_err());
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_missing_directory_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(
            MigrationSet::from_directory(missing),
            Err(Error::Io(_))
        ));
    }
}
