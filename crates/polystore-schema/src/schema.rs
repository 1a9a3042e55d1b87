//! Schema operations against a live connection.

use crate::blueprint::Blueprint;
use crate::grammar::{Grammar, grammar_for};
use polystore_core::{DataAccess, Error, Result, Row, Value};

/// Executes blueprints and inspects tables through a [`DataAccess`].
///
/// On a document backend tables are collections: [`create`](Schema::create)
/// and [`drop`](Schema::drop) manage collections, [`has_table`](Schema::has_table)
/// consults the collection listing, and column-level operations are an
/// [`Error::InvalidState`].
///
/// ```ignore
/// Schema::new(&mut conn).create("widgets", |t| {
///     t.id();
///     t.string("name").unique();
///     t.timestamps();
/// })?;
/// ```
pub struct Schema<'a, D: DataAccess + ?Sized> {
    db: &'a mut D,
}

fn first_text(row: &Row, index: usize) -> Option<String> {
    match row.get(index)? {
        Value::Text(s) => Some(s.clone()),
        Value::Bytes(b) => Some(String::from_utf8_lossy(b).into_owned()),
        _ => None,
    }
}

impl<'a, D: DataAccess + ?Sized> Schema<'a, D> {
    pub fn new(db: &'a mut D) -> Self {
        Self { db }
    }

    fn grammar(&self) -> Result<Box<dyn Grammar>> {
        Ok(grammar_for(self.db.require_dialect()?))
    }

    fn column_level(&self, operation: &str) -> Result<()> {
        if self.db.is_nosql() {
            return Err(Error::invalid_state(format!(
                "{operation} is not available on the {} backend",
                self.db.backend().name()
            )));
        }
        Ok(())
    }

    fn run(&mut self, statements: &[String]) -> Result<()> {
        for sql in statements {
            tracing::debug!(backend = self.db.backend().name(), sql = %sql, "schema");
            self.db.execute(sql, &[])?;
        }
        Ok(())
    }

    /// Create a table from the blueprint built by `build`.
    pub fn create<F: FnOnce(&mut Blueprint)>(&mut self, table: &str, build: F) -> Result<()> {
        if self.db.is_nosql() {
            return self.db.create_collection(table);
        }
        let mut blueprint = Blueprint::creating(table, self.db.require_dialect()?);
        build(&mut blueprint);
        self.run(&blueprint.create_statements()?)
    }

    /// Alter a table with the blueprint built by `build`. Statements run one by
    /// one; a failure leaves the earlier ones applied.
    pub fn table<F: FnOnce(&mut Blueprint)>(&mut self, table: &str, build: F) -> Result<()> {
        self.column_level("altering a table")?;
        let mut blueprint = Blueprint::altering(table, self.db.require_dialect()?);
        build(&mut blueprint);
        self.run(&blueprint.to_statements()?)
    }

    pub fn drop(&mut self, table: &str) -> Result<()> {
        if self.db.is_nosql() {
            return self.db.drop_collection(table);
        }
        let sql = self.grammar()?.drop_table_sql(table);
        self.run(&[sql])
    }

    pub fn drop_if_exists(&mut self, table: &str) -> Result<()> {
        if self.db.is_nosql() {
            if self.has_table(table)? {
                self.db.drop_collection(table)?;
            }
            return Ok(());
        }
        let sql = self.grammar()?.drop_table_if_exists_sql(table);
        self.run(&[sql])
    }

    pub fn rename(&mut self, from: &str, to: &str) -> Result<()> {
        self.column_level("renaming a table")?;
        let sql = self.grammar()?.rename_table_sql(from, to);
        self.run(&[sql])
    }

    /// Base table names, sorted.
    pub fn get_tables(&mut self) -> Result<Vec<String>> {
        if self.db.is_nosql() {
            return self.db.list_collections();
        }
        let sql = self.grammar()?.tables_sql();
        let rows = self.db.query(sql, &[])?;
        Ok(rows.iter().filter_map(|row| first_text(row, 0)).collect())
    }

    pub fn has_table(&mut self, table: &str) -> Result<bool> {
        Ok(self.get_tables()?.iter().any(|t| t == table))
    }

    /// Column names of `table` in ordinal order; empty if the table does not exist.
    pub fn get_column_listing(&mut self, table: &str) -> Result<Vec<String>> {
        self.column_level("listing columns")?;
        let sql = self.grammar()?.columns_sql();
        let rows = self.db.query(sql, &[Value::from(table)])?;
        Ok(rows.iter().filter_map(|row| first_text(row, 0)).collect())
    }

    /// Case-insensitive column lookup.
    pub fn has_column(&mut self, table: &str, column: &str) -> Result<bool> {
        Ok(self
            .get_column_listing(table)?
            .iter()
            .any(|c| c.eq_ignore_ascii_case(column)))
    }

    /// Drop every table (or collection). Foreign keys are dropped first where
    /// the dialect needs it.
    pub fn drop_all_tables(&mut self) -> Result<()> {
        if self.db.is_nosql() {
            for collection in self.db.list_collections()? {
                self.db.drop_collection(&collection)?;
            }
            return Ok(());
        }
        let grammar = self.grammar()?;
        if let Some(sql) = grammar.foreign_keys_sql() {
            let rows = self.db.query(sql, &[])?;
            let mut drops = Vec::new();
            for row in &rows {
                if let (Some(table), Some(name)) = (first_text(row, 0), first_text(row, 1)) {
                    drops.push(grammar.drop_foreign_sql(&table, &name)?);
                }
            }
            self.run(&drops)?;
        }
        let tables = self.get_tables()?;
        self.run(&grammar.drop_all_tables_sql(&tables))
    }

    /// A no-op on the document backend.
    pub fn disable_foreign_key_constraints(&mut self) -> Result<()> {
        if self.db.is_nosql() {
            return Ok(());
        }
        let sql = self.grammar()?.disable_foreign_keys_sql().to_string();
        self.run(&[sql])
    }

    pub fn enable_foreign_key_constraints(&mut self) -> Result<()> {
        if self.db.is_nosql() {
            return Ok(());
        }
        let sql = self.grammar()?.enable_foreign_keys_sql().to_string();
        self.run(&[sql])
    }
}
