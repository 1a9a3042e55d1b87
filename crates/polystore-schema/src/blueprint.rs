//! Table blueprints.
//!
//! A [`Blueprint`] collects the columns, indexes and foreign keys of one
//! table and compiles them with the [`Grammar`] of its dialect. It is built
//! in one of two modes:
//!
//! - *creating*: [`Blueprint::to_sql`] yields one `CREATE TABLE` with the
//!   columns first, then index clauses, then foreign-key clauses, each group
//!   in declaration order
//! - *altering*: [`Blueprint::to_statements`] yields one statement per added,
//!   changed, dropped or renamed column, index and foreign key
//!
//! Asking a blueprint for the other mode's output is an
//! [`Error::InvalidState`].

use crate::column::{Column, ColumnType};
use crate::foreign_key::ForeignKey;
use crate::grammar::{Grammar, grammar_for};
use polystore_core::{Dialect, Error, Result};

/// Column lists accepted by index and foreign-key helpers.
pub trait IntoColumns {
    fn into_columns(self) -> Vec<String>;
}

impl IntoColumns for &str {
    fn into_columns(self) -> Vec<String> {
        vec![self.to_string()]
    }
}

impl IntoColumns for String {
    fn into_columns(self) -> Vec<String> {
        vec![self]
    }
}

impl<const N: usize> IntoColumns for [&str; N] {
    fn into_columns(self) -> Vec<String> {
        self.iter().map(|c| (*c).to_string()).collect()
    }
}

impl IntoColumns for &[&str] {
    fn into_columns(self) -> Vec<String> {
        self.iter().map(|c| (*c).to_string()).collect()
    }
}

impl IntoColumns for Vec<String> {
    fn into_columns(self) -> Vec<String> {
        self
    }
}

impl IntoColumns for Vec<&str> {
    fn into_columns(self) -> Vec<String> {
        self.into_iter().map(str::to_string).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    Primary,
    Unique,
    Index,
}

impl IndexKind {
    const fn suffix(self) -> &'static str {
        match self {
            IndexKind::Primary => "primary",
            IndexKind::Unique => "unique",
            IndexKind::Index => "index",
        }
    }
}

/// A named index over one or more columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexCommand {
    pub kind: IndexKind,
    pub name: String,
    pub columns: Vec<String>,
}

impl IndexCommand {
    /// Replace the generated `<table>_<columns>_<kind>` name.
    pub fn named(&mut self, name: impl Into<String>) -> &mut Self {
        self.name = name.into();
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Creating,
    Altering,
}

#[derive(Debug, Clone, PartialEq)]
enum Command {
    Index(usize),
    Foreign(usize),
    DropColumn(String),
    RenameColumn { from: String, to: String },
    DropIndex { name: String, kind: IndexKind },
    DropForeign(String),
}

#[derive(Debug, Clone)]
pub struct Blueprint {
    table: String,
    dialect: Dialect,
    mode: Mode,
    columns: Vec<Column>,
    indexes: Vec<IndexCommand>,
    foreign_keys: Vec<ForeignKey>,
    commands: Vec<Command>,
}

fn index_name(table: &str, columns: &[String], kind: IndexKind) -> String {
    format!("{}_{}_{}", table, columns.join("_"), kind.suffix())
        .to_lowercase()
        .replace(['-', '.'], "_")
}

impl Blueprint {
    /// A blueprint for a new table.
    pub fn creating(table: impl Into<String>, dialect: Dialect) -> Self {
        Self::new(table.into(), dialect, Mode::Creating)
    }

    /// A blueprint that alters an existing table.
    pub fn altering(table: impl Into<String>, dialect: Dialect) -> Self {
        Self::new(table.into(), dialect, Mode::Altering)
    }

    fn new(table: String, dialect: Dialect, mode: Mode) -> Self {
        Self {
            table,
            dialect,
            mode,
            columns: Vec::new(),
            indexes: Vec::new(),
            foreign_keys: Vec::new(),
            commands: Vec::new(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn is_creating(&self) -> bool {
        self.mode == Mode::Creating
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&mut self, name: impl Into<String>, kind: ColumnType) -> &mut Column {
        self.columns.push(Column::new(name, kind));
        let last = self.columns.len() - 1;
        &mut self.columns[last]
    }

    /// Auto-incrementing big integer primary key named `id`.
    pub fn id(&mut self) -> &mut Column {
        self.big_increments("id")
    }

    pub fn increments(&mut self, name: impl Into<String>) -> &mut Column {
        self.column(name, ColumnType::Increments)
    }

    pub fn big_increments(&mut self, name: impl Into<String>) -> &mut Column {
        self.column(name, ColumnType::BigIncrements)
    }

    /// `VARCHAR(255)`; use [`Column::length`] for another length.
    pub fn string(&mut self, name: impl Into<String>) -> &mut Column {
        self.column(name, ColumnType::String(255))
    }

    pub fn char(&mut self, name: impl Into<String>, length: u32) -> &mut Column {
        self.column(name, ColumnType::Char(length))
    }

    pub fn text(&mut self, name: impl Into<String>) -> &mut Column {
        self.column(name, ColumnType::Text)
    }

    pub fn integer(&mut self, name: impl Into<String>) -> &mut Column {
        self.column(name, ColumnType::Integer)
    }

    pub fn big_integer(&mut self, name: impl Into<String>) -> &mut Column {
        self.column(name, ColumnType::BigInteger)
    }

    pub fn small_integer(&mut self, name: impl Into<String>) -> &mut Column {
        self.column(name, ColumnType::SmallInteger)
    }

    pub fn tiny_integer(&mut self, name: impl Into<String>) -> &mut Column {
        self.column(name, ColumnType::TinyInteger)
    }

    pub fn boolean(&mut self, name: impl Into<String>) -> &mut Column {
        self.column(name, ColumnType::Boolean)
    }

    pub fn float(&mut self, name: impl Into<String>) -> &mut Column {
        self.column(name, ColumnType::Float)
    }

    pub fn double(&mut self, name: impl Into<String>) -> &mut Column {
        self.column(name, ColumnType::Double)
    }

    pub fn decimal(&mut self, name: impl Into<String>, precision: u8, scale: u8) -> &mut Column {
        self.column(name, ColumnType::Decimal(precision, scale))
    }

    pub fn date(&mut self, name: impl Into<String>) -> &mut Column {
        self.column(name, ColumnType::Date)
    }

    pub fn date_time(&mut self, name: impl Into<String>) -> &mut Column {
        self.column(name, ColumnType::DateTime)
    }

    pub fn timestamp(&mut self, name: impl Into<String>) -> &mut Column {
        self.column(name, ColumnType::Timestamp)
    }

    pub fn time(&mut self, name: impl Into<String>) -> &mut Column {
        self.column(name, ColumnType::Time)
    }

    /// Nullable `created_at` and `updated_at`, both defaulting to the current
    /// timestamp.
    pub fn timestamps(&mut self) {
        self.timestamp("created_at").nullable().use_current();
        self.timestamp("updated_at").nullable().use_current();
    }

    /// Nullable `deleted_at` timestamp.
    pub fn soft_deletes(&mut self) -> &mut Column {
        self.timestamp("deleted_at").nullable()
    }

    pub fn json(&mut self, name: impl Into<String>) -> &mut Column {
        self.column(name, ColumnType::Json)
    }

    pub fn uuid(&mut self, name: impl Into<String>) -> &mut Column {
        self.column(name, ColumnType::Uuid)
    }

    pub fn binary(&mut self, name: impl Into<String>) -> &mut Column {
        self.column(name, ColumnType::Binary)
    }

    /// Unsigned big integer sized to reference an [`id`](Blueprint::id) column.
    pub fn foreign_id(&mut self, name: impl Into<String>) -> &mut Column {
        self.big_integer(name).unsigned()
    }

    pub fn foreign(&mut self, columns: impl IntoColumns) -> &mut ForeignKey {
        let index = self.foreign_keys.len();
        self.foreign_keys
            .push(ForeignKey::new(self.table.clone(), columns.into_columns()));
        self.commands.push(Command::Foreign(index));
        &mut self.foreign_keys[index]
    }

    fn add_index(&mut self, kind: IndexKind, columns: Vec<String>) -> &mut IndexCommand {
        let index = self.indexes.len();
        self.indexes.push(IndexCommand {
            kind,
            name: index_name(&self.table, &columns, kind),
            columns,
        });
        self.commands.push(Command::Index(index));
        &mut self.indexes[index]
    }

    pub fn primary(&mut self, columns: impl IntoColumns) -> &mut IndexCommand {
        self.add_index(IndexKind::Primary, columns.into_columns())
    }

    pub fn unique(&mut self, columns: impl IntoColumns) -> &mut IndexCommand {
        self.add_index(IndexKind::Unique, columns.into_columns())
    }

    pub fn index(&mut self, columns: impl IntoColumns) -> &mut IndexCommand {
        self.add_index(IndexKind::Index, columns.into_columns())
    }

    pub fn drop_column(&mut self, name: impl Into<String>) {
        self.commands.push(Command::DropColumn(name.into()));
    }

    pub fn rename_column(&mut self, from: impl Into<String>, to: impl Into<String>) {
        self.commands.push(Command::RenameColumn {
            from: from.into(),
            to: to.into(),
        });
    }

    pub fn drop_foreign(&mut self, name: impl Into<String>) {
        self.commands.push(Command::DropForeign(name.into()));
    }

    pub fn drop_index(&mut self, name: impl Into<String>) {
        self.drop_index_of_kind(name.into(), IndexKind::Index);
    }

    pub fn drop_unique(&mut self, name: impl Into<String>) {
        self.drop_index_of_kind(name.into(), IndexKind::Unique);
    }

    pub fn drop_primary(&mut self, name: impl Into<String>) {
        self.drop_index_of_kind(name.into(), IndexKind::Primary);
    }

    fn drop_index_of_kind(&mut self, name: String, kind: IndexKind) {
        self.commands.push(Command::DropIndex { name, kind });
    }

    /// Indexes declared through column modifiers, in column order.
    fn column_indexes(&self) -> Vec<IndexCommand> {
        let mut indexes = Vec::new();
        for column in &self.columns {
            let columns = vec![column.name.clone()];
            for (wanted, kind) in [(column.unique, IndexKind::Unique), (column.index, IndexKind::Index)] {
                if wanted {
                    indexes.push(IndexCommand {
                        kind,
                        name: index_name(&self.table, &columns, kind),
                        columns: columns.clone(),
                    });
                }
            }
        }
        indexes
    }

    fn ensure_mode(&self, mode: Mode, operation: &str) -> Result<()> {
        if self.mode == mode {
            return Ok(());
        }
        let (actual, wanted) = match mode {
            Mode::Creating => ("altering", "creating"),
            Mode::Altering => ("creating", "altering"),
        };
        Err(Error::invalid_state(format!(
            "{} on table '{}' requires a {} blueprint, this one is {}",
            operation, self.table, wanted, actual
        )))
    }

    fn compile_create(&self, grammar: &dyn Grammar) -> Result<(String, Vec<String>)> {
        if let Some(column) = self.columns.iter().find(|c| c.change) {
            return Err(Error::invalid_state(format!(
                "column '{}' is marked as changed in a creating blueprint",
                column.name
            )));
        }
        let mut clauses: Vec<String> = self.columns.iter().map(|c| grammar.column_sql(c)).collect();
        let mut separate = Vec::new();
        let explicit = self.commands.iter().filter_map(|command| match command {
            Command::Index(i) => Some(&self.indexes[*i]),
            _ => None,
        });
        let column_indexes = self.column_indexes();
        for index in column_indexes.iter().chain(explicit) {
            match grammar.index_clause(index) {
                Some(clause) => clauses.push(clause),
                None => separate.push(grammar.create_index_sql(&self.table, index)),
            }
        }
        for command in &self.commands {
            match command {
                Command::Index(_) => {}
                Command::Foreign(i) => clauses.push(grammar.foreign_clause(&self.foreign_keys[*i])?),
                _ => {
                    return Err(Error::invalid_state(format!(
                        "drop and rename commands on '{}' need an altering blueprint",
                        self.table
                    )));
                }
            }
        }
        Ok((grammar.create_table_sql(&self.table, &clauses), separate))
    }

    /// The `CREATE TABLE` statement. Creating mode only.
    pub fn to_sql(&self) -> Result<String> {
        self.ensure_mode(Mode::Creating, "to_sql")?;
        let grammar = grammar_for(self.dialect);
        self.compile_create(grammar.as_ref()).map(|(create, _)| create)
    }

    /// The `CREATE TABLE` statement followed by a `CREATE INDEX` for each plain
    /// index the dialect cannot declare inline. Creating mode only.
    pub fn create_statements(&self) -> Result<Vec<String>> {
        self.ensure_mode(Mode::Creating, "create_statements")?;
        let grammar = grammar_for(self.dialect);
        let (create, separate) = self.compile_create(grammar.as_ref())?;
        let mut statements = vec![create];
        statements.extend(separate);
        Ok(statements)
    }

    /// One statement per change. Altering mode only.
    pub fn to_statements(&self) -> Result<Vec<String>> {
        self.ensure_mode(Mode::Altering, "to_statements")?;
        let grammar = grammar_for(self.dialect);
        let grammar = grammar.as_ref();
        let table = self.table.as_str();

        let mut statements = Vec::new();
        for column in &self.columns {
            statements.push(if column.change {
                grammar.change_column_sql(table, column)?
            } else {
                grammar.add_column_sql(table, column)
            });
        }
        for index in self.column_indexes() {
            statements.push(grammar.add_index_sql(table, &index)?);
        }
        for command in &self.commands {
            statements.push(match command {
                Command::Index(i) => grammar.add_index_sql(table, &self.indexes[*i])?,
                Command::Foreign(i) => grammar.add_foreign_sql(table, &self.foreign_keys[*i])?,
                Command::DropColumn(name) => grammar.drop_column_sql(table, name),
                Command::RenameColumn { from, to } => grammar.rename_column_sql(table, from, to),
                Command::DropIndex { name, kind } => grammar.drop_index_sql(table, name, *kind)?,
                Command::DropForeign(name) => grammar.drop_foreign_sql(table, name)?,
            });
        }
        Ok(statements)
    }
}
