//! Column definitions.

use crate::grammar::Grammar;
use polystore_core::Value;

/// Logical column types. Each [`Grammar`] maps these to native type names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnType {
    /// Auto-incrementing 32-bit primary key
    Increments,
    /// Auto-incrementing 64-bit primary key
    BigIncrements,
    Integer,
    BigInteger,
    SmallInteger,
    TinyInteger,
    /// Variable-length string with a maximum length
    String(u32),
    /// Fixed-length string
    Char(u32),
    Text,
    Boolean,
    Float,
    Double,
    /// Exact numeric with precision and scale
    Decimal(u8, u8),
    Date,
    DateTime,
    Timestamp,
    Time,
    Json,
    Binary,
    Uuid,
}

impl ColumnType {
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            ColumnType::Increments
                | ColumnType::BigIncrements
                | ColumnType::Integer
                | ColumnType::BigInteger
                | ColumnType::SmallInteger
                | ColumnType::TinyInteger
        )
    }

    pub fn is_increments(&self) -> bool {
        matches!(self, ColumnType::Increments | ColumnType::BigIncrements)
    }
}

/// One column of a [`Blueprint`](crate::Blueprint).
///
/// Modifiers can be applied in any order; only the final state is compiled.
///
/// ```ignore
/// bp.string("email").length(120).unique();
/// bp.integer("votes").unsigned().default(0).comment("running total");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub(crate) name: String,
    pub(crate) kind: ColumnType,
    pub(crate) nullable: bool,
    pub(crate) default: Option<Value>,
    pub(crate) unsigned: bool,
    pub(crate) auto_increment: bool,
    pub(crate) primary: bool,
    pub(crate) unique: bool,
    pub(crate) index: bool,
    pub(crate) comment: Option<String>,
    pub(crate) use_current: bool,
    pub(crate) use_current_on_update: bool,
    pub(crate) after: Option<String>,
    pub(crate) change: bool,
}

impl Column {
    pub fn new(name: impl Into<String>, kind: ColumnType) -> Self {
        let increments = kind.is_increments();
        Self {
            name: name.into(),
            kind,
            nullable: false,
            default: None,
            unsigned: increments,
            auto_increment: increments,
            primary: increments,
            unique: false,
            index: false,
            comment: None,
            use_current: false,
            use_current_on_update: false,
            after: None,
            change: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &ColumnType {
        &self.kind
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn default_value(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    /// Allow NULL values.
    pub fn nullable(&mut self) -> &mut Self {
        self.nullable = true;
        self
    }

    pub fn default(&mut self, value: impl Into<Value>) -> &mut Self {
        self.default = Some(value.into());
        self
    }

    /// Unsigned integer (MySQL only; ignored elsewhere).
    pub fn unsigned(&mut self) -> &mut Self {
        self.unsigned = true;
        self
    }

    pub fn auto_increment(&mut self) -> &mut Self {
        self.auto_increment = true;
        self
    }

    pub fn primary(&mut self) -> &mut Self {
        self.primary = true;
        self
    }

    /// Add a unique index named `<table>_<column>_unique`.
    pub fn unique(&mut self) -> &mut Self {
        self.unique = true;
        self
    }

    /// Add a plain index named `<table>_<column>_index`.
    pub fn index(&mut self) -> &mut Self {
        self.index = true;
        self
    }

    /// Column comment (MySQL only).
    pub fn comment(&mut self, comment: impl Into<String>) -> &mut Self {
        self.comment = Some(comment.into());
        self
    }

    /// Default to the current timestamp.
    pub fn use_current(&mut self) -> &mut Self {
        self.use_current = true;
        self
    }

    /// Refresh to the current timestamp on every update (MySQL only).
    pub fn use_current_on_update(&mut self) -> &mut Self {
        self.use_current_on_update = true;
        self
    }

    /// Place the column after `column` when adding it (MySQL only).
    pub fn after(&mut self, column: impl Into<String>) -> &mut Self {
        self.after = Some(column.into());
        self
    }

    /// Modify an existing column instead of adding a new one.
    pub fn change(&mut self) -> &mut Self {
        self.change = true;
        self
    }

    /// Change the length of a string or char column.
    pub fn length(&mut self, length: u32) -> &mut Self {
        match &mut self.kind {
            ColumnType::String(n) | ColumnType::Char(n) => *n = length,
            _ => {}
        }
        self
    }

    /// The column clause for `CREATE TABLE` or `ADD COLUMN`.
    pub fn to_sql(&self, grammar: &dyn Grammar) -> String {
        grammar.column_sql(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::grammar_for;
    use polystore_core::Dialect;

    #[test]
    fn test_modifier_order_does_not_matter() {
        let grammar = grammar_for(Dialect::MySql);
        let mut a = Column::new("votes", ColumnType::Integer);
        a.nullable().unsigned().default(0);
        let mut b = Column::new("votes", ColumnType::Integer);
        b.default(0).nullable().unsigned();
        assert_eq!(a.to_sql(grammar.as_ref()), b.to_sql(grammar.as_ref()));
        assert_eq!(a.to_sql(grammar.as_ref()), "`votes` INT UNSIGNED NULL DEFAULT 0");
    }

    #[test]
    fn test_increments_imply_key() {
        let column = Column::new("id", ColumnType::BigIncrements);
        assert!(column.primary && column.auto_increment && column.unsigned);
        assert!(!column.is_nullable());
    }

    #[test]
    fn test_length_only_touches_strings() {
        let mut name = Column::new("name", ColumnType::String(255));
        name.length(40);
        assert_eq!(name.kind(), &ColumnType::String(40));
        let mut count = Column::new("count", ColumnType::Integer);
        count.length(40);
        assert_eq!(count.kind(), &ColumnType::Integer);
    }
}
