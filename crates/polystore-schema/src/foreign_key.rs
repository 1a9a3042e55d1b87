//! Foreign key constraints.

use polystore_core::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// What happens to referencing rows when the referenced row changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferentialAction {
    Cascade,
    SetNull,
    Restrict,
    NoAction,
    SetDefault,
}

impl ReferentialAction {
    pub const fn as_sql(self) -> &'static str {
        match self {
            ReferentialAction::Cascade => "CASCADE",
            ReferentialAction::SetNull => "SET NULL",
            ReferentialAction::Restrict => "RESTRICT",
            ReferentialAction::NoAction => "NO ACTION",
            ReferentialAction::SetDefault => "SET DEFAULT",
        }
    }
}

impl fmt::Display for ReferentialAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

impl FromStr for ReferentialAction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.split_whitespace().collect::<Vec<_>>().join(" ");
        match normalized.to_ascii_uppercase().as_str() {
            "CASCADE" => Ok(ReferentialAction::Cascade),
            "SET NULL" => Ok(ReferentialAction::SetNull),
            "RESTRICT" => Ok(ReferentialAction::Restrict),
            "NO ACTION" => Ok(ReferentialAction::NoAction),
            "SET DEFAULT" => Ok(ReferentialAction::SetDefault),
            _ => Err(Error::invalid_state(format!(
                "unknown referential action '{s}'"
            ))),
        }
    }
}

/// A `FOREIGN KEY` constraint declared on a blueprint.
///
/// ```ignore
/// bp.foreign("user_id").references("id").on("users").cascade_on_delete();
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ForeignKey {
    pub(crate) table: String,
    pub(crate) columns: Vec<String>,
    pub(crate) references: Vec<String>,
    pub(crate) on: Option<String>,
    pub(crate) on_delete: Option<ReferentialAction>,
    pub(crate) on_update: Option<ReferentialAction>,
    pub(crate) name: Option<String>,
}

impl ForeignKey {
    pub fn new(table: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            table: table.into(),
            columns,
            references: Vec::new(),
            on: None,
            on_delete: None,
            on_update: None,
            name: None,
        }
    }

    pub fn references(&mut self, columns: impl crate::IntoColumns) -> &mut Self {
        self.references = columns.into_columns();
        self
    }

    /// The referenced table.
    pub fn on(&mut self, table: impl Into<String>) -> &mut Self {
        self.on = Some(table.into());
        self
    }

    pub fn on_delete(&mut self, action: ReferentialAction) -> &mut Self {
        self.on_delete = Some(action);
        self
    }

    pub fn on_update(&mut self, action: ReferentialAction) -> &mut Self {
        self.on_update = Some(action);
        self
    }

    pub fn cascade_on_delete(&mut self) -> &mut Self {
        self.on_delete(ReferentialAction::Cascade)
    }

    pub fn null_on_delete(&mut self) -> &mut Self {
        self.on_delete(ReferentialAction::SetNull)
    }

    pub fn restrict_on_delete(&mut self) -> &mut Self {
        self.on_delete(ReferentialAction::Restrict)
    }

    pub fn cascade_on_update(&mut self) -> &mut Self {
        self.on_update(ReferentialAction::Cascade)
    }

    /// Override the constraint name.
    pub fn name(&mut self, name: impl Into<String>) -> &mut Self {
        self.name = Some(name.into());
        self
    }

    /// The explicit name, or `<table>_<columns>_foreign`.
    pub fn constraint_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("{}_{}_foreign", self.table, self.columns.join("_")))
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub(crate) fn target(&self) -> Result<(&str, &[String])> {
        let table = self.on.as_deref().ok_or_else(|| {
            Error::invalid_state(format!(
                "foreign key {} does not name a referenced table",
                self.constraint_name()
            ))
        })?;
        if self.references.is_empty() {
            return Err(Error::invalid_state(format!(
                "foreign key {} does not name referenced columns",
                self.constraint_name()
            )));
        }
        Ok((table, &self.references))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_constraint_name() {
        let mut fk = ForeignKey::new("posts", vec!["user_id".into()]);
        assert_eq!(fk.constraint_name(), "posts_user_id_foreign");
        fk.name("fk_posts_user");
        assert_eq!(fk.constraint_name(), "fk_posts_user");
    }

    #[test]
    fn test_parse_referential_action() {
        assert_eq!(
            "set  null".parse::<ReferentialAction>().unwrap(),
            ReferentialAction::SetNull
        );
        assert_eq!(
            "cascade".parse::<ReferentialAction>().unwrap(),
            ReferentialAction::Cascade
        );
        assert!("explode".parse::<ReferentialAction>().is_err());
    }

    #[test]
    fn test_target_requires_table_and_columns() {
        let mut fk = ForeignKey::new("posts", vec!["user_id".into()]);
        assert!(matches!(fk.target(), Err(Error::InvalidState(_))));
        fk.on("users");
        assert!(matches!(fk.target(), Err(Error::InvalidState(_))));
        fk.references("id");
        let (table, columns) = fk.target().unwrap();
        assert_eq!(table, "users");
        assert_eq!(columns, ["id".to_string()]);
    }
}
