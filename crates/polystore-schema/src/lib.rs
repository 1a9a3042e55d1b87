//! Schema definition and migrations for polystore.
//!
//! - [`Blueprint`] describes a table to create or alter; [`Grammar`] turns it
//!   into DDL for one dialect
//! - [`Schema`] executes blueprints and answers introspection questions
//! - [`Migrator`] applies and reverts [`Migration`]s, recording them in a
//!   ledger table

pub mod blueprint;
pub mod column;
pub mod foreign_key;
pub mod grammar;
pub mod migration;
pub mod migrator;
pub mod schema;

#[cfg(test)]
mod testing;

pub use blueprint::{Blueprint, IndexCommand, IndexKind, IntoColumns};
pub use column::{Column, ColumnType};
pub use foreign_key::{ForeignKey, ReferentialAction};
pub use grammar::{Grammar, grammar_for};
pub use migration::{Migration, MigrationSet, SqlMigration, split_statements};
pub use migrator::{MigrationLock, MigrationStatus, Migrator};
pub use schema::Schema;
