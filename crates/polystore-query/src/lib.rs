//! Query construction and active records for polystore.
//!
//! `polystore-query` sits between application code and the
//! [`DataAccess`](polystore_core::DataAccess) facade:
//!
//! - [`QueryBuilder`] accumulates conditions, ordering and paging and
//!   compiles them to one parameterized `SELECT` for a SQL dialect, or to a
//!   filter document plus find options for the document store.
//! - [`Record`] is a row with identity: it remembers whether it is persisted
//!   and which attributes changed since it was loaded.
//! - [`Model`] maps a Rust type onto a table through [`Record`].
//!
//! Values are always bound as parameters. Column and table names are quoted
//! for the target dialect.

pub mod builder;
pub mod clause;
pub mod filter;
pub mod model;
pub mod operator;
pub mod record;

#[cfg(test)]
mod testing;

pub use builder::QueryBuilder;
pub use clause::{Condition, OrderBy};
pub use model::Model;
pub use operator::Operator;
pub use record::Record;
