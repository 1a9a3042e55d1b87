//! SQL Server driver for polystore.
//!
//! Wraps [`tiberius`] behind the blocking [`polystore_core::StatementDriver`]
//! interface. Each driver owns a private current-thread tokio runtime that
//! is only used to block on tiberius futures.
//!
//! Parameters are bound through `sp_executesql` (`@P1`, `@P2`, ...).
//! Transaction control runs as plain SQL batches so the transaction
//! outlives the statement that opened it.

pub mod config;
pub mod connection;
pub mod types;

pub use config::{DEFAULT_PORT, MssqlConfig};
pub use connection::MssqlDriver;
