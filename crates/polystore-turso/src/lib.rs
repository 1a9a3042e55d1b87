//! Remote libSQL driver for polystore.
//!
//! Statements travel as JSON over HTTPS to the `/v2/pipeline` endpoint of a
//! libSQL server (Turso). Nothing is opened at construction time: every
//! `query`/`execute` is one blocking POST with an explicit timeout.
//!
//! Parameter and cell type tags (`integer`, `float`, `text`, `blob`,
//! `null`) are confined to [`protocol`]; the rest of the driver only sees
//! [`polystore_core::Value`].
//!
//! A transaction holds one server stream open from `BEGIN` to
//! `COMMIT`/`ROLLBACK`, passing the stream's baton between requests, so
//! statements inside it see each other's writes and report real counts.

pub mod config;
pub mod connection;
pub mod protocol;

pub use config::TursoConfig;
pub use connection::TursoDriver;
