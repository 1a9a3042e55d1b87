//! PostgreSQL driver for polystore.
//!
//! Implements the frontend/backend protocol v3 over a blocking
//! [`std::net::TcpStream`]:
//!
//! - Startup and authentication (cleartext, MD5, SCRAM-SHA-256)
//! - The extended query protocol (`Parse`/`Bind`/`Describe`/`Execute`/`Sync`)
//!   for every statement that carries parameters
//! - The simple query protocol for parameterless statements, which may hold
//!   several `;`-separated statements
//! - Text-format results decoded by type OID
//!
//! After an `ErrorResponse` the connection always reads through to
//! `ReadyForQuery`, so it stays usable for the next statement.

pub mod auth;
pub mod config;
pub mod connection;
pub mod protocol;
pub mod types;

pub use config::{DEFAULT_PORT, PgConfig};
pub use connection::PgDriver;
