//! Embedded SQLite driver for polystore.
//!
//! Talks to the SQLite C API through `libsqlite3-sys` (bundled build) and
//! implements [`polystore_core::StatementDriver`].
//!
//! # Type Mapping
//!
//! | Value | SQLite storage class |
//! |-------|----------------------|
//! | `Bool` | INTEGER (0/1) |
//! | `BigInt` | INTEGER |
//! | `Double` | REAL |
//! | `Text` | TEXT |
//! | `Bytes` | BLOB |
//! | `Json`, `Array` | TEXT (serialized JSON) |
//!
//! Every connection is opened with `PRAGMA foreign_keys = ON`.

// FFI bindings require unsafe code
#![allow(unsafe_code)]

pub mod config;
pub mod connection;
pub mod types;

pub use config::SqliteConfig;
pub use connection::SqliteDriver;

/// Version string of the linked SQLite library.
pub fn sqlite_version() -> String {
    types::library_version()
}
