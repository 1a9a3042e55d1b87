//! Document-store driver for polystore, on the blocking `mongodb` client.
//!
//! Filters and payloads arrive as [`polystore_core::Document`]s and are
//! converted to BSON in [`convert`]. Results come back as rows, one per
//! document, with ObjectIds rendered as 24-character hex strings.

pub mod config;
pub mod connection;
pub mod convert;

pub use config::{DEFAULT_PORT, MongoConfig};
pub use connection::MongoDriver;
