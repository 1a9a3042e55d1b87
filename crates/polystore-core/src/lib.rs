//! Core types and traits for polystore.
//!
//! - [`Value`], [`Row`] and [`Document`] carry data across the driver boundary
//! - [`Error`] is the single error taxonomy used by every crate
//! - [`ConnectionConfig`] and [`Backend`] select and configure a driver
//! - [`StatementDriver`] and [`DocumentDriver`] are the two driver shapes
//! - [`DataAccess`] is what records, query builders and migrations talk to

pub mod access;
pub mod config;
pub mod dialect;
pub mod document;
pub mod driver;
pub mod error;
pub mod row;
pub mod value;

pub use access::DataAccess;
pub use config::{Backend, ConnectionConfig, DEFAULT_TIMEOUT};
pub use dialect::Dialect;
pub use document::Document;
pub use driver::{
    DocumentDriver, DocumentOp, FindOptions, Order, StatementDriver, ensure_can_begin,
    ensure_open_transaction, normalize_update,
};
pub use error::{
    ConfigError, ConnectionError, ConnectionErrorKind, Error, ProtocolError, Result,
    StatementError, StatementErrorKind, TypeError,
};
pub use row::{ColumnInfo, FromValue, Row};
pub use value::Value;
