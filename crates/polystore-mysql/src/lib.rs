//! MySQL driver for polystore.
//!
//! Speaks the MySQL client/server protocol directly over a blocking
//! [`std::net::TcpStream`]:
//!
//! - Packet framing with sequence numbers (payloads over 16MB are split)
//! - Handshake v10 with `mysql_native_password` and `caching_sha2_password`
//!   (fast path, and full authentication through the server's RSA key)
//! - Binary prepared statements (`COM_STMT_PREPARE` / `COM_STMT_EXECUTE`)
//!   for every statement that carries parameters
//! - The text protocol (`COM_QUERY`) for parameterless statements
//!
//! # Example
//!
//! ```rust,ignore
//! use polystore_mysql::{MySqlConfig, MySqlDriver};
//!
//! let config = MySqlConfig::new("localhost")
//!     .user("root")
//!     .database("app");
//! let mut driver = MySqlDriver::connect(config)?;
//! ```

pub mod auth;
pub mod config;
pub mod connection;
pub mod protocol;
pub mod types;

pub use config::{DEFAULT_PORT, MySqlConfig};
pub use connection::MySqlDriver;
