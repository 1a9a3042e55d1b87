//! Error types for polystore operations.

use crate::config::Backend;
use std::fmt;

type BoxedSource = Box<dyn std::error::Error + Send + Sync>;

/// The primary error type for all polystore operations.
#[derive(Debug)]
pub enum Error {
    /// Unknown backend name, missing or malformed configuration key
    Config(ConfigError),
    /// A backend handle could not be opened or was lost
    Connection(ConnectionError),
    /// The backend rejected a statement or document operation
    Statement(StatementError),
    /// API misuse: wrong blueprint mode, bad migration file, transaction misuse
    InvalidState(String),
    /// The ledger references a migration that is not available
    MigrationNotFound(String),
    /// Malformed wire data
    Protocol(ProtocolError),
    /// Value conversion failure
    Type(TypeError),
    /// I/O errors outside of a driver connection
    Io(std::io::Error),
}

#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
    pub source: Option<BoxedSource>,
}

#[derive(Debug)]
pub struct ConnectionError {
    pub kind: ConnectionErrorKind,
    pub backend: Backend,
    pub message: String,
    pub source: Option<BoxedSource>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionErrorKind {
    /// Failed to establish connection
    Connect,
    /// Authentication failed
    Authentication,
    /// Connection lost during operation
    Disconnected,
    /// Connection refused
    Refused,
    /// Connect or read timed out
    Timeout,
}

#[derive(Debug)]
pub struct StatementError {
    pub kind: StatementErrorKind,
    pub backend: Backend,
    pub sql: Option<String>,
    pub sqlstate: Option<String>,
    pub message: String,
    pub source: Option<BoxedSource>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementErrorKind {
    /// Syntax error in SQL or malformed document operation
    Syntax,
    /// Constraint violation (unique, foreign key, not null)
    Constraint,
    /// Table, column or collection not found
    NotFound,
    /// Permission denied
    Permission,
    /// Deadlock or lock timeout
    Deadlock,
    /// Statement timeout
    Timeout,
    /// Fault reported by a remote service envelope
    Remote,
    /// Other database error
    Database,
}

#[derive(Debug)]
pub struct ProtocolError {
    pub backend: Backend,
    pub message: String,
    pub source: Option<BoxedSource>,
}

#[derive(Debug)]
pub struct TypeError {
    pub expected: &'static str,
    pub actual: String,
    pub column: Option<String>,
}

impl Error {
    /// Build a configuration error from a message.
    pub fn config(message: impl Into<String>) -> Self {
        Error::Config(ConfigError {
            message: message.into(),
            source: None,
        })
    }

    /// Build an invalid-state error from a message.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Error::InvalidState(message.into())
    }

    /// Is this a connection error that likely requires reconnection?
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Error::Connection(_) | Error::Protocol(_))
    }

    /// Backend that produced this error, if any.
    pub fn backend(&self) -> Option<Backend> {
        match self {
            Error::Connection(e) => Some(e.backend),
            Error::Statement(e) => Some(e.backend),
            Error::Protocol(e) => Some(e.backend),
            _ => None,
        }
    }

    /// Get SQLSTATE if available (e.g., "23505" for unique violation)
    pub fn sqlstate(&self) -> Option<&str> {
        match self {
            Error::Statement(s) => s.sqlstate.as_deref(),
            _ => None,
        }
    }

    /// Get the statement that caused this error, if available
    pub fn sql(&self) -> Option<&str> {
        match self {
            Error::Statement(s) => s.sql.as_deref(),
            _ => None,
        }
    }
}

impl ConnectionError {
    pub fn new(backend: Backend, kind: ConnectionErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            backend,
            message: message.into(),
            source: None,
        }
    }

    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }
}

impl StatementError {
    pub fn new(backend: Backend, kind: StatementErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            backend,
            sql: None,
            sqlstate: None,
            message: message.into(),
            source: None,
        }
    }

    #[must_use]
    pub fn with_sql(mut self, sql: impl Into<String>) -> Self {
        self.sql = Some(sql.into());
        self
    }

    #[must_use]
    pub fn with_sqlstate(mut self, sqlstate: impl Into<String>) -> Self {
        self.sqlstate = Some(sqlstate.into());
        self
    }

    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Is this a unique constraint violation?
    pub fn is_unique_violation(&self) -> bool {
        self.sqlstate.as_deref() == Some("23505")
    }
}

impl ProtocolError {
    pub fn new(backend: Backend, message: impl Into<String>) -> Self {
        Self {
            backend,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Config(e) => write!(f, "Configuration error: {}", e.message),
            Error::Connection(e) => write!(f, "Connection error ({}): {}", e.backend, e.message),
            Error::Statement(e) => {
                if let Some(sqlstate) = &e.sqlstate {
                    write!(
                        f,
                        "Statement error ({}, SQLSTATE {}): {}",
                        e.backend, sqlstate, e.message
                    )
                } else {
                    write!(f, "Statement error ({}): {}", e.backend, e.message)
                }
            }
            Error::InvalidState(msg) => write!(f, "Invalid state: {}", msg),
            Error::MigrationNotFound(name) => write!(f, "Migration not found: {}", name),
            Error::Protocol(e) => write!(f, "Protocol error ({}): {}", e.backend, e.message),
            Error::Type(e) => write!(f, "Type error: {}", e),
            Error::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        let boxed = match self {
            Error::Config(e) => e.source.as_deref(),
            Error::Connection(e) => e.source.as_deref(),
            Error::Statement(e) => e.source.as_deref(),
            Error::Protocol(e) => e.source.as_deref(),
            Error::Io(e) => return Some(e),
            _ => None,
        };
        boxed.map(|err| err as &(dyn std::error::Error + 'static))
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for StatementError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(sqlstate) = &self.sqlstate {
            write!(f, "{} (SQLSTATE {})", self.message, sqlstate)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(col) = &self.column {
            write!(
                f,
                "expected {} for column '{}', found {}",
                self.expected, col, self.actual
            )
        } else {
            write!(f, "expected {}, found {}", self.expected, self.actual)
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Config(err)
    }
}

impl From<ConnectionError> for Error {
    fn from(err: ConnectionError) -> Self {
        Error::Connection(err)
    }
}

impl From<StatementError> for Error {
    fn from(err: StatementError) -> Self {
        Error::Statement(err)
    }
}

impl From<ProtocolError> for Error {
    fn from(err: ProtocolError) -> Self {
        Error::Protocol(err)
    }
}

impl From<TypeError> for Error {
    fn from(err: TypeError) -> Self {
        Error::Type(err)
    }
}

/// Result type alias for polystore operations.
pub type Result<T> = std::result::Result<T, Error>;
