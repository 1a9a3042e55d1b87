//! PostgreSQL frontend/backend protocol, version 3.0.
//!
//! Every message except the startup packet is a type byte followed by a
//! big-endian `i32` length that counts itself but not the type byte.

pub mod reader;
pub mod writer;

pub use reader::{BodyReader, parse_backend_message};
pub use writer::MessageWriter;

use polystore_core::{Backend, Error, ProtocolError};

/// Protocol 3.0 as sent in the startup packet.
pub const PROTOCOL_VERSION: i32 = 196_608;

pub mod frontend_type {
    pub const BIND: u8 = b'B';
    pub const CLOSE: u8 = b'C';
    pub const DESCRIBE: u8 = b'D';
    pub const EXECUTE: u8 = b'E';
    pub const PARSE: u8 = b'P';
    pub const PASSWORD: u8 = b'p';
    pub const QUERY: u8 = b'Q';
    pub const SYNC: u8 = b'S';
    pub const TERMINATE: u8 = b'X';
}

pub mod backend_type {
    pub const AUTHENTICATION: u8 = b'R';
    pub const BACKEND_KEY_DATA: u8 = b'K';
    pub const BIND_COMPLETE: u8 = b'2';
    pub const CLOSE_COMPLETE: u8 = b'3';
    pub const COMMAND_COMPLETE: u8 = b'C';
    pub const DATA_ROW: u8 = b'D';
    pub const EMPTY_QUERY: u8 = b'I';
    pub const ERROR_RESPONSE: u8 = b'E';
    pub const NO_DATA: u8 = b'n';
    pub const NOTICE_RESPONSE: u8 = b'N';
    pub const NOTIFICATION: u8 = b'A';
    pub const PARAMETER_DESCRIPTION: u8 = b't';
    pub const PARAMETER_STATUS: u8 = b'S';
    pub const PARSE_COMPLETE: u8 = b'1';
    pub const PORTAL_SUSPENDED: u8 = b's';
    pub const READY_FOR_QUERY: u8 = b'Z';
    pub const ROW_DESCRIPTION: u8 = b'T';
}

/// Target of `Describe` and `Close`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescribeKind {
    Statement,
    Portal,
}

impl DescribeKind {
    pub const fn as_byte(self) -> u8 {
        match self {
            DescribeKind::Statement => b'S',
            DescribeKind::Portal => b'P',
        }
    }
}

/// Transaction status reported by `ReadyForQuery`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransactionStatus {
    #[default]
    Idle,
    InTransaction,
    /// Inside a transaction block that has already failed
    Failed,
}

impl TransactionStatus {
    pub fn from_byte(b: u8) -> Result<Self, Error> {
        match b {
            b'I' => Ok(TransactionStatus::Idle),
            b'T' => Ok(TransactionStatus::InTransaction),
            b'E' => Ok(TransactionStatus::Failed),
            other => Err(protocol_error(format!(
                "invalid transaction status byte 0x{:02x}",
                other
            ))),
        }
    }
}

/// Fields of an `ErrorResponse` or `NoticeResponse`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorFields {
    pub severity: String,
    pub code: String,
    pub message: String,
    pub detail: Option<String>,
    pub hint: Option<String>,
    pub position: Option<u32>,
}

/// One column of a `RowDescription`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescription {
    pub name: String,
    pub table_oid: u32,
    pub column_id: i16,
    pub type_oid: u32,
    pub type_size: i16,
    pub type_modifier: i32,
    pub format: i16,
}

/// Backend messages this driver understands.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendMessage {
    AuthenticationOk,
    AuthenticationCleartextPassword,
    AuthenticationMd5Password([u8; 4]),
    AuthenticationSasl(Vec<String>),
    AuthenticationSaslContinue(Vec<u8>),
    AuthenticationSaslFinal(Vec<u8>),
    /// Any other authentication request code
    AuthenticationUnsupported(i32),
    BackendKeyData { process_id: i32, secret_key: i32 },
    ParameterStatus { name: String, value: String },
    ReadyForQuery(TransactionStatus),
    ParseComplete,
    BindComplete,
    CloseComplete,
    NoData,
    EmptyQueryResponse,
    PortalSuspended,
    ParameterDescription(Vec<u32>),
    RowDescription(Vec<FieldDescription>),
    DataRow(Vec<Option<Vec<u8>>>),
    CommandComplete(String),
    ErrorResponse(ErrorFields),
    NoticeResponse(ErrorFields),
    NotificationResponse { channel: String, payload: String },
}

/// Rows affected, taken from a `CommandComplete` tag.
///
/// `INSERT 0 3` -> 3, `UPDATE 2` -> 2, `CREATE TABLE` -> 0.
pub fn affected_rows(tag: &str) -> u64 {
    tag.rsplit(' ')
        .next()
        .and_then(|n| n.parse().ok())
        .unwrap_or(0)
}

pub(crate) fn protocol_error(message: impl Into<String>) -> Error {
    Error::Protocol(ProtocolError::new(Backend::Postgres, message))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_affected_rows_from_tag() {
        assert_eq!(affected_rows("INSERT 0 3"), 3);
        assert_eq!(affected_rows("UPDATE 2"), 2);
        assert_eq!(affected_rows("DELETE 0"), 0);
        assert_eq!(affected_rows("SELECT 5"), 5);
        assert_eq!(affected_rows("CREATE TABLE"), 0);
        assert_eq!(affected_rows("BEGIN"), 0);
    }

    #[test]
    fn test_transaction_status_bytes() {
        assert_eq!(
            TransactionStatus::from_byte(b'T').unwrap(),
            TransactionStatus::InTransaction
        );
        assert_eq!(
            TransactionStatus::from_byte(b'E').unwrap(),
            TransactionStatus::Failed
        );
        assert!(TransactionStatus::from_byte(b'?').is_err());
    }
}
