//! MySQL client/server protocol.
//!
//! Every packet starts with a 4-byte header: a 3-byte little-endian payload
//! length and a 1-byte sequence number. The sequence restarts at 0 with each
//! command and increments on every packet in either direction. Payloads of
//! `MAX_PACKET_SIZE` bytes or more are split; a chunk of exactly
//! `MAX_PACKET_SIZE` bytes means another chunk follows.

pub mod handshake;
pub mod prepared;
pub mod reader;
pub mod writer;

pub use reader::PacketReader;
pub use writer::PacketWriter;

use polystore_core::{Backend, Error, ProtocolError};

/// Largest payload a single packet can carry (2^24 - 1).
pub const MAX_PACKET_SIZE: usize = 0xFF_FF_FF;

pub mod capabilities {
    pub const CLIENT_LONG_PASSWORD: u32 = 1;
    pub const CLIENT_CONNECT_WITH_DB: u32 = 1 << 3;
    pub const CLIENT_PROTOCOL_41: u32 = 1 << 9;
    pub const CLIENT_SSL: u32 = 1 << 11;
    pub const CLIENT_TRANSACTIONS: u32 = 1 << 13;
    pub const CLIENT_SECURE_CONNECTION: u32 = 1 << 15;
    pub const CLIENT_MULTI_STATEMENTS: u32 = 1 << 16;
    pub const CLIENT_MULTI_RESULTS: u32 = 1 << 17;
    pub const CLIENT_PS_MULTI_RESULTS: u32 = 1 << 18;
    pub const CLIENT_PLUGIN_AUTH: u32 = 1 << 19;
    pub const CLIENT_PLUGIN_AUTH_LENENC_CLIENT_DATA: u32 = 1 << 21;
    pub const CLIENT_DEPRECATE_EOF: u32 = 1 << 24;

    pub const DEFAULT_CLIENT_FLAGS: u32 = CLIENT_PROTOCOL_41
        | CLIENT_SECURE_CONNECTION
        | CLIENT_LONG_PASSWORD
        | CLIENT_TRANSACTIONS
        | CLIENT_MULTI_STATEMENTS
        | CLIENT_MULTI_RESULTS
        | CLIENT_PS_MULTI_RESULTS
        | CLIENT_PLUGIN_AUTH
        | CLIENT_PLUGIN_AUTH_LENENC_CLIENT_DATA
        | CLIENT_CONNECT_WITH_DB
        | CLIENT_DEPRECATE_EOF;
}

pub mod server_status {
    pub const IN_TRANS: u16 = 1;
    pub const AUTOCOMMIT: u16 = 1 << 1;
    pub const MORE_RESULTS_EXISTS: u16 = 1 << 3;
}

pub mod charset {
    pub const UTF8MB4_GENERAL_CI: u8 = 45;
    pub const UTF8MB4_0900_AI_CI: u8 = 255;
    /// Collation of binary strings and BLOB columns.
    pub const BINARY: u16 = 63;
}

/// Command bytes (`COM_*`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    Quit = 0x01,
    InitDb = 0x02,
    Query = 0x03,
    Ping = 0x0e,
    StmtPrepare = 0x16,
    StmtExecute = 0x17,
    StmtClose = 0x19,
    StmtReset = 0x1a,
}

/// Decoded 4-byte packet header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub payload_length: u32,
    pub sequence_id: u8,
}

impl PacketHeader {
    pub const SIZE: usize = 4;

    pub fn from_bytes(bytes: [u8; 4]) -> Self {
        Self {
            payload_length: u32::from_le_bytes([bytes[0], bytes[1], bytes[2], 0]),
            sequence_id: bytes[3],
        }
    }

    pub fn to_bytes(self) -> [u8; 4] {
        let len = self.payload_length.to_le_bytes();
        [len[0], len[1], len[2], self.sequence_id]
    }
}

/// What a server response packet is, judged by its first byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    Ok,
    Error,
    /// EOF marker, or an OK packet with the 0xFE header under `DEPRECATE_EOF`
    Eof,
    LocalInfile,
    Data,
}

impl PacketKind {
    pub fn of(payload: &[u8]) -> Self {
        match payload.first() {
            Some(0x00) => PacketKind::Ok,
            Some(0xFF) => PacketKind::Error,
            Some(0xFE) if payload.len() < 9 => PacketKind::Eof,
            Some(0xFB) => PacketKind::LocalInfile,
            _ => PacketKind::Data,
        }
    }
}

/// Body of an OK packet (also used for the 0xFE terminator of result sets).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OkPacket {
    pub affected_rows: u64,
    pub last_insert_id: u64,
    pub status_flags: u16,
    pub warnings: u16,
    pub info: String,
}

impl OkPacket {
    pub fn parse(payload: &[u8]) -> Result<Self, Error> {
        let mut reader = PacketReader::new(payload);
        reader.skip(1)?;
        let affected_rows = reader.lenenc_int()?;
        let last_insert_id = reader.lenenc_int()?;
        let status_flags = if reader.remaining() >= 2 {
            reader.u16()?
        } else {
            0
        };
        let warnings = if reader.remaining() >= 2 {
            reader.u16()?
        } else {
            0
        };
        let info = String::from_utf8_lossy(reader.rest()).into_owned();
        Ok(Self {
            affected_rows,
            last_insert_id,
            status_flags,
            warnings,
            info,
        })
    }

    pub fn more_results(&self) -> bool {
        self.status_flags & server_status::MORE_RESULTS_EXISTS != 0
    }
}

/// Status flags of a result-set terminator.
///
/// Old-style EOF packets carry warnings then status; OK-style terminators
/// carry two length-encoded integers first.
pub fn terminator_status(payload: &[u8], deprecate_eof: bool) -> Result<u16, Error> {
    if deprecate_eof {
        return Ok(OkPacket::parse(payload)?.status_flags);
    }
    let mut reader = PacketReader::new(payload);
    reader.skip(1)?;
    if reader.remaining() < 4 {
        return Ok(0);
    }
    let _warnings = reader.u16()?;
    reader.u16()
}

/// Body of an ERR packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrPacket {
    pub code: u16,
    pub sql_state: Option<String>,
    pub message: String,
}

impl ErrPacket {
    pub fn parse(payload: &[u8]) -> Result<Self, Error> {
        let mut reader = PacketReader::new(payload);
        reader.skip(1)?;
        let code = reader.u16()?;
        let sql_state = if reader.peek() == Some(b'#') {
            reader.skip(1)?;
            Some(String::from_utf8_lossy(reader.bytes(5)?).into_owned())
        } else {
            None
        };
        let message = String::from_utf8_lossy(reader.rest()).into_owned();
        Ok(Self {
            code,
            sql_state,
            message,
        })
    }
}

pub(crate) fn protocol_error(message: impl Into<String>) -> Error {
    Error::Protocol(ProtocolError::new(Backend::MySql, message))
}
