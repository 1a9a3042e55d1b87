//! Binary prepared-statement packets.
//!
//! A parameterized statement is sent as `COM_STMT_PREPARE`, run with
//! `COM_STMT_EXECUTE` and released with `COM_STMT_CLOSE`. Result rows come
//! back in the binary row format.

use super::{Command, PacketReader, PacketWriter, protocol_error};
use crate::types::{ColumnDef, decode_binary, encode_param};
use polystore_core::{Error, Value};

/// `COM_STMT_PREPARE_OK` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrepareOk {
    pub statement_id: u32,
    pub num_columns: u16,
    pub num_params: u16,
    pub warnings: u16,
}

impl PrepareOk {
    pub fn parse(payload: &[u8]) -> Result<Self, Error> {
        let mut reader = PacketReader::new(payload);
        if reader.u8()? != 0x00 {
            return Err(protocol_error("expected COM_STMT_PREPARE_OK"));
        }
        let statement_id = reader.u32()?;
        let num_columns = reader.u16()?;
        let num_params = reader.u16()?;
        let _reserved = reader.u8()?;
        let warnings = if reader.remaining() >= 2 {
            reader.u16()?
        } else {
            0
        };
        Ok(Self {
            statement_id,
            num_columns,
            num_params,
            warnings,
        })
    }
}

pub fn prepare_packet(sql: &str) -> Vec<u8> {
    let mut w = PacketWriter::with_capacity(sql.len() + 1);
    w.u8(Command::StmtPrepare as u8).bytes(sql.as_bytes());
    w.into_inner()
}

pub fn close_packet(statement_id: u32) -> Vec<u8> {
    let mut w = PacketWriter::with_capacity(5);
    w.u8(Command::StmtClose as u8).u32(statement_id);
    w.into_inner()
}

/// `COM_STMT_EXECUTE` with every parameter bound and types always sent.
pub fn execute_packet(statement_id: u32, params: &[Value]) -> Vec<u8> {
    let mut w = PacketWriter::with_capacity(16 + params.len() * 9);
    w.u8(Command::StmtExecute as u8)
        .u32(statement_id)
        .u8(0x00) // CURSOR_TYPE_NO_CURSOR
        .u32(1); // iteration count
    if !params.is_empty() {
        let mut bitmap = vec![0u8; params.len().div_ceil(8)];
        for (i, value) in params.iter().enumerate() {
            if value.is_null() {
                bitmap[i / 8] |= 1 << (i % 8);
            }
        }
        let mut types = PacketWriter::with_capacity(params.len() * 2);
        let mut values = PacketWriter::new();
        for value in params {
            encode_param(value, &mut types, &mut values);
        }
        w.bytes(&bitmap)
            .u8(0x01) // new-params-bound flag
            .bytes(&types.into_inner())
            .bytes(&values.into_inner());
    }
    w.into_inner()
}

/// Decode a binary result row.
///
/// Layout: a 0x00 header, a NULL bitmap whose first two bits are reserved,
/// then the non-NULL values in column order.
pub fn decode_binary_row(payload: &[u8], columns: &[ColumnDef]) -> Result<Vec<Value>, Error> {
    let mut reader = PacketReader::new(payload);
    if reader.u8()? != 0x00 {
        return Err(protocol_error("binary row must start with 0x00"));
    }
    let bitmap = reader.bytes((columns.len() + 2).div_ceil(8))?;
    let mut values = Vec::with_capacity(columns.len());
    for (i, column) in columns.iter().enumerate() {
        let bit = i + 2;
        if bitmap[bit / 8] & (1 << (bit % 8)) != 0 {
            values.push(Value::Null);
        } else {
            values.push(decode_binary(&mut reader, column)?);
        }
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FieldType;

    fn column(name: &str, field_type: FieldType) -> ColumnDef {
        ColumnDef {
            table: String::from("widgets"),
            name: name.to_string(),
            charset: 255,
            length: 0,
            field_type,
            flags: 0,
            decimals: 0,
        }
    }

    #[test]
    fn test_parse_prepare_ok() {
        let payload = [0x00, 0x05, 0, 0, 0, 0x02, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00];
        let ok = PrepareOk::parse(&payload).unwrap();
        assert_eq!(ok.statement_id, 5);
        assert_eq!(ok.num_columns, 2);
        assert_eq!(ok.num_params, 1);
    }

    #[test]
    fn test_execute_packet_layout() {
        let packet = execute_packet(7, &[Value::BigInt(3), Value::Null]);
        assert_eq!(packet[0], 0x17);
        assert_eq!(&packet[1..5], &7u32.to_le_bytes());
        assert_eq!(packet[5], 0x00);
        assert_eq!(&packet[6..10], &1u32.to_le_bytes());
        // NULL bitmap: second parameter
        assert_eq!(packet[10], 0b10);
        assert_eq!(packet[11], 0x01);
        assert_eq!(&packet[12..16], &[0x08, 0x00, 0x06, 0x00]);
        assert_eq!(&packet[16..], &3u64.to_le_bytes());
    }

    #[test]
    fn test_execute_packet_without_params() {
        let packet = execute_packet(1, &[]);
        assert_eq!(packet.len(), 10);
    }

    #[test]
    fn test_decode_binary_row_with_null() {
        let columns = [
            column("id", FieldType::LongLong),
            column("name", FieldType::VarString),
            column("created_at", FieldType::DateTime),
        ];
        let mut payload = vec![0x00, 0b1_0000];
        payload.extend_from_slice(&9u64.to_le_bytes());
        payload.extend_from_slice(b"\x05gizmo");
        let row = decode_binary_row(&payload, &columns).unwrap();
        assert_eq!(
            row,
            vec![
                Value::BigInt(9),
                Value::Text(String::from("gizmo")),
                Value::Null
            ]
        );
    }

    #[test]
    fn test_close_packet() {
        assert_eq!(close_packet(0x0102), vec![0x19, 0x02, 0x01, 0, 0]);
    }
}
