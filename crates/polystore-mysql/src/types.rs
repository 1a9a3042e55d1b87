//! Column metadata and value conversion for MySQL.
//!
//! Integers of every width decode to `Value::BigInt`; an unsigned BIGINT
//! above `i64::MAX` decodes to its decimal text. DECIMAL, temporal types and
//! character data decode to `Value::Text`; BLOB and binary-collation strings
//! to `Value::Bytes`; JSON columns to `Value::Json`.

#![allow(clippy::cast_possible_truncation)]

use crate::protocol::{PacketReader, PacketWriter, charset};
use polystore_core::{Error, Value};

/// Column type codes (`MYSQL_TYPE_*`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Decimal,
    Tiny,
    Short,
    Long,
    Float,
    Double,
    Null,
    Timestamp,
    LongLong,
    Int24,
    Date,
    Time,
    DateTime,
    Year,
    VarChar,
    Bit,
    Json,
    NewDecimal,
    Enum,
    Set,
    TinyBlob,
    MediumBlob,
    LongBlob,
    Blob,
    VarString,
    String,
    Geometry,
    /// A code this driver does not know; decoded as length-encoded bytes.
    Other(u8),
}

impl FieldType {
    pub fn from_code(code: u8) -> Self {
        match code {
            0x00 => FieldType::Decimal,
            0x01 => FieldType::Tiny,
            0x02 => FieldType::Short,
            0x03 => FieldType::Long,
            0x04 => FieldType::Float,
            0x05 => FieldType::Double,
            0x06 => FieldType::Null,
            0x07 | 0x11 => FieldType::Timestamp,
            0x08 => FieldType::LongLong,
            0x09 => FieldType::Int24,
            0x0A | 0x0E => FieldType::Date,
            0x0B | 0x13 => FieldType::Time,
            0x0C | 0x12 => FieldType::DateTime,
            0x0D => FieldType::Year,
            0x0F => FieldType::VarChar,
            0x10 => FieldType::Bit,
            0xF5 => FieldType::Json,
            0xF6 => FieldType::NewDecimal,
            0xF7 => FieldType::Enum,
            0xF8 => FieldType::Set,
            0xF9 => FieldType::TinyBlob,
            0xFA => FieldType::MediumBlob,
            0xFB => FieldType::LongBlob,
            0xFC => FieldType::Blob,
            0xFD => FieldType::VarString,
            0xFE => FieldType::String,
            0xFF => FieldType::Geometry,
            other => FieldType::Other(other),
        }
    }

    pub fn code(self) -> u8 {
        match self {
            FieldType::Decimal => 0x00,
            FieldType::Tiny => 0x01,
            FieldType::Short => 0x02,
            FieldType::Long => 0x03,
            FieldType::Float => 0x04,
            FieldType::Double => 0x05,
            FieldType::Null => 0x06,
            FieldType::Timestamp => 0x07,
            FieldType::LongLong => 0x08,
            FieldType::Int24 => 0x09,
            FieldType::Date => 0x0A,
            FieldType::Time => 0x0B,
            FieldType::DateTime => 0x0C,
            FieldType::Year => 0x0D,
            FieldType::VarChar => 0x0F,
            FieldType::Bit => 0x10,
            FieldType::Json => 0xF5,
            FieldType::NewDecimal => 0xF6,
            FieldType::Enum => 0xF7,
            FieldType::Set => 0xF8,
            FieldType::TinyBlob => 0xF9,
            FieldType::MediumBlob => 0xFA,
            FieldType::LongBlob => 0xFB,
            FieldType::Blob => 0xFC,
            FieldType::VarString => 0xFD,
            FieldType::String => 0xFE,
            FieldType::Geometry => 0xFF,
            FieldType::Other(code) => code,
        }
    }

    pub fn is_integer(self) -> bool {
        matches!(
            self,
            FieldType::Tiny
                | FieldType::Short
                | FieldType::Long
                | FieldType::LongLong
                | FieldType::Int24
                | FieldType::Year
        )
    }
}

pub mod column_flags {
    pub const NOT_NULL: u16 = 1;
    pub const PRIMARY_KEY: u16 = 1 << 1;
    pub const UNSIGNED: u16 = 1 << 5;
    pub const BINARY: u16 = 1 << 7;
    pub const AUTO_INCREMENT: u16 = 1 << 9;
}

/// One column definition packet (protocol 4.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub table: String,
    pub name: String,
    pub charset: u16,
    pub length: u32,
    pub field_type: FieldType,
    pub flags: u16,
    pub decimals: u8,
}

impl ColumnDef {
    pub fn parse(payload: &[u8]) -> Result<Self, Error> {
        let mut reader = PacketReader::new(payload);
        let _catalog = reader.lenenc_bytes()?;
        let _schema = reader.lenenc_bytes()?;
        let table = reader.lenenc_string()?;
        let _org_table = reader.lenenc_bytes()?;
        let name = reader.lenenc_string()?;
        let _org_name = reader.lenenc_bytes()?;
        let _fixed_len = reader.lenenc_int()?;
        let charset = reader.u16()?;
        let length = reader.u32()?;
        let field_type = FieldType::from_code(reader.u8()?);
        let flags = reader.u16()?;
        let decimals = reader.u8()?;
        Ok(Self {
            table,
            name,
            charset,
            length,
            field_type,
            flags,
            decimals,
        })
    }

    pub fn is_unsigned(&self) -> bool {
        self.flags & column_flags::UNSIGNED != 0
    }

    /// Binary collation: the bytes are not text.
    pub fn is_binary(&self) -> bool {
        self.charset == charset::BINARY
    }
}

fn unsigned_to_value(v: u64) -> Value {
    i64::try_from(v).map_or_else(|_| Value::Text(v.to_string()), Value::BigInt)
}

fn string_like(bytes: &[u8], column: &ColumnDef) -> Value {
    match column.field_type {
        FieldType::Json => serde_json::from_slice(bytes).map_or_else(
            |_| Value::Text(String::from_utf8_lossy(bytes).into_owned()),
            Value::Json,
        ),
        FieldType::Bit | FieldType::Geometry => Value::Bytes(bytes.to_vec()),
        FieldType::TinyBlob
        | FieldType::MediumBlob
        | FieldType::LongBlob
        | FieldType::Blob
        | FieldType::VarString
        | FieldType::String
        | FieldType::VarChar
            if column.is_binary() =>
        {
            Value::Bytes(bytes.to_vec())
        }
        _ => Value::Text(String::from_utf8_lossy(bytes).into_owned()),
    }
}

/// Decode one non-NULL value of a binary protocol row.
pub fn decode_binary(reader: &mut PacketReader<'_>, column: &ColumnDef) -> Result<Value, Error> {
    let unsigned = column.is_unsigned();
    let value = match column.field_type {
        FieldType::Null => Value::Null,
        FieldType::Tiny => {
            let b = reader.u8()?;
            Value::BigInt(if unsigned {
                i64::from(b)
            } else {
                i64::from(b as i8)
            })
        }
        FieldType::Short | FieldType::Year => {
            let v = reader.u16()?;
            Value::BigInt(if unsigned {
                i64::from(v)
            } else {
                i64::from(v as i16)
            })
        }
        FieldType::Long | FieldType::Int24 => {
            let v = reader.u32()?;
            Value::BigInt(if unsigned {
                i64::from(v)
            } else {
                i64::from(v as i32)
            })
        }
        FieldType::LongLong => {
            let v = reader.u64()?;
            if unsigned {
                unsigned_to_value(v)
            } else {
                Value::BigInt(v as i64)
            }
        }
        FieldType::Float => Value::Double(f64::from(reader.f32()?)),
        FieldType::Double => Value::Double(reader.f64()?),
        FieldType::Date | FieldType::DateTime | FieldType::Timestamp => {
            let len = usize::from(reader.u8()?);
            let body = reader.bytes(len)?;
            Value::Text(format_datetime(column.field_type, body))
        }
        FieldType::Time => {
            let len = usize::from(reader.u8()?);
            let body = reader.bytes(len)?;
            Value::Text(format_time(body))
        }
        _ => string_like(reader.lenenc_bytes()?, column),
    };
    Ok(value)
}

/// Decode one non-NULL value of a text protocol row.
pub fn decode_text(bytes: &[u8], column: &ColumnDef) -> Value {
    let text = || String::from_utf8_lossy(bytes).into_owned();
    if column.field_type.is_integer() {
        let s = text();
        if let Ok(v) = s.parse::<i64>() {
            return Value::BigInt(v);
        }
        return s.parse::<u64>().map_or(Value::Text(s), unsigned_to_value);
    }
    match column.field_type {
        FieldType::Float | FieldType::Double => {
            let s = text();
            s.parse::<f64>().map_or(Value::Text(s), Value::Double)
        }
        FieldType::Null => Value::Null,
        _ => string_like(bytes, column),
    }
}

fn format_datetime(field_type: FieldType, body: &[u8]) -> String {
    if body.len() < 4 {
        return if field_type == FieldType::Date {
            String::from("0000-00-00")
        } else {
            String::from("0000-00-00 00:00:00")
        };
    }
    let year = u16::from_le_bytes([body[0], body[1]]);
    let date = format!("{:04}-{:02}-{:02}", year, body[2], body[3]);
    if field_type == FieldType::Date {
        return date;
    }
    let (h, m, s) = if body.len() >= 7 {
        (body[4], body[5], body[6])
    } else {
        (0, 0, 0)
    };
    let mut out = format!("{} {:02}:{:02}:{:02}", date, h, m, s);
    if body.len() >= 11 {
        let micros = u32::from_le_bytes([body[7], body[8], body[9], body[10]]);
        out.push_str(&format!(".{:06}", micros));
    }
    out
}

fn format_time(body: &[u8]) -> String {
    if body.len() < 8 {
        return String::from("00:00:00");
    }
    let sign = if body[0] == 0 { "" } else { "-" };
    let days = u32::from_le_bytes([body[1], body[2], body[3], body[4]]);
    let hours = days * 24 + u32::from(body[5]);
    let mut out = format!("{}{:02}:{:02}:{:02}", sign, hours, body[6], body[7]);
    if body.len() >= 12 {
        let micros = u32::from_le_bytes([body[8], body[9], body[10], body[11]]);
        out.push_str(&format!(".{:06}", micros));
    }
    out
}

/// Append one bound parameter: its type pair to `types`, its bytes to `values`.
///
/// NULL contributes a type only; the caller sets its bit in the NULL bitmap.
pub fn encode_param(value: &Value, types: &mut PacketWriter, values: &mut PacketWriter) {
    let field_type = match value {
        Value::Null => FieldType::Null,
        Value::Bool(b) => {
            values.u8(u8::from(*b));
            FieldType::Tiny
        }
        Value::BigInt(v) => {
            values.u64(*v as u64);
            FieldType::LongLong
        }
        Value::Double(v) => {
            values.u64(v.to_bits());
            FieldType::Double
        }
        Value::Text(s) => {
            values.lenenc_bytes(s.as_bytes());
            FieldType::VarString
        }
        Value::Bytes(b) => {
            values.lenenc_bytes(b);
            FieldType::Blob
        }
        Value::Json(_) | Value::Array(_) => {
            values.lenenc_bytes(value.to_json().to_string().as_bytes());
            FieldType::VarString
        }
    };
    types.u8(field_type.code()).u8(0x00);
}
