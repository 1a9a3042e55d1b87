//! Text-format value codec keyed by type OID.

use polystore_core::Value;
use std::fmt::Write as _;

/// Type OIDs from `pg_type` that the codec distinguishes.
pub mod oid {
    pub const UNSPECIFIED: u32 = 0;
    pub const BOOL: u32 = 16;
    pub const BYTEA: u32 = 17;
    pub const INT8: u32 = 20;
    pub const INT2: u32 = 21;
    pub const INT4: u32 = 23;
    pub const TEXT: u32 = 25;
    pub const OID: u32 = 26;
    pub const JSON: u32 = 114;
    pub const FLOAT4: u32 = 700;
    pub const FLOAT8: u32 = 701;
    pub const VARCHAR: u32 = 1043;
    pub const NUMERIC: u32 = 1700;
    pub const JSONB: u32 = 3802;
}

/// Decode one text-format column value.
///
/// Anything unparseable for its declared type falls back to `Text`.
pub fn decode_text(type_oid: u32, bytes: &[u8]) -> Value {
    let text = String::from_utf8_lossy(bytes);
    match type_oid {
        oid::BOOL => match text.as_ref() {
            "t" => Value::Bool(true),
            "f" => Value::Bool(false),
            _ => Value::Text(text.into_owned()),
        },
        oid::INT2 | oid::INT4 | oid::INT8 | oid::OID => text
            .parse::<i64>()
            .map_or_else(|_| Value::Text(text.into_owned()), Value::BigInt),
        oid::FLOAT4 | oid::FLOAT8 => match text.as_ref() {
            "NaN" => Value::Double(f64::NAN),
            "Infinity" => Value::Double(f64::INFINITY),
            "-Infinity" => Value::Double(f64::NEG_INFINITY),
            s => s
                .parse::<f64>()
                .map_or_else(|_| Value::Text(text.into_owned()), Value::Double),
        },
        oid::BYTEA => decode_bytea(&text).map_or_else(|| Value::Text(text.into_owned()), Value::Bytes),
        oid::JSON | oid::JSONB => serde_json::from_str(&text)
            .map_or_else(|_| Value::Text(text.into_owned()), Value::Json),
        _ => Value::Text(text.into_owned()),
    }
}

/// Encode a parameter as `(type oid, text bytes)`; `None` is SQL NULL.
///
/// Text and JSON go out as `unknown` (OID 0) so the server infers the type
/// from context.
pub fn encode_param(value: &Value) -> (u32, Option<Vec<u8>>) {
    match value {
        Value::Null => (oid::UNSPECIFIED, None),
        Value::Bool(b) => (oid::BOOL, Some(if *b { b"t".to_vec() } else { b"f".to_vec() })),
        Value::BigInt(i) => (oid::INT8, Some(i.to_string().into_bytes())),
        Value::Double(d) => (oid::FLOAT8, Some(encode_float(*d).into_bytes())),
        Value::Text(s) => (oid::UNSPECIFIED, Some(s.as_bytes().to_vec())),
        Value::Bytes(b) => (oid::BYTEA, Some(encode_bytea(b).into_bytes())),
        Value::Json(j) => (oid::UNSPECIFIED, Some(j.to_string().into_bytes())),
        Value::Array(items) => (oid::UNSPECIFIED, Some(encode_array(items).into_bytes())),
    }
}

fn encode_float(d: f64) -> String {
    if d.is_nan() {
        String::from("NaN")
    } else if d.is_infinite() {
        String::from(if d > 0.0 { "Infinity" } else { "-Infinity" })
    } else {
        d.to_string()
    }
}

fn encode_bytea(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(2 + bytes.len() * 2);
    out.push_str("\\x");
    for b in bytes {
        let _ = write!(out, "{:02x}", b);
    }
    out
}

/// Array literal `{a,"b c",NULL}`; elements are always quoted except NULL.
fn encode_array(items: &[Value]) -> String {
    let parts: Vec<String> = items
        .iter()
        .map(|item| match item {
            Value::Null => String::from("NULL"),
            other => {
                let text = match encode_param(other).1 {
                    Some(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                    None => String::new(),
                };
                format!("\"{}\"", text.replace('\\', "\\\\").replace('"', "\\\""))
            }
        })
        .collect();
    format!("{{{}}}", parts.join(","))
}

/// Decode bytea in hex (`\x0a0b`) or legacy escape format.
fn decode_bytea(text: &str) -> Option<Vec<u8>> {
    if let Some(hex) = text.strip_prefix("\\x") {
        if hex.len() % 2 != 0 {
            return None;
        }
        return (0..hex.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).ok())
            .collect();
    }
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' {
            if bytes.get(i + 1) == Some(&b'\\') {
                out.push(b'\\');
                i += 2;
            } else {
                let octal = text.get(i + 1..i + 4)?;
                out.push(u8::from_str_radix(octal, 8).ok()?);
                i += 4;
            }
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    Some(out)
}
