//! Conversion between polystore values and BSON.

use bson::oid::ObjectId;
use bson::spec::BinarySubtype;
use bson::{Binary, Bson};
use polystore_core::{Document, Row, Value};
use serde_json::{Map, Number};

pub const ID_FIELD: &str = "_id";

pub fn to_bson(value: &Value) -> Bson {
    match value {
        Value::Null => Bson::Null,
        Value::Bool(b) => Bson::Boolean(*b),
        Value::BigInt(i) => Bson::Int64(*i),
        Value::Double(d) => Bson::Double(*d),
        Value::Text(s) => Bson::String(s.clone()),
        Value::Bytes(b) => Bson::Binary(Binary {
            subtype: BinarySubtype::Generic,
            bytes: b.clone(),
        }),
        Value::Json(json) => json_to_bson(json),
        Value::Array(items) => Bson::Array(items.iter().map(to_bson).collect()),
    }
}

pub fn json_to_bson(json: &serde_json::Value) -> Bson {
    match json {
        serde_json::Value::Null => Bson::Null,
        serde_json::Value::Bool(b) => Bson::Boolean(*b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Bson::Int64(i),
            None => Bson::Double(n.as_f64().unwrap_or(f64::NAN)),
        },
        serde_json::Value::String(s) => Bson::String(s.clone()),
        serde_json::Value::Array(items) => Bson::Array(items.iter().map(json_to_bson).collect()),
        serde_json::Value::Object(map) => Bson::Document(
            map.iter()
                .map(|(k, v)| (k.clone(), json_to_bson(v)))
                .collect(),
        ),
    }
}

/// Like [`to_bson`], but hex strings become ObjectIds, including inside
/// operator expressions such as `{"$in": [..]}`.
pub fn id_to_bson(value: &Value) -> Bson {
    object_ids(to_bson(value))
}

fn object_ids(bson: Bson) -> Bson {
    match bson {
        Bson::String(s) => match ObjectId::parse_str(&s) {
            Ok(oid) => Bson::ObjectId(oid),
            Err(_) => Bson::String(s),
        },
        Bson::Array(items) => Bson::Array(items.into_iter().map(object_ids).collect()),
        Bson::Document(doc) => Bson::Document(
            doc.into_iter()
                .map(|(k, v)| (k, object_ids(v)))
                .collect(),
        ),
        other => other,
    }
}

pub fn to_bson_document(doc: &Document) -> bson::Document {
    doc.iter()
        .map(|(key, value)| {
            let bson = if key == ID_FIELD {
                id_to_bson(value)
            } else {
                to_bson(value)
            };
            (key.to_string(), bson)
        })
        .collect()
}

/// Decode one BSON value. Sub-documents and arrays of sub-documents
/// surface as [`Value::Json`].
pub fn from_bson(bson: Bson) -> Value {
    match bson {
        Bson::Null | Bson::Undefined => Value::Null,
        Bson::Boolean(b) => Value::Bool(b),
        Bson::Int32(i) => Value::BigInt(i64::from(i)),
        Bson::Int64(i) => Value::BigInt(i),
        Bson::Double(d) => Value::Double(d),
        Bson::String(s) | Bson::Symbol(s) | Bson::JavaScriptCode(s) => Value::Text(s),
        Bson::ObjectId(oid) => Value::Text(oid.to_hex()),
        Bson::Binary(binary) => Value::Bytes(binary.bytes),
        Bson::DateTime(dt) => Value::Text(
            dt.try_to_rfc3339_string()
                .unwrap_or_else(|_| dt.timestamp_millis().to_string()),
        ),
        doc @ Bson::Document(_) => Value::Json(bson_to_json(doc)),
        Bson::Array(items) => {
            if items.iter().any(|b| matches!(b, Bson::Document(_) | Bson::Array(_))) {
                Value::Json(bson_to_json(Bson::Array(items)))
            } else {
                Value::Array(items.into_iter().map(from_bson).collect())
            }
        }
        other => Value::Text(other.to_string()),
    }
}

fn bson_to_json(bson: Bson) -> serde_json::Value {
    match bson {
        Bson::Document(doc) => serde_json::Value::Object(
            doc.into_iter()
                .map(|(k, v)| (k, bson_to_json(v)))
                .collect::<Map<_, _>>(),
        ),
        Bson::Array(items) => serde_json::Value::Array(items.into_iter().map(bson_to_json).collect()),
        Bson::Double(d) => Number::from_f64(d).map_or(serde_json::Value::Null, serde_json::Value::Number),
        other => from_bson(other).to_json(),
    }
}

/// One row per document, columns in stored field order.
pub fn document_to_row(doc: bson::Document) -> Row {
    let (names, values): (Vec<String>, Vec<Value>) =
        doc.into_iter().map(|(k, v)| (k, from_bson(v))).unzip();
    Row::new(names, values)
}

/// Render a generated id the way callers see it in rows.
pub fn id_string(id: Bson) -> String {
    match id {
        Bson::ObjectId(oid) => oid.to_hex(),
        other => from_bson(other).to_string(),
    }
}
