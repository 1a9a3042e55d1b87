//! Conversion between [`Value`] and TDS column data.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use polystore_core::{Backend, Error, ProtocolError, Value};
use tiberius::{ColumnData, FromSql, Query};

/// Bind one parameter to the next `@Pn` slot.
pub fn bind_param<'a>(query: &mut Query<'a>, value: &'a Value) {
    match value {
        Value::Null => query.bind(Option::<&str>::None),
        Value::Bool(b) => query.bind(*b),
        Value::BigInt(i) => query.bind(*i),
        Value::Double(d) => query.bind(*d),
        Value::Text(s) => query.bind(s.as_str()),
        Value::Bytes(b) => query.bind(b.as_slice()),
        Value::Json(j) => query.bind(j.to_string()),
        Value::Array(_) => query.bind(value.to_json().to_string()),
    }
}

/// Decode one column of a result row.
///
/// Integers widen to `BigInt`; `DECIMAL`, `UNIQUEIDENTIFIER`, `XML` and
/// temporal types surface as text.
pub fn decode_column(data: ColumnData<'static>) -> Result<Value, Error> {
    let value = match data {
        ColumnData::U8(v) => v.map_or(Value::Null, |v| Value::BigInt(i64::from(v))),
        ColumnData::I16(v) => v.map_or(Value::Null, |v| Value::BigInt(i64::from(v))),
        ColumnData::I32(v) => v.map_or(Value::Null, |v| Value::BigInt(i64::from(v))),
        ColumnData::I64(v) => v.map_or(Value::Null, Value::BigInt),
        ColumnData::F32(v) => v.map_or(Value::Null, |v| Value::Double(f64::from(v))),
        ColumnData::F64(v) => v.map_or(Value::Null, Value::Double),
        ColumnData::Bit(v) => v.map_or(Value::Null, Value::Bool),
        ColumnData::String(v) => v.map_or(Value::Null, |s| Value::Text(s.into_owned())),
        ColumnData::Binary(v) => v.map_or(Value::Null, |b| Value::Bytes(b.into_owned())),
        ColumnData::Guid(v) => v.map_or(Value::Null, |g| Value::Text(g.to_string())),
        ColumnData::Numeric(v) => v.map_or(Value::Null, |n| Value::Text(n.to_string())),
        ColumnData::Xml(v) => v.map_or(Value::Null, |x| Value::Text(x.into_owned().into_string())),
        temporal => decode_temporal(&temporal)?,
    };
    Ok(value)
}

fn decode_temporal(data: &ColumnData<'static>) -> Result<Value, Error> {
    let text = match data {
        ColumnData::Date(_) => NaiveDate::from_sql(data)
            .map(|v| v.map(|d| d.format("%Y-%m-%d").to_string())),
        ColumnData::Time(_) => NaiveTime::from_sql(data)
            .map(|v| v.map(|t| t.format("%H:%M:%S%.f").to_string())),
        ColumnData::DateTimeOffset(_) => {
            DateTime::<FixedOffset>::from_sql(data).map(|v| v.map(|dt| dt.to_rfc3339()))
        }
        _ => NaiveDateTime::from_sql(data)
            .map(|v| v.map(|dt| dt.format("%Y-%m-%d %H:%M:%S%.f").to_string())),
    };
    match text {
        Ok(Some(text)) => Ok(Value::Text(text)),
        Ok(None) => Ok(Value::Null),
        Err(e) => Err(Error::Protocol(ProtocolError::new(
            Backend::SqlServer,
            format!("cannot decode column: {}", e),
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::borrow::Cow;
    use tiberius::numeric::Numeric;

    #[test]
    fn test_integers_widen() {
        assert_eq!(decode_column(ColumnData::U8(Some(7))).unwrap(), Value::BigInt(7));
        assert_eq!(decode_column(ColumnData::I16(Some(-3))).unwrap(), Value::BigInt(-3));
        assert_eq!(decode_column(ColumnData::I32(Some(42))).unwrap(), Value::BigInt(42));
        assert_eq!(decode_column(ColumnData::I32(None)).unwrap(), Value::Null);
    }

    #[test]
    fn test_text_binary_and_bit() {
        assert_eq!(
            decode_column(ColumnData::String(Some(Cow::Borrowed("O'Brien")))).unwrap(),
            Value::from("O'Brien")
        );
        assert_eq!(
            decode_column(ColumnData::Binary(Some(Cow::Owned(vec![1, 2])))).unwrap(),
            Value::Bytes(vec![1, 2])
        );
        assert_eq!(decode_column(ColumnData::Bit(Some(true))).unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_decimal_surfaces_as_text() {
        let numeric = Numeric::new_with_scale(12345, 2);
        assert_eq!(
            decode_column(ColumnData::Numeric(Some(numeric))).unwrap(),
            Value::from("123.45")
        );
    }

    #[test]
    fn test_null_temporal() {
        assert_eq!(decode_column(ColumnData::DateTime2(None)).unwrap(), Value::Null);
        assert_eq!(decode_column(ColumnData::Date(None)).unwrap(), Value::Null);
    }
}
