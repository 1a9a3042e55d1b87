//! JSON wire types of the `/v2/pipeline` endpoint.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use polystore_core::{Backend, Error, StatementError, StatementErrorKind, Value};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

/// A typed argument or result cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Cell {
    Null,
    /// 64-bit integers travel as decimal strings; bare numbers are accepted
    Integer {
        #[serde(deserialize_with = "integer_text")]
        value: String,
    },
    Float {
        #[serde(deserialize_with = "lenient_float")]
        value: f64,
    },
    Text { value: String },
    Blob {
        #[serde(alias = "value")]
        base64: String,
    },
}

impl Cell {
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Null => Cell::Null,
            Value::Bool(b) => Cell::Integer {
                value: i64::from(*b).to_string(),
            },
            Value::BigInt(i) => Cell::Integer {
                value: i.to_string(),
            },
            Value::Double(d) => Cell::Float { value: *d },
            Value::Text(s) => Cell::Text { value: s.clone() },
            Value::Bytes(b) => Cell::Blob {
                base64: STANDARD.encode(b),
            },
            Value::Json(_) | Value::Array(_) => Cell::Text {
                value: value.to_json().to_string(),
            },
        }
    }

    /// Decode into a [`Value`]. Unparseable integers and blobs stay as text.
    pub fn into_value(self) -> Value {
        match self {
            Cell::Null => Value::Null,
            Cell::Integer { value } => value
                .parse::<i64>()
                .map_or(Value::Text(value), Value::BigInt),
            Cell::Float { value } => Value::Double(value),
            Cell::Text { value } => Value::Text(value),
            Cell::Blob { base64 } => match STANDARD.decode(&base64) {
                Ok(bytes) => Value::Bytes(bytes),
                Err(_) => Value::Text(base64),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Stmt {
    pub sql: String,
    pub args: Vec<Cell>,
    pub want_rows: bool,
}

impl Stmt {
    pub fn new(sql: &str, params: &[Value]) -> Self {
        Self {
            sql: sql.to_string(),
            args: params.iter().map(Cell::from_value).collect(),
            want_rows: true,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamRequest {
    Execute { stmt: Stmt },
    Close,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub baton: Option<String>,
    pub requests: Vec<StreamRequest>,
}

impl PipelineRequest {
    /// Requests on the stream named by `baton`, or on a new stream.
    pub fn new(baton: Option<String>, requests: Vec<StreamRequest>) -> Self {
        Self { baton, requests }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Col {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StmtResult {
    #[serde(default)]
    pub cols: Vec<Col>,
    #[serde(default)]
    pub rows: Vec<Vec<Option<Cell>>>,
    #[serde(default)]
    pub affected_row_count: u64,
    #[serde(default, deserialize_with = "optional_integer_text")]
    pub last_insert_rowid: Option<String>,
}

impl StmtResult {
    pub fn column_names(&self) -> Vec<String> {
        self.cols
            .iter()
            .enumerate()
            .map(|(i, c)| c.name.clone().unwrap_or_else(|| format!("column{}", i)))
            .collect()
    }

    pub fn last_insert_rowid(&self) -> Option<i64> {
        self.last_insert_rowid.as_deref()?.parse().ok()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    pub message: String,
    #[serde(default)]
    pub code: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamResponse {
    Execute {
        result: StmtResult,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamResult {
    Ok { response: StreamResponse },
    Error { error: ErrorBody },
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineResponse {
    #[serde(default)]
    pub baton: Option<String>,
    /// Where later requests on this stream must be sent, when the server moves it
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub results: Vec<StreamResult>,
    /// Envelope-level failure; either a string or an error object
    #[serde(default)]
    pub error: Option<serde_json::Value>,
}

impl PipelineResponse {
    /// Take the first stream response, surfacing any envelope or stream error.
    pub fn into_first(self, sql: &str) -> Result<StreamResponse, Error> {
        if let Some(error) = self.error {
            let message = match &error {
                serde_json::Value::String(s) => s.clone(),
                other => other
                    .get("message")
                    .and_then(serde_json::Value::as_str)
                    .map_or_else(|| other.to_string(), str::to_string),
            };
            return Err(remote_error(message, None, sql));
        }
        match self.results.into_iter().next() {
            Some(StreamResult::Ok { response }) => Ok(response),
            Some(StreamResult::Error { error }) => Err(remote_error(error.message, error.code, sql)),
            None => Err(remote_error("empty pipeline response".to_string(), None, sql)),
        }
    }
}

fn integer_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    optional_integer_text(deserializer)?
        .ok_or_else(|| D::Error::custom("expected an integer, got null"))
}

fn optional_integer_text<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Null => Ok(None),
        serde_json::Value::String(s) => Ok(Some(s)),
        serde_json::Value::Number(n) if n.is_i64() || n.is_u64() => Ok(Some(n.to_string())),
        other => Err(D::Error::custom(format!("expected an integer, got {}", other))),
    }
}

fn lenient_float<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| D::Error::custom(format!("float out of range: {}", n))),
        serde_json::Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| D::Error::custom(format!("expected a float, got {:?}", s))),
        other => Err(D::Error::custom(format!("expected a float, got {}", other))),
    }
}

pub fn remote_error(message: String, code: Option<String>, sql: &str) -> Error {
    let message = match code {
        Some(code) => format!("{} [{}]", message, code),
        None => message,
    };
    StatementError::new(Backend::Turso, StatementErrorKind::Remote, message)
        .with_sql(sql)
        .into()
}
