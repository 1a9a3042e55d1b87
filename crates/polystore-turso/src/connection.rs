//! Blocking pipeline client.

use crate::config::TursoConfig;
use crate::protocol::{
    Cell, PipelineRequest, PipelineResponse, Stmt, StmtResult, StreamRequest, StreamResponse,
    remote_error,
};
use polystore_core::{
    Backend, ColumnInfo, ConnectionError, ConnectionErrorKind, Error, ProtocolError, Result, Row,
    StatementDriver, Value, ensure_can_begin, ensure_open_transaction,
};
use reqwest::blocking::Client;
use std::sync::Arc;

/// An open server stream, addressed by the baton of its last response.
#[derive(Debug, Default)]
struct Stream {
    baton: Option<String>,
    base_url: Option<String>,
}

/// A handle to a remote libSQL database.
///
/// Outside a transaction every statement is its own pipeline request on a
/// fresh server stream. [`begin_transaction`](StatementDriver::begin_transaction)
/// opens a stream that stays alive, via its baton, until `commit` or
/// `rollback` closes it.
#[derive(Debug)]
pub struct TursoDriver {
    config: TursoConfig,
    endpoint: String,
    client: Option<Client>,
    last_insert_rowid: Option<i64>,
    stream: Option<Stream>,
}

impl TursoDriver {
    pub fn connect(config: TursoConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("polystore/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                ConnectionError::new(
                    Backend::Turso,
                    ConnectionErrorKind::Connect,
                    format!("cannot build HTTP client: {}", e),
                )
                .with_source(e)
            })?;
        let endpoint = config.pipeline_url();
        tracing::info!(backend = "turso", endpoint = %endpoint, "turso pipeline client ready");
        Ok(Self {
            config,
            endpoint,
            client: Some(client),
            last_insert_rowid: None,
            stream: None,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn target(&self) -> String {
        match self.stream.as_ref().and_then(|s| s.base_url.as_deref()) {
            Some(base) => format!("{}/v2/pipeline", base.trim_end_matches('/')),
            None => self.endpoint.clone(),
        }
    }

    /// Post `requests`, on the open stream if there is one, and return the
    /// first stream response. The stream's baton is refreshed from the reply.
    fn send(&mut self, requests: Vec<StreamRequest>, sql: &str) -> Result<StreamResponse> {
        let client = self.client.as_ref().ok_or_else(closed)?;
        let baton = self.stream.as_ref().and_then(|s| s.baton.clone());
        let request = PipelineRequest::new(baton, requests);
        let mut builder = client.post(self.target()).json(&request);
        if let Some(token) = &self.config.auth_token {
            builder = builder.bearer_auth(token);
        }
        let response = builder.send().map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            tracing::warn!(backend = "turso", status = status.as_u16(), "pipeline request rejected");
            let message = if body.is_empty() {
                format!("HTTP {}", status)
            } else {
                format!("HTTP {}: {}", status, body.trim())
            };
            return Err(remote_error(message, None, sql));
        }
        let mut envelope: PipelineResponse = response.json().map_err(|e| {
            Error::Protocol(
                ProtocolError::new(Backend::Turso, format!("malformed pipeline response: {}", e))
                    .with_source(e),
            )
        })?;
        if let Some(stream) = self.stream.as_mut() {
            stream.baton = envelope.baton.take();
            if let Some(base_url) = envelope.base_url.take() {
                stream.base_url = Some(base_url);
            }
        }
        envelope.into_first(sql)
    }

    fn run(&mut self, sql: &str, params: &[Value]) -> Result<StmtResult> {
        let mut requests = vec![StreamRequest::Execute {
            stmt: Stmt::new(sql, params),
        }];
        if self.stream.is_none() {
            requests.push(StreamRequest::Close);
        }
        match self.send(requests, sql)? {
            StreamResponse::Execute { result } => Ok(result),
            _ => Err(unexpected_response(sql)),
        }
    }

    /// Send `sql` on the open stream and close it.
    fn finish(&mut self, sql: &str) -> Result<()> {
        let requests = vec![
            StreamRequest::Execute {
                stmt: Stmt::new(sql, &[]),
            },
            StreamRequest::Close,
        ];
        let outcome = self.send(requests, sql);
        self.stream = None;
        match outcome? {
            StreamResponse::Execute { .. } => Ok(()),
            _ => Err(unexpected_response(sql)),
        }
    }

    /// The id reported by the latest write, replacing any earlier one.
    fn remember_insert(&mut self, result: &StmtResult) {
        self.last_insert_rowid = result.last_insert_rowid();
    }
}

impl StatementDriver for TursoDriver {
    fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        tracing::debug!(backend = "turso", sql, params = params.len(), "query");
        let result = self.run(sql, params)?;
        let info = Arc::new(ColumnInfo::new(result.column_names()));
        Ok(result
            .rows
            .into_iter()
            .map(|cells| {
                let values = cells
                    .into_iter()
                    .map(|cell| cell.map_or(Value::Null, Cell::into_value))
                    .collect();
                Row::with_columns(Arc::clone(&info), values)
            })
            .collect())
    }

    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64> {
        tracing::debug!(backend = "turso", sql, params = params.len(), "execute");
        let result = self.run(sql, params)?;
        self.remember_insert(&result);
        Ok(result.affected_row_count)
    }

    /// The id from the last `execute` response; when that response carried
    /// none, `SELECT last_insert_rowid()` is asked on the current stream.
    fn last_insert_id(&mut self) -> Result<i64> {
        if let Some(id) = self.last_insert_rowid {
            return Ok(id);
        }
        let rows = self.query("SELECT last_insert_rowid()", &[])?;
        Ok(rows
            .first()
            .and_then(|row| row.get(0))
            .and_then(Value::as_i64)
            .unwrap_or(0))
    }

    fn begin_transaction(&mut self) -> Result<()> {
        ensure_can_begin(self.stream.is_some())?;
        if self.client.is_none() {
            return Err(closed());
        }
        self.stream = Some(Stream::default());
        if let Err(e) = self.run("BEGIN", &[]) {
            self.stream = None;
            return Err(e);
        }
        if self.stream.as_ref().is_none_or(|s| s.baton.is_none()) {
            self.stream = None;
            return Err(
                ProtocolError::new(Backend::Turso, "server did not keep the stream open").into(),
            );
        }
        tracing::debug!(backend = "turso", "transaction stream opened");
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        ensure_open_transaction(self.stream.is_some(), "commit")?;
        self.finish("COMMIT")?;
        tracing::debug!(backend = "turso", "transaction committed");
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        ensure_open_transaction(self.stream.is_some(), "roll back")?;
        self.finish("ROLLBACK")?;
        tracing::debug!(backend = "turso", "transaction rolled back");
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.stream.is_some()
    }

    fn disconnect(&mut self) -> Result<()> {
        if self.client.is_none() {
            return Ok(());
        }
        if self.stream.is_some() {
            if let Err(e) = self.finish("ROLLBACK") {
                tracing::warn!(backend = "turso", error = %e, "rollback on disconnect failed");
            }
        }
        self.client = None;
        tracing::info!(backend = "turso", endpoint = %self.endpoint, "turso client closed");
        Ok(())
    }

    fn backend(&self) -> Backend {
        Backend::Turso
    }
}

fn transport_error(err: reqwest::Error) -> Error {
    let kind = if err.is_timeout() {
        ConnectionErrorKind::Timeout
    } else if err.is_connect() {
        ConnectionErrorKind::Refused
    } else {
        ConnectionErrorKind::Connect
    };
    ConnectionError::new(Backend::Turso, kind, format!("pipeline request failed: {}", err))
        .with_source(err)
        .into()
}

fn unexpected_response(sql: &str) -> Error {
    ProtocolError::new(Backend::Turso, format!("unexpected response type for `{}`", sql)).into()
}

fn closed() -> Error {
    ConnectionError::new(
        Backend::Turso,
        ConnectionErrorKind::Disconnected,
        "connection is closed",
    )
    .into()
}
