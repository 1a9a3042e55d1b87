//! Blocking PostgreSQL connection.

use crate::auth::{ScramClient, md5_password, scram};
use crate::config::PgConfig;
use crate::protocol::{
    BackendMessage, DescribeKind, ErrorFields, MessageWriter, TransactionStatus, affected_rows,
    parse_backend_message, protocol_error,
};
use crate::types::{decode_text, encode_param};
use polystore_core::{
    Backend, ColumnInfo, ConnectionError, ConnectionErrorKind, Error, Result, Row,
    StatementDriver, StatementError, StatementErrorKind, Value, ensure_can_begin,
    ensure_open_transaction,
};
use std::collections::HashMap;
use std::io::{self, BufReader, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::Arc;

/// Rows of the first row-returning statement plus the summed row counts of
/// the others.
#[derive(Debug, Default)]
struct Outcome {
    rows: Option<Vec<Row>>,
    affected: u64,
}

/// A connection to a PostgreSQL server.
pub struct PgDriver {
    config: PgConfig,
    stream: Option<BufReader<TcpStream>>,
    process_id: i32,
    secret_key: i32,
    parameters: HashMap<String, String>,
    status: TransactionStatus,
    in_transaction: bool,
}

impl std::fmt::Debug for PgDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgDriver")
            .field("host", &self.config.host)
            .field("port", &self.config.port)
            .field("database", &self.config.database)
            .field("process_id", &self.process_id)
            .field("status", &self.status)
            .field("connected", &self.stream.is_some())
            .finish_non_exhaustive()
    }
}

impl PgDriver {
    /// Connect, authenticate and wait for the first `ReadyForQuery`.
    pub fn connect(config: PgConfig) -> Result<Self> {
        let stream = open_stream(&config)?;
        let mut driver = Self {
            config,
            stream: Some(BufReader::new(stream)),
            process_id: 0,
            secret_key: 0,
            parameters: HashMap::new(),
            status: TransactionStatus::Idle,
            in_transaction: false,
        };

        let mut startup = MessageWriter::new();
        startup.startup(&driver.config.startup_params());
        driver.send(&startup.take())?;
        driver.authenticate()?;
        driver.read_startup_messages()?;

        tracing::info!(
            backend = "pgsql",
            host = %driver.config.host,
            port = driver.config.port,
            database = %driver.config.database,
            process_id = driver.process_id,
            "postgres connection established"
        );
        Ok(driver)
    }

    /// A server parameter reported at startup, e.g. `server_version`.
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters.get(name).map(String::as_str)
    }

    pub fn process_id(&self) -> i32 {
        self.process_id
    }

    /// `(process_id, secret_key)` as needed by a cancel request.
    pub fn backend_key(&self) -> (i32, i32) {
        (self.process_id, self.secret_key)
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Transaction status from the most recent `ReadyForQuery`.
    pub fn transaction_status(&self) -> TransactionStatus {
        self.status
    }

    fn authenticate(&mut self) -> Result<()> {
        loop {
            match self.read_message()? {
                BackendMessage::AuthenticationOk => return Ok(()),
                BackendMessage::AuthenticationCleartextPassword => {
                    let password = self.require_password()?;
                    let mut w = MessageWriter::new();
                    w.password(&password);
                    self.send(&w.take())?;
                }
                BackendMessage::AuthenticationMd5Password(salt) => {
                    let password = self.require_password()?;
                    let hashed = md5_password(&self.config.user, &password, salt);
                    let mut w = MessageWriter::new();
                    w.password(&hashed);
                    self.send(&w.take())?;
                }
                BackendMessage::AuthenticationSasl(mechanisms) => {
                    if !mechanisms.iter().any(|m| m == scram::MECHANISM) {
                        return Err(auth_failed(format!(
                            "no supported SASL mechanism offered: {}",
                            mechanisms.join(", ")
                        )));
                    }
                    self.scram_auth()?;
                }
                BackendMessage::AuthenticationUnsupported(code) => {
                    return Err(auth_failed(format!(
                        "unsupported authentication method (code {})",
                        code
                    )));
                }
                BackendMessage::ErrorResponse(fields) => {
                    return Err(error_from_fields(&fields, None));
                }
                BackendMessage::NoticeResponse(_) => {}
                other => {
                    return Err(protocol_error(format!(
                        "unexpected message during authentication: {:?}",
                        other
                    )));
                }
            }
        }
    }

    fn scram_auth(&mut self) -> Result<()> {
        let password = self.require_password()?;
        let mut client = ScramClient::new(&self.config.user, &password);
        let mut w = MessageWriter::new();
        w.sasl_initial_response(scram::MECHANISM, &client.client_first());
        self.send(&w.take())?;

        let server_first = match self.read_message()? {
            BackendMessage::AuthenticationSaslContinue(data) => data,
            BackendMessage::ErrorResponse(fields) => return Err(error_from_fields(&fields, None)),
            other => {
                return Err(protocol_error(format!(
                    "expected SASL continue, got {:?}",
                    other
                )));
            }
        };
        let client_final = client.process_server_first(&server_first)?;
        w.sasl_response(&client_final);
        self.send(&w.take())?;

        match self.read_message()? {
            BackendMessage::AuthenticationSaslFinal(data) => client.verify_server_final(&data),
            BackendMessage::ErrorResponse(fields) => Err(error_from_fields(&fields, None)),
            other => Err(protocol_error(format!(
                "expected SASL final, got {:?}",
                other
            ))),
        }
    }

    fn require_password(&self) -> Result<String> {
        self.config
            .password
            .clone()
            .ok_or_else(|| auth_failed("server requested a password but none is configured"))
    }

    fn read_startup_messages(&mut self) -> Result<()> {
        loop {
            match self.read_message()? {
                BackendMessage::BackendKeyData {
                    process_id,
                    secret_key,
                } => {
                    self.process_id = process_id;
                    self.secret_key = secret_key;
                }
                BackendMessage::ParameterStatus { name, value } => {
                    self.parameters.insert(name, value);
                }
                BackendMessage::ReadyForQuery(status) => {
                    self.status = status;
                    return Ok(());
                }
                BackendMessage::ErrorResponse(fields) => {
                    return Err(error_from_fields(&fields, None));
                }
                BackendMessage::NoticeResponse(_) => {}
                other => {
                    return Err(protocol_error(format!(
                        "unexpected message during startup: {:?}",
                        other
                    )));
                }
            }
        }
    }

    fn stream_mut(&mut self) -> Result<&mut BufReader<TcpStream>> {
        self.stream.as_mut().ok_or_else(|| {
            ConnectionError::new(
                Backend::Postgres,
                ConnectionErrorKind::Disconnected,
                "connection is closed",
            )
            .into()
        })
    }

    /// Drop the socket after an I/O failure.
    fn lost(&mut self, err: io::Error) -> Error {
        self.stream = None;
        self.in_transaction = false;
        let kind = match err.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => ConnectionErrorKind::Timeout,
            _ => ConnectionErrorKind::Disconnected,
        };
        ConnectionError::new(Backend::Postgres, kind, format!("connection lost: {}", err))
            .with_source(err)
            .into()
    }

    fn send(&mut self, bytes: &[u8]) -> Result<()> {
        let stream = self.stream_mut()?.get_mut();
        let result = stream.write_all(bytes).and_then(|()| stream.flush());
        result.map_err(|e| self.lost(e))
    }

    fn recv_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let result = self.stream_mut()?.read_exact(buf);
        result.map_err(|e| self.lost(e))
    }

    fn read_message(&mut self) -> Result<BackendMessage> {
        let mut header = [0u8; 5];
        self.recv_exact(&mut header)?;
        let tag = header[0];
        let len = i32::from_be_bytes([header[1], header[2], header[3], header[4]]);
        let body_len = usize::try_from(len)
            .ok()
            .and_then(|n| n.checked_sub(4))
            .ok_or_else(|| protocol_error(format!("invalid message length {}", len)))?;
        let mut body = vec![0u8; body_len];
        self.recv_exact(&mut body)?;
        parse_backend_message(tag, &body)
    }

    /// Read until `ReadyForQuery`, keeping the first error if one arrives.
    fn collect(&mut self, sql: &str) -> Result<Outcome> {
        let mut outcome = Outcome::default();
        let mut current: Option<(Arc<ColumnInfo>, Vec<u32>)> = None;
        let mut rows = Vec::new();
        let mut error = None;

        loop {
            match self.read_message()? {
                BackendMessage::RowDescription(fields) => {
                    let names = fields.iter().map(|f| f.name.clone()).collect();
                    let oids = fields.iter().map(|f| f.type_oid).collect();
                    current = Some((Arc::new(ColumnInfo::new(names)), oids));
                    rows = Vec::new();
                }
                BackendMessage::DataRow(values) => match &current {
                    Some((info, oids)) => {
                        let values = values
                            .into_iter()
                            .zip(oids)
                            .map(|(v, oid)| v.map_or(Value::Null, |b| decode_text(*oid, &b)))
                            .collect();
                        rows.push(Row::with_columns(Arc::clone(info), values));
                    }
                    None => {
                        if error.is_none() {
                            error = Some(protocol_error("DataRow without RowDescription"));
                        }
                    }
                },
                BackendMessage::CommandComplete(tag) => {
                    if current.take().is_some() {
                        if outcome.rows.is_none() {
                            outcome.rows = Some(std::mem::take(&mut rows));
                        }
                    } else {
                        outcome.affected += affected_rows(&tag);
                    }
                }
                BackendMessage::ErrorResponse(fields) => {
                    current = None;
                    if error.is_none() {
                        error = Some(error_from_fields(&fields, Some(sql)));
                    }
                }
                BackendMessage::ReadyForQuery(status) => {
                    self.status = status;
                    break;
                }
                BackendMessage::NoticeResponse(fields) => {
                    tracing::debug!(
                        backend = "pgsql",
                        severity = %fields.severity,
                        message = %fields.message,
                        "notice"
                    );
                }
                BackendMessage::ParameterStatus { name, value } => {
                    self.parameters.insert(name, value);
                }
                BackendMessage::ParseComplete
                | BackendMessage::BindComplete
                | BackendMessage::CloseComplete
                | BackendMessage::NoData
                | BackendMessage::EmptyQueryResponse
                | BackendMessage::PortalSuspended
                | BackendMessage::ParameterDescription(_)
                | BackendMessage::NotificationResponse { .. } => {}
                other => {
                    if error.is_none() {
                        error = Some(protocol_error(format!(
                            "unexpected message in query cycle: {:?}",
                            other
                        )));
                    }
                }
            }
        }

        match error {
            Some(e) => Err(e),
            None => Ok(outcome),
        }
    }

    fn run(&mut self, sql: &str, params: &[Value]) -> Result<Outcome> {
        let mut w = MessageWriter::new();
        if params.is_empty() {
            w.query(sql);
        } else {
            let (types, values): (Vec<u32>, Vec<Option<Vec<u8>>>) =
                params.iter().map(encode_param).unzip();
            w.parse("", sql, &types)
                .bind("", "", &values)
                .describe(DescribeKind::Portal, "")
                .execute("", 0)
                .sync();
        }
        self.send(&w.take())?;
        self.collect(sql)
    }
}

impl StatementDriver for PgDriver {
    fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        tracing::debug!(backend = "pgsql", sql, params = params.len(), "query");
        Ok(self.run(sql, params)?.rows.unwrap_or_default())
    }

    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64> {
        tracing::debug!(backend = "pgsql", sql, params = params.len(), "execute");
        Ok(self.run(sql, params)?.affected)
    }

    fn last_insert_id(&mut self) -> Result<i64> {
        let rows = self.run("SELECT lastval()", &[])?.rows.unwrap_or_default();
        rows.first()
            .and_then(|row| row.get(0))
            .and_then(Value::as_i64)
            .ok_or_else(|| protocol_error("lastval() returned no value"))
    }

    fn begin_transaction(&mut self) -> Result<()> {
        ensure_can_begin(self.in_transaction)?;
        self.run("BEGIN", &[])?;
        self.in_transaction = true;
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        ensure_open_transaction(self.in_transaction, "commit")?;
        self.in_transaction = false;
        self.run("COMMIT", &[])?;
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        ensure_open_transaction(self.in_transaction, "roll back")?;
        self.in_transaction = false;
        self.run("ROLLBACK", &[])?;
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    fn disconnect(&mut self) -> Result<()> {
        let Some(mut stream) = self.stream.take() else {
            return Ok(());
        };
        let mut w = MessageWriter::new();
        w.terminate();
        let socket = stream.get_mut();
        if let Err(e) = socket.write_all(w.as_bytes()).and_then(|()| socket.flush()) {
            tracing::warn!(backend = "pgsql", error = %e, "failed to send Terminate");
        }
        let _ = socket.shutdown(Shutdown::Both);
        self.in_transaction = false;
        tracing::info!(
            backend = "pgsql",
            process_id = self.process_id,
            "postgres connection closed"
        );
        Ok(())
    }

    fn backend(&self) -> Backend {
        Backend::Postgres
    }
}

impl Drop for PgDriver {
    fn drop(&mut self) {
        let _ = self.disconnect();
    }
}

fn open_stream(config: &PgConfig) -> Result<TcpStream> {
    let connect_error = |kind, message: String, err: io::Error| -> Error {
        ConnectionError::new(Backend::Postgres, kind, message)
            .with_source(err)
            .into()
    };
    let addrs = config.socket_addr().to_socket_addrs().map_err(|e| {
        connect_error(
            ConnectionErrorKind::Connect,
            format!("cannot resolve {}: {}", config.socket_addr(), e),
            e,
        )
    })?;

    let mut last_error = None;
    for addr in addrs {
        match TcpStream::connect_timeout(&addr, config.connect_timeout) {
            Ok(stream) => {
                let configure = stream
                    .set_nodelay(true)
                    .and_then(|()| stream.set_read_timeout(Some(config.connect_timeout)))
                    .and_then(|()| stream.set_write_timeout(Some(config.connect_timeout)));
                return configure.map(|()| stream).map_err(|e| {
                    connect_error(
                        ConnectionErrorKind::Connect,
                        format!("cannot configure socket: {}", e),
                        e,
                    )
                });
            }
            Err(e) => last_error = Some(e),
        }
    }

    let err = last_error
        .unwrap_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no addresses resolved"));
    let kind = match err.kind() {
        io::ErrorKind::ConnectionRefused => ConnectionErrorKind::Refused,
        io::ErrorKind::TimedOut => ConnectionErrorKind::Timeout,
        _ => ConnectionErrorKind::Connect,
    };
    Err(connect_error(
        kind,
        format!("cannot connect to {}: {}", config.socket_addr(), err),
        err,
    ))
}

fn auth_failed(message: impl Into<String>) -> Error {
    ConnectionError::new(
        Backend::Postgres,
        ConnectionErrorKind::Authentication,
        message,
    )
    .into()
}

/// Classify a SQLSTATE that is not a connection failure.
pub fn error_kind(code: &str) -> StatementErrorKind {
    match code {
        "42P01" | "42703" | "42883" | "3D000" => StatementErrorKind::NotFound,
        "42501" => StatementErrorKind::Permission,
        "55P03" => StatementErrorKind::Deadlock,
        "57014" => StatementErrorKind::Timeout,
        _ => match code.get(..2) {
            Some("23") => StatementErrorKind::Constraint,
            Some("42") => StatementErrorKind::Syntax,
            Some("40") => StatementErrorKind::Deadlock,
            _ => StatementErrorKind::Database,
        },
    }
}

/// Turn an `ErrorResponse` into an [`Error`].
///
/// Class 08 and 28 become connection errors; everything else is a
/// statement error carrying the SQLSTATE and, when known, the statement.
pub fn error_from_fields(fields: &ErrorFields, sql: Option<&str>) -> Error {
    let mut message = fields.message.clone();
    if let Some(detail) = &fields.detail {
        message.push_str(": ");
        message.push_str(detail);
    }
    let connection_kind = match fields.code.get(..2) {
        Some("08") => Some(ConnectionErrorKind::Connect),
        Some("28") => Some(ConnectionErrorKind::Authentication),
        _ => None,
    };
    if let Some(kind) = connection_kind {
        return ConnectionError::new(Backend::Postgres, kind, message).into();
    }

    let mut err = StatementError::new(Backend::Postgres, error_kind(&fields.code), message)
        .with_sqlstate(fields.code.clone());
    if let Some(sql) = sql {
        err = err.with_sql(sql);
    }
    err.into()
}
