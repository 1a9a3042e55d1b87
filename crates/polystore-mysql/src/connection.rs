//! Blocking MySQL connection.
//!
//! Statements with parameters run through the binary prepared-statement
//! protocol; parameterless statements use `COM_QUERY`. Values are never
//! interpolated into statement text.

use crate::auth::{self, caching_sha2, plugins};
use crate::config::MySqlConfig;
use crate::protocol::handshake::{Handshake, HandshakeResponse};
use crate::protocol::prepared::{self, PrepareOk};
use crate::protocol::{
    Command, ErrPacket, MAX_PACKET_SIZE, OkPacket, PacketHeader, PacketKind, PacketReader,
    capabilities, protocol_error, server_status, terminator_status, writer,
};
use crate::types::{ColumnDef, decode_text};
use polystore_core::{
    Backend, ColumnInfo, ConnectionError, ConnectionErrorKind, Error, Result, Row,
    StatementDriver, StatementError, StatementErrorKind, Value, ensure_can_begin,
    ensure_open_transaction,
};
use std::io::{self, BufReader, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::Arc;

/// One response to a command.
#[derive(Debug)]
enum Outcome {
    Rows(Vec<Row>),
    Done(OkPacket),
}

/// A connection to a MySQL server.
pub struct MySqlDriver {
    config: MySqlConfig,
    stream: Option<BufReader<TcpStream>>,
    sequence_id: u8,
    capabilities: u32,
    server_version: String,
    connection_id: u32,
    last_insert_id: i64,
    in_transaction: bool,
}

impl std::fmt::Debug for MySqlDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MySqlDriver")
            .field("host", &self.config.host)
            .field("port", &self.config.port)
            .field("server_version", &self.server_version)
            .field("connection_id", &self.connection_id)
            .field("connected", &self.stream.is_some())
            .finish_non_exhaustive()
    }
}

impl MySqlDriver {
    /// Open a TCP connection, run the handshake and authenticate.
    pub fn connect(config: MySqlConfig) -> Result<Self> {
        let stream = open_stream(&config)?;
        let mut driver = Self {
            config,
            stream: Some(BufReader::new(stream)),
            sequence_id: 0,
            capabilities: 0,
            server_version: String::new(),
            connection_id: 0,
            last_insert_id: 0,
            in_transaction: false,
        };
        driver.handshake()?;
        tracing::info!(
            backend = "mysql",
            host = %driver.config.host,
            port = driver.config.port,
            server_version = %driver.server_version,
            connection_id = driver.connection_id,
            "mysql connection established"
        );
        Ok(driver)
    }

    pub fn server_version(&self) -> &str {
        &self.server_version
    }

    pub fn connection_id(&self) -> u32 {
        self.connection_id
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// `COM_PING`.
    pub fn ping(&mut self) -> Result<()> {
        self.send_command(&[Command::Ping as u8])?;
        let packet = self.read_packet()?;
        match PacketKind::of(&packet) {
            PacketKind::Ok => Ok(()),
            PacketKind::Error => Err(server_error(&packet, None)),
            _ => Err(protocol_error("unexpected response to COM_PING")),
        }
    }

    /// `COM_INIT_DB`: switch the default schema.
    pub fn select_database(&mut self, database: &str) -> Result<()> {
        let mut payload = vec![Command::InitDb as u8];
        payload.extend_from_slice(database.as_bytes());
        self.send_command(&payload)?;
        let packet = self.read_packet()?;
        match PacketKind::of(&packet) {
            PacketKind::Ok => {
                self.config.database = Some(database.to_string());
                Ok(())
            }
            PacketKind::Error => Err(server_error(&packet, None)),
            _ => Err(protocol_error("unexpected response to COM_INIT_DB")),
        }
    }

    fn deprecate_eof(&self) -> bool {
        self.capabilities & capabilities::CLIENT_DEPRECATE_EOF != 0
    }

    fn handshake(&mut self) -> Result<()> {
        let greeting = self.read_packet()?;
        if PacketKind::of(&greeting) == PacketKind::Error {
            let err = ErrPacket::parse(&greeting)?;
            return Err(ConnectionError::new(
                Backend::MySql,
                ConnectionErrorKind::Connect,
                format!("server refused connection: {} ({})", err.message, err.code),
            )
            .into());
        }
        let handshake = Handshake::parse(&greeting)?;
        if handshake.capabilities & capabilities::CLIENT_PROTOCOL_41 == 0 {
            return Err(protocol_error("server does not support protocol 4.1"));
        }
        self.server_version.clone_from(&handshake.server_version);
        self.connection_id = handshake.connection_id;
        self.capabilities = self.config.capability_flags() & handshake.capabilities;

        let plugin = if handshake.auth_plugin.is_empty() {
            plugins::MYSQL_NATIVE_PASSWORD.to_string()
        } else {
            handshake.auth_plugin.clone()
        };
        let password = self.config.password.clone().unwrap_or_default();
        let auth_response = auth::auth_response(&plugin, &password, &handshake.auth_data)?;
        let response = HandshakeResponse {
            capabilities: self.capabilities,
            max_packet_size: self.config.max_packet_size,
            charset: self.config.charset,
            username: &self.config.user,
            auth_response: &auth_response,
            database: self.config.database.as_deref(),
            auth_plugin: &plugin,
        }
        .encode();
        self.write_packet(&response)?;
        self.authenticate(plugin, handshake.auth_data, &password)
    }

    /// Drive the auth exchange until the server answers OK or ERR.
    fn authenticate(&mut self, mut plugin: String, mut seed: Vec<u8>, password: &str) -> Result<()> {
        loop {
            let packet = self.read_packet()?;
            match packet.first().copied() {
                Some(0x00) => return Ok(()),
                Some(0xFF) => {
                    let err = ErrPacket::parse(&packet)?;
                    return Err(auth_failed(format!("{} ({})", err.message, err.code)));
                }
                Some(0xFE) => {
                    let mut reader = PacketReader::new(&packet[1..]);
                    plugin = reader.nul_string();
                    seed = reader.rest().to_vec();
                    tracing::debug!(backend = "mysql", plugin = %plugin, "auth switch requested");
                    let response = auth::auth_response(&plugin, password, &seed)?;
                    self.write_packet(&response)?;
                }
                Some(0x01) => {
                    let data = &packet[1..];
                    if plugin == plugins::SHA256_PASSWORD {
                        let pem = String::from_utf8_lossy(data);
                        let encrypted = auth::encrypt_password(password, &seed, &pem, false)?;
                        self.write_packet(&encrypted)?;
                        continue;
                    }
                    match data.first().copied() {
                        Some(caching_sha2::FAST_AUTH_SUCCESS) => {}
                        Some(caching_sha2::PERFORM_FULL_AUTH) => {
                            self.write_packet(&[caching_sha2::REQUEST_PUBLIC_KEY])?;
                            let key = self.read_packet()?;
                            if PacketKind::of(&key) == PacketKind::Error {
                                let err = ErrPacket::parse(&key)?;
                                return Err(auth_failed(err.message));
                            }
                            let pem = String::from_utf8_lossy(key.get(1..).unwrap_or_default());
                            let encrypted = auth::encrypt_password(password, &seed, &pem, true)?;
                            self.write_packet(&encrypted)?;
                        }
                        _ => return Err(protocol_error("unexpected auth continuation")),
                    }
                }
                _ => return Err(protocol_error("unexpected packet during authentication")),
            }
        }
    }

    fn stream_mut(&mut self) -> Result<&mut BufReader<TcpStream>> {
        self.stream.as_mut().ok_or_else(|| {
            ConnectionError::new(
                Backend::MySql,
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
        ConnectionError::new(Backend::MySql, kind, format!("connection lost: {}", err))
            .with_source(err)
            .into()
    }

    fn recv_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let result = self.stream_mut()?.read_exact(buf);
        result.map_err(|e| self.lost(e))
    }

    fn read_packet(&mut self) -> Result<Vec<u8>> {
        let mut payload = Vec::new();
        loop {
            let mut raw = [0u8; PacketHeader::SIZE];
            self.recv_exact(&mut raw)?;
            let header = PacketHeader::from_bytes(raw);
            if header.sequence_id != self.sequence_id {
                return Err(protocol_error(format!(
                    "packet out of order: expected sequence {}, got {}",
                    self.sequence_id, header.sequence_id
                )));
            }
            self.sequence_id = header.sequence_id.wrapping_add(1);
            let len = header.payload_length as usize;
            let start = payload.len();
            payload.resize(start + len, 0);
            self.recv_exact(&mut payload[start..])?;
            if len < MAX_PACKET_SIZE {
                return Ok(payload);
            }
        }
    }

    fn write_packet(&mut self, payload: &[u8]) -> Result<()> {
        let (bytes, next) = writer::frame(payload, self.sequence_id);
        self.sequence_id = next;
        let stream = self.stream_mut()?.get_mut();
        let result = stream.write_all(&bytes).and_then(|()| stream.flush());
        result.map_err(|e| self.lost(e))
    }

    fn send_command(&mut self, payload: &[u8]) -> Result<()> {
        self.sequence_id = 0;
        self.write_packet(payload)
    }

    fn read_columns(&mut self, count: u64) -> Result<Vec<ColumnDef>> {
        let mut columns = Vec::new();
        for _ in 0..count {
            columns.push(ColumnDef::parse(&self.read_packet()?)?);
        }
        if !self.deprecate_eof() {
            self.read_packet()?;
        }
        Ok(columns)
    }

    /// Skip parameter or column definitions sent with `COM_STMT_PREPARE_OK`.
    fn skip_definitions(&mut self, count: u16) -> Result<()> {
        for _ in 0..count {
            self.read_packet()?;
        }
        if count > 0 && !self.deprecate_eof() {
            self.read_packet()?;
        }
        Ok(())
    }

    /// Read one result, returning it with the server status flags.
    fn read_result(&mut self, sql: &str, binary: bool) -> Result<(Outcome, u16)> {
        let first = self.read_packet()?;
        match PacketKind::of(&first) {
            PacketKind::Ok => {
                let ok = OkPacket::parse(&first)?;
                let status = ok.status_flags;
                return Ok((Outcome::Done(ok), status));
            }
            PacketKind::Error => return Err(server_error(&first, Some(sql))),
            PacketKind::LocalInfile => {
                return Err(StatementError::new(
                    Backend::MySql,
                    StatementErrorKind::Database,
                    "LOAD DATA LOCAL INFILE is not supported",
                )
                .with_sql(sql)
                .into());
            }
            PacketKind::Eof | PacketKind::Data => {}
        }

        let count = PacketReader::new(&first).lenenc_int()?;
        let columns = self.read_columns(count)?;
        let info = Arc::new(ColumnInfo::new(
            columns.iter().map(|c| c.name.clone()).collect(),
        ));

        let mut rows = Vec::new();
        loop {
            let packet = self.read_packet()?;
            match PacketKind::of(&packet) {
                PacketKind::Eof => {
                    let status = terminator_status(&packet, self.deprecate_eof())?;
                    return Ok((Outcome::Rows(rows), status));
                }
                PacketKind::Error => return Err(server_error(&packet, Some(sql))),
                _ => {
                    let values = if binary {
                        prepared::decode_binary_row(&packet, &columns)?
                    } else {
                        decode_text_row(&packet, &columns)?
                    };
                    rows.push(Row::with_columns(Arc::clone(&info), values));
                }
            }
        }
    }

    /// Read every result of a command, following `MORE_RESULTS_EXISTS`.
    fn read_results(&mut self, sql: &str, binary: bool) -> Result<Vec<Outcome>> {
        let mut outcomes = Vec::new();
        loop {
            let (outcome, status) = self.read_result(sql, binary)?;
            if let Outcome::Done(ok) = &outcome {
                if ok.last_insert_id != 0 {
                    self.last_insert_id = i64::try_from(ok.last_insert_id).unwrap_or(i64::MAX);
                }
            }
            outcomes.push(outcome);
            if status & server_status::MORE_RESULTS_EXISTS == 0 {
                return Ok(outcomes);
            }
        }
    }

    fn run_text(&mut self, sql: &str) -> Result<Vec<Outcome>> {
        let mut payload = Vec::with_capacity(sql.len() + 1);
        payload.push(Command::Query as u8);
        payload.extend_from_slice(sql.as_bytes());
        self.send_command(&payload)?;
        self.read_results(sql, false)
    }

    fn run_prepared(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Outcome>> {
        self.send_command(&prepared::prepare_packet(sql))?;
        let response = self.read_packet()?;
        if PacketKind::of(&response) == PacketKind::Error {
            return Err(server_error(&response, Some(sql)));
        }
        let prepare = PrepareOk::parse(&response)?;
        self.skip_definitions(prepare.num_params)?;
        self.skip_definitions(prepare.num_columns)?;

        let result = if usize::from(prepare.num_params) == params.len() {
            self.send_command(&prepared::execute_packet(prepare.statement_id, params))
                .and_then(|()| self.read_results(sql, true))
        } else {
            Err(StatementError::new(
                Backend::MySql,
                StatementErrorKind::Syntax,
                format!(
                    "statement expects {} parameters, {} given",
                    prepare.num_params,
                    params.len()
                ),
            )
            .with_sql(sql)
            .into())
        };

        // COM_STMT_CLOSE has no response
        if self.stream.is_some() {
            self.send_command(&prepared::close_packet(prepare.statement_id))?;
        }
        result
    }

    fn run(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Outcome>> {
        if params.is_empty() {
            self.run_text(sql)
        } else {
            self.run_prepared(sql, params)
        }
    }
}

impl StatementDriver for MySqlDriver {
    fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        tracing::debug!(backend = "mysql", sql, params = params.len(), "query");
        let outcomes = self.run(sql, params)?;
        Ok(outcomes
            .into_iter()
            .find_map(|o| match o {
                Outcome::Rows(rows) => Some(rows),
                Outcome::Done(_) => None,
            })
            .unwrap_or_default())
    }

    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64> {
        tracing::debug!(backend = "mysql", sql, params = params.len(), "execute");
        let outcomes = self.run(sql, params)?;
        Ok(outcomes
            .iter()
            .map(|o| match o {
                Outcome::Done(ok) => ok.affected_rows,
                Outcome::Rows(_) => 0,
            })
            .sum())
    }

    fn last_insert_id(&mut self) -> Result<i64> {
        self.stream_mut()?;
        Ok(self.last_insert_id)
    }

    fn begin_transaction(&mut self) -> Result<()> {
        ensure_can_begin(self.in_transaction)?;
        self.run_text("START TRANSACTION")?;
        self.in_transaction = true;
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        ensure_open_transaction(self.in_transaction, "commit")?;
        self.run_text("COMMIT")?;
        self.in_transaction = false;
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        ensure_open_transaction(self.in_transaction, "roll back")?;
        self.in_transaction = false;
        self.run_text("ROLLBACK")?;
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    fn disconnect(&mut self) -> Result<()> {
        let Some(mut stream) = self.stream.take() else {
            return Ok(());
        };
        let (quit, _) = writer::frame(&[Command::Quit as u8], 0);
        let socket = stream.get_mut();
        if let Err(e) = socket.write_all(&quit).and_then(|()| socket.flush()) {
            tracing::warn!(backend = "mysql", error = %e, "failed to send COM_QUIT");
        }
        let _ = socket.shutdown(Shutdown::Both);
        self.in_transaction = false;
        tracing::info!(
            backend = "mysql",
            connection_id = self.connection_id,
            "mysql connection closed"
        );
        Ok(())
    }

    fn backend(&self) -> Backend {
        Backend::MySql
    }
}

impl Drop for MySqlDriver {
    fn drop(&mut self) {
        let _ = self.disconnect();
    }
}

fn open_stream(config: &MySqlConfig) -> Result<TcpStream> {
    let connect_error = |kind, message: String, err: io::Error| -> Error {
        ConnectionError::new(Backend::MySql, kind, message)
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
                return match configure {
                    Ok(()) => Ok(stream),
                    Err(e) => Err(connect_error(
                        ConnectionErrorKind::Connect,
                        format!("cannot configure socket: {}", e),
                        e,
                    )),
                };
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

fn decode_text_row(payload: &[u8], columns: &[ColumnDef]) -> Result<Vec<Value>> {
    let mut reader = PacketReader::new(payload);
    columns
        .iter()
        .map(|column| {
            if reader.peek() == Some(0xFB) {
                reader.skip(1)?;
                Ok(Value::Null)
            } else {
                Ok(decode_text(reader.lenenc_bytes()?, column))
            }
        })
        .collect()
}

fn auth_failed(message: impl Into<String>) -> Error {
    ConnectionError::new(
        Backend::MySql,
        ConnectionErrorKind::Authentication,
        message,
    )
    .into()
}

fn server_error(payload: &[u8], sql: Option<&str>) -> Error {
    let err = match ErrPacket::parse(payload) {
        Ok(err) => err,
        Err(e) => return e,
    };
    let mut statement = StatementError::new(
        Backend::MySql,
        error_kind(err.code),
        format!("{} ({})", err.message, err.code),
    );
    if let Some(state) = err.sql_state {
        statement = statement.with_sqlstate(state);
    }
    if let Some(sql) = sql {
        statement = statement.with_sql(sql);
    }
    statement.into()
}

/// Classify a server error code.
pub fn error_kind(code: u16) -> StatementErrorKind {
    match code {
        // duplicate key, FK parent/child, NOT NULL, CHECK
        1022 | 1048 | 1062 | 1169 | 1216 | 1217 | 1364 | 1451 | 1452 | 1557 | 3819 => {
            StatementErrorKind::Constraint
        }
        1049 | 1051 | 1054 | 1091 | 1146 => StatementErrorKind::NotFound,
        1064 | 1149 => StatementErrorKind::Syntax,
        1044 | 1045 | 1142 | 1143 | 1227 => StatementErrorKind::Permission,
        1205 | 1213 => StatementErrorKind::Deadlock,
        1317 | 3024 => StatementErrorKind::Timeout,
        _ => StatementErrorKind::Database,
    }
}
