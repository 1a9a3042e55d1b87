//! Blocking SQL Server connection over tiberius.

use crate::config::MssqlConfig;
use crate::types::{bind_param, decode_column};
use polystore_core::{
    Backend, ColumnInfo, ConnectionError, ConnectionErrorKind, Error, ProtocolError, Result, Row,
    StatementDriver, StatementError, StatementErrorKind, Value, ensure_can_begin,
    ensure_open_transaction,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tiberius::{Client, Query};
use tokio::net::TcpStream;
use tokio::runtime::Runtime;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};

type MssqlClient = Client<Compat<TcpStream>>;

/// A connection to SQL Server.
pub struct MssqlDriver {
    config: MssqlConfig,
    runtime: Runtime,
    client: Option<MssqlClient>,
    in_transaction: bool,
}

impl std::fmt::Debug for MssqlDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MssqlDriver")
            .field("host", &self.config.host)
            .field("port", &self.config.port)
            .field("database", &self.config.database)
            .field("connected", &self.client.is_some())
            .field("in_transaction", &self.in_transaction)
            .finish_non_exhaustive()
    }
}

impl MssqlDriver {
    pub fn connect(config: MssqlConfig) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| {
                ConnectionError::new(
                    Backend::SqlServer,
                    ConnectionErrorKind::Connect,
                    format!("cannot start runtime: {}", e),
                )
                .with_source(e)
            })?;

        let client = runtime
            .block_on(with_timeout(config.timeout, open_client(&config)))
            .and_then(|r| r.map_err(|e| connect_error(&config, e)))?;

        tracing::info!(
            backend = "sqlsrv",
            host = %config.host,
            port = config.port,
            database = config.database.as_deref().unwrap_or(""),
            "sql server connection established"
        );
        Ok(Self {
            config,
            runtime,
            client: Some(client),
            in_transaction: false,
        })
    }

    pub fn is_connected(&self) -> bool {
        self.client.is_some()
    }

    /// Map a tiberius failure, dropping the client when the session is gone.
    fn fail(&mut self, err: tiberius::error::Error, sql: &str) -> Error {
        match err {
            tiberius::error::Error::Server(token) => {
                let kind = error_kind(token.code());
                let mut statement = StatementError::new(
                    Backend::SqlServer,
                    kind,
                    format!("{} ({})", token.message(), token.code()),
                )
                .with_sql(sql);
                if let Some(state) = sqlstate(token.code()) {
                    statement = statement.with_sqlstate(state);
                }
                statement.into()
            }
            tiberius::error::Error::Io { kind, message } => {
                self.client = None;
                self.in_transaction = false;
                let kind = match kind {
                    std::io::ErrorKind::TimedOut => ConnectionErrorKind::Timeout,
                    _ => ConnectionErrorKind::Disconnected,
                };
                ConnectionError::new(
                    Backend::SqlServer,
                    kind,
                    format!("connection lost: {}", message),
                )
                .into()
            }
            other => ProtocolError::new(Backend::SqlServer, other.to_string()).into(),
        }
    }

    /// Turn the outcome of a blocked-on future into a driver result.
    fn settle<T>(&mut self, outcome: Result<tiberius::Result<T>>, sql: &str) -> Result<T> {
        match outcome {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(self.fail(e, sql)),
            Err(e) => {
                // the server may still be executing; the session is unusable
                self.client = None;
                self.in_transaction = false;
                Err(e)
            }
        }
    }

    /// Run a plain SQL batch, discarding any results.
    fn batch(&mut self, sql: &str) -> Result<()> {
        let client = self.client.as_mut().ok_or_else(closed)?;
        let outcome = self.runtime.block_on(with_timeout(self.config.timeout, async move {
            client.simple_query(sql).await?.into_results().await?;
            Ok::<_, tiberius::error::Error>(())
        }));
        self.settle(outcome, sql)
    }
}

impl StatementDriver for MssqlDriver {
    fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        tracing::debug!(backend = "sqlsrv", sql, params = params.len(), "query");
        let client = self.client.as_mut().ok_or_else(closed)?;
        let outcome = self.runtime.block_on(with_timeout(self.config.timeout, async move {
            let mut query = Query::new(sql);
            for param in params {
                bind_param(&mut query, param);
            }
            Ok::<_, tiberius::error::Error>(query.query(client).await?.into_results().await?)
        }));
        let results = self.settle(outcome, sql)?;

        let Some(rows) = results.into_iter().next() else {
            return Ok(Vec::new());
        };
        let Some(first) = rows.first() else {
            return Ok(Vec::new());
        };
        let info = Arc::new(ColumnInfo::new(
            first.columns().iter().map(|c| c.name().to_string()).collect(),
        ));
        rows.into_iter()
            .map(|row| {
                let values = row
                    .into_iter()
                    .map(decode_column)
                    .collect::<Result<Vec<_>>>()?;
                Ok(Row::with_columns(Arc::clone(&info), values))
            })
            .collect()
    }

    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64> {
        tracing::debug!(backend = "sqlsrv", sql, params = params.len(), "execute");
        let client = self.client.as_mut().ok_or_else(closed)?;
        let outcome = self.runtime.block_on(with_timeout(self.config.timeout, async move {
            let mut query = Query::new(sql);
            for param in params {
                bind_param(&mut query, param);
            }
            Ok::<_, tiberius::error::Error>(query.execute(client).await?.total())
        }));
        self.settle(outcome, sql)
    }

    fn last_insert_id(&mut self) -> Result<i64> {
        let rows = self.query("SELECT CAST(@@IDENTITY AS BIGINT) AS id", &[])?;
        Ok(rows
            .first()
            .and_then(|row| row.get(0))
            .and_then(Value::as_i64)
            .unwrap_or(0))
    }

    fn begin_transaction(&mut self) -> Result<()> {
        ensure_can_begin(self.in_transaction)?;
        self.batch("BEGIN TRAN")?;
        self.in_transaction = true;
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        ensure_open_transaction(self.in_transaction, "commit")?;
        self.in_transaction = false;
        self.batch("COMMIT TRAN")
    }

    fn rollback(&mut self) -> Result<()> {
        ensure_open_transaction(self.in_transaction, "roll back")?;
        self.in_transaction = false;
        self.batch("ROLLBACK TRAN")
    }

    fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    fn disconnect(&mut self) -> Result<()> {
        let Some(client) = self.client.take() else {
            return Ok(());
        };
        if let Err(e) = self.runtime.block_on(client.close()) {
            tracing::warn!(backend = "sqlsrv", error = %e, "failed to close session cleanly");
        }
        self.in_transaction = false;
        tracing::info!(
            backend = "sqlsrv",
            host = %self.config.host,
            "sql server connection closed"
        );
        Ok(())
    }

    fn backend(&self) -> Backend {
        Backend::SqlServer
    }
}

impl Drop for MssqlDriver {
    fn drop(&mut self) {
        let _ = self.disconnect();
    }
}

async fn with_timeout<T>(timeout: Duration, fut: impl Future<Output = T>) -> Result<T> {
    tokio::time::timeout(timeout, fut).await.map_err(|_| {
        ConnectionError::new(
            Backend::SqlServer,
            ConnectionErrorKind::Timeout,
            format!("no response within {:?}", timeout),
        )
        .into()
    })
}

/// Connect, following one server redirect (Azure SQL gateways).
async fn open_client(config: &MssqlConfig) -> tiberius::Result<MssqlClient> {
    let mut tds = config.to_tiberius();
    let tcp = TcpStream::connect(tds.get_addr()).await?;
    tcp.set_nodelay(true)?;
    match Client::connect(tds.clone(), tcp.compat_write()).await {
        Err(tiberius::error::Error::Routing { host, port }) => {
            tracing::debug!(backend = "sqlsrv", host = %host, port, "server redirected connection");
            tds.host(&host);
            tds.port(port);
            let tcp = TcpStream::connect(tds.get_addr()).await?;
            tcp.set_nodelay(true)?;
            Client::connect(tds, tcp.compat_write()).await
        }
        other => other,
    }
}

fn connect_error(config: &MssqlConfig, err: tiberius::error::Error) -> Error {
    let kind = match &err {
        tiberius::error::Error::Io { kind, .. } => match kind {
            std::io::ErrorKind::ConnectionRefused => ConnectionErrorKind::Refused,
            std::io::ErrorKind::TimedOut => ConnectionErrorKind::Timeout,
            _ => ConnectionErrorKind::Connect,
        },
        tiberius::error::Error::Server(token) if token.code() == 18456 => {
            ConnectionErrorKind::Authentication
        }
        _ => ConnectionErrorKind::Connect,
    };
    ConnectionError::new(
        Backend::SqlServer,
        kind,
        format!(
            "cannot connect to {}:{}: {}",
            config.host, config.port, err
        ),
    )
    .with_source(err)
    .into()
}

fn closed() -> Error {
    ConnectionError::new(
        Backend::SqlServer,
        ConnectionErrorKind::Disconnected,
        "connection is closed",
    )
    .into()
}

/// Classify a server error number.
pub fn error_kind(code: u32) -> StatementErrorKind {
    match code {
        // unique index, primary key, FK/CHECK, NOT NULL
        2601 | 2627 | 547 | 515 => StatementErrorKind::Constraint,
        207 | 208 | 2812 | 4902 | 3701 => StatementErrorKind::NotFound,
        102 | 105 | 156 | 170 => StatementErrorKind::Syntax,
        229 | 230 | 262 | 300 => StatementErrorKind::Permission,
        1205 | 1222 => StatementErrorKind::Deadlock,
        _ => StatementErrorKind::Database,
    }
}

/// SQLSTATE equivalent for the error numbers that have one.
fn sqlstate(code: u32) -> Option<&'static str> {
    match code {
        2601 | 2627 => Some("23505"),
        547 => Some("23000"),
        515 => Some("23502"),
        208 => Some("42S02"),
        207 => Some("42S22"),
        1205 => Some("40001"),
        _ => None,
    }
}
