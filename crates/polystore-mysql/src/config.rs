//! MySQL connection configuration.

use crate::protocol::{capabilities, charset};
use polystore_core::{ConnectionConfig, DEFAULT_TIMEOUT, Error};
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 3306;

/// Configuration for a MySQL connection.
#[derive(Debug, Clone)]
pub struct MySqlConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Option<String>,
    /// Schema selected at connect time
    pub database: Option<String>,
    /// Collation id sent in the handshake response
    pub charset: u8,
    /// Applied to the TCP connect and to every read and write
    pub connect_timeout: Duration,
    pub max_packet_size: u32,
}

impl MySqlConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            user: String::from("root"),
            password: None,
            database: None,
            charset: charset::UTF8MB4_0900_AI_CI,
            connect_timeout: DEFAULT_TIMEOUT,
            max_packet_size: 16 * 1024 * 1024,
        }
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn charset(mut self, charset: u8) -> Self {
        self.charset = charset;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// `host:port` for socket resolution.
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Capabilities this client asks for, before intersecting with the server's.
    pub fn capability_flags(&self) -> u32 {
        let mut flags = capabilities::DEFAULT_CLIENT_FLAGS;
        if self.database.is_none() {
            flags &= !capabilities::CLIENT_CONNECT_WITH_DB;
        }
        flags
    }
}

impl TryFrom<&ConnectionConfig> for MySqlConfig {
    type Error = Error;

    fn try_from(config: &ConnectionConfig) -> Result<Self, Error> {
        let host = config.require("host", config.host.as_ref())?;
        let user = config.require("username", config.username.as_ref())?;
        let mut mysql = MySqlConfig::new(host)
            .port(config.port.unwrap_or(DEFAULT_PORT))
            .user(user)
            .connect_timeout(config.timeout());
        mysql.password.clone_from(&config.password);
        mysql.database.clone_from(&config.database);
        if let Some(raw) = config.option_str("charset") {
            mysql.charset = raw
                .parse()
                .map_err(|_| Error::config(format!("invalid charset id '{}'", raw)))?;
        }
        Ok(mysql)
    }
}
