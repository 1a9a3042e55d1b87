//! PostgreSQL connection configuration.

use polystore_core::{ConnectionConfig, DEFAULT_TIMEOUT, Error};
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 5432;

/// PostgreSQL connection configuration.
#[derive(Debug, Clone)]
pub struct PgConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    /// Not needed for `trust` authentication
    pub password: Option<String>,
    pub database: String,
    /// Shown in `pg_stat_activity`
    pub application_name: Option<String>,
    pub connect_timeout: Duration,
}

impl PgConfig {
    pub fn new(
        host: impl Into<String>,
        user: impl Into<String>,
        database: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            user: user.into(),
            password: None,
            database: database.into(),
            application_name: None,
            connect_timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn application_name(mut self, name: impl Into<String>) -> Self {
        self.application_name = Some(name.into());
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Parameters sent in the startup message.
    pub fn startup_params(&self) -> Vec<(&str, &str)> {
        let mut params = vec![
            ("user", self.user.as_str()),
            ("database", self.database.as_str()),
            ("client_encoding", "UTF8"),
        ];
        if let Some(name) = &self.application_name {
            params.push(("application_name", name.as_str()));
        }
        params
    }
}

impl TryFrom<&ConnectionConfig> for PgConfig {
    type Error = Error;

    fn try_from(config: &ConnectionConfig) -> Result<Self, Error> {
        let host = config.require("host", config.host.as_ref())?;
        let user = config.require("username", config.username.as_ref())?;
        let database = config.require("database", config.database.as_ref())?;
        let mut pg = PgConfig::new(host, user, database)
            .port(config.port.unwrap_or(DEFAULT_PORT))
            .connect_timeout(config.timeout());
        pg.password.clone_from(&config.password);
        if let Some(name) = config.option_str("application_name") {
            pg = pg.application_name(name);
        }
        Ok(pg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_startup_params() {
        let config = PgConfig::new("localhost", "app", "shop").application_name("polystore");
        let params = config.startup_params();
        assert!(params.contains(&("user", "app")));
        assert!(params.contains(&("database", "shop")));
        assert!(params.contains(&("application_name", "polystore")));
    }

    #[test]
    fn test_from_connection_config() {
        let config = ConnectionConfig::new("pgsql")
            .host("db")
            .username("app")
            .database("shop")
            .password("pw");
        let pg = PgConfig::try_from(&config).unwrap();
        assert_eq!(pg.socket_addr(), "db:5432");
        assert_eq!(pg.password.as_deref(), Some("pw"));
        assert_eq!(pg.connect_timeout, DEFAULT_TIMEOUT);
    }

    #[test]
    fn test_database_is_required() {
        let config = ConnectionConfig::new("pgsql").host("db").username("app");
        let err = PgConfig::try_from(&config).unwrap_err();
        assert!(err.to_string().contains("database"));
    }
}
