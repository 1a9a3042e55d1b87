//! Connection configuration and backend selection.

use crate::dialect::Dialect;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Default connect/request timeout when the configuration names none.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// The closed set of storage backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Backend {
    MySql,
    Postgres,
    Sqlite,
    SqlServer,
    Turso,
    Mongo,
}

impl Backend {
    /// Every backend, in declaration order.
    pub const ALL: [Backend; 6] = [
        Backend::MySql,
        Backend::Postgres,
        Backend::Sqlite,
        Backend::SqlServer,
        Backend::Turso,
        Backend::Mongo,
    ];

    /// Canonical driver name.
    pub const fn name(self) -> &'static str {
        match self {
            Backend::MySql => "mysql",
            Backend::Postgres => "pgsql",
            Backend::Sqlite => "sqlite",
            Backend::SqlServer => "sqlsrv",
            Backend::Turso => "turso",
            Backend::Mongo => "mongodb",
        }
    }

    /// SQL flavor spoken by this backend, or `None` for the document store.
    pub const fn dialect(self) -> Option<Dialect> {
        match self {
            Backend::MySql => Some(Dialect::MySql),
            Backend::Postgres => Some(Dialect::Postgres),
            Backend::Sqlite | Backend::Turso => Some(Dialect::Sqlite),
            Backend::SqlServer => Some(Dialect::SqlServer),
            Backend::Mongo => None,
        }
    }

    pub const fn is_document(self) -> bool {
        matches!(self, Backend::Mongo)
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Backend {
    type Err = Error;

    /// Exact, case-sensitive match on the driver name.
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "mysql" => Ok(Backend::MySql),
            "pgsql" | "postgres" => Ok(Backend::Postgres),
            "sqlite" => Ok(Backend::Sqlite),
            "sqlsrv" | "sqlserver" => Ok(Backend::SqlServer),
            "turso" | "libsql" => Ok(Backend::Turso),
            "mongodb" | "mongo" => Ok(Backend::Mongo),
            other => Err(Error::config(format!("unknown driver '{}'", other))),
        }
    }
}

/// Backend-independent connection settings.
///
/// Each driver crate turns this into its own config type and checks the
/// keys it needs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    pub driver: String,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub database: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub url: Option<String>,
    pub auth_token: Option<String>,
    /// Seconds
    pub timeout: Option<u64>,
    pub options: BTreeMap<String, String>,
}

impl ConnectionConfig {
    pub fn new(driver: impl Into<String>) -> Self {
        Self {
            driver: driver.into(),
            ..Self::default()
        }
    }

    /// Build a configuration from a flat string map.
    ///
    /// Unrecognized keys are kept in `options`.
    pub fn from_map<K, V>(map: &HashMap<K, V>) -> Result<Self>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut config = Self::default();
        for (key, value) in map {
            let value = value.as_ref().to_string();
            match key.as_ref() {
                "driver" => config.driver = value,
                "host" => config.host = Some(value),
                "port" => {
                    let port = value.parse::<u16>().map_err(|_| {
                        Error::config(format!("invalid port '{}'", value))
                    })?;
                    config.port = Some(port);
                }
                "database" => config.database = Some(value),
                "username" => config.username = Some(value),
                "password" => config.password = Some(value),
                "url" => config.url = Some(value),
                "auth_token" => config.auth_token = Some(value),
                "timeout" => {
                    let secs = value.parse::<u64>().map_err(|_| {
                        Error::config(format!("invalid timeout '{}'", value))
                    })?;
                    config.timeout = Some(secs);
                }
                other => {
                    config.options.insert(other.to_string(), value);
                }
            }
        }
        if config.driver.is_empty() {
            return Err(Error::config("missing required key 'driver'"));
        }
        Ok(config)
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout = Some(secs);
        self
    }

    pub fn option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Resolve the `driver` key.
    pub fn backend(&self) -> Result<Backend> {
        self.driver.parse()
    }

    /// Configured timeout, or [`DEFAULT_TIMEOUT`].
    pub fn timeout(&self) -> Duration {
        self.timeout.map_or(DEFAULT_TIMEOUT, Duration::from_secs)
    }

    /// Return a required string field, or a configuration error naming it.
    pub fn require<'a>(&self, key: &str, value: Option<&'a String>) -> Result<&'a str> {
        value.map(String::as_str).ok_or_else(|| {
            Error::config(format!(
                "driver '{}' requires the '{}' key",
                self.driver, key
            ))
        })
    }

    pub fn option_str(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }

    /// Read a boolean option (`true`/`1`/`yes`), defaulting when absent.
    pub fn option_bool(&self, key: &str, default: bool) -> bool {
        self.option_str(key).map_or(default, |v| {
            matches!(v.to_ascii_lowercase().as_str(), "true" | "1" | "yes" | "on")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_names_are_exact() {
        assert_eq!("pgsql".parse::<Backend>().unwrap(), Backend::Postgres);
        assert_eq!("postgres".parse::<Backend>().unwrap(), Backend::Postgres);
        assert_eq!("libsql".parse::<Backend>().unwrap(), Backend::Turso);
        assert_eq!("mongo".parse::<Backend>().unwrap(), Backend::Mongo);
        assert!("MySQL".parse::<Backend>().is_err());
        assert!("oracle".parse::<Backend>().is_err());
        for backend in Backend::ALL {
            assert_eq!(backend.name().parse::<Backend>().unwrap(), backend);
        }
    }

    #[test]
    fn backend_dialects() {
        assert_eq!(Backend::Turso.dialect(), Some(Dialect::Sqlite));
        assert_eq!(Backend::Mongo.dialect(), None);
        assert!(Backend::Mongo.is_document());
        assert!(!Backend::SqlServer.is_document());
    }

    #[test]
    fn from_map_collects_known_and_extra_keys() {
        let mut map = HashMap::new();
        map.insert("driver", "mysql");
        map.insert("host", "db.internal");
        map.insert("port", "3307");
        map.insert("timeout", "5");
        map.insert("trust_cert", "true");

        let config = ConnectionConfig::from_map(&map).unwrap();
        assert_eq!(config.backend().unwrap(), Backend::MySql);
        assert_eq!(config.host.as_deref(), Some("db.internal"));
        assert_eq!(config.port, Some(3307));
        assert_eq!(config.timeout(), Duration::from_secs(5));
        assert!(config.option_bool("trust_cert", false));
    }

    #[test]
    fn from_map_rejects_bad_values() {
        let mut map = HashMap::new();
        map.insert("host", "x");
        assert!(matches!(ConnectionConfig::from_map(&map), Err(Error::Config(_))));

        map.insert("driver", "pgsql");
        map.insert("port", "not-a-port");
        assert!(matches!(ConnectionConfig::from_map(&map), Err(Error::Config(_))));
    }

    #[test]
    fn deserializes_with_defaults() {
        let config: ConnectionConfig =
            serde_json::from_str(r#"{"driver":"sqlite","database":":memory:"}"#).unwrap();
        assert_eq!(config.database.as_deref(), Some(":memory:"));
        assert_eq!(config.timeout(), DEFAULT_TIMEOUT);
        assert!(config.options.is_empty());
    }

    #[test]
    fn require_names_missing_key() {
        let config = ConnectionConfig::new("turso");
        let err = config.require("url", config.url.as_ref()).unwrap_err();
        assert!(err.to_string().contains("'url'"));
    }
}
