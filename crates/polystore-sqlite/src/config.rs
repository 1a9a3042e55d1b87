//! SQLite connection configuration.

use polystore_core::{ConnectionConfig, Error};

/// Default time SQLite waits on a locked database before giving up.
pub const DEFAULT_BUSY_TIMEOUT_MS: u32 = 5000;

/// Configuration for opening a SQLite database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqliteConfig {
    /// File path, or `:memory:`
    pub path: String,
    /// Busy timeout in milliseconds
    pub busy_timeout_ms: u32,
    /// Enforce foreign keys (`PRAGMA foreign_keys = ON`)
    pub foreign_keys: bool,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self::memory()
    }
}

impl SqliteConfig {
    pub fn memory() -> Self {
        Self::file(":memory:")
    }

    pub fn file(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            foreign_keys: true,
        }
    }

    pub fn busy_timeout(mut self, ms: u32) -> Self {
        self.busy_timeout_ms = ms;
        self
    }

    pub fn foreign_keys(mut self, enabled: bool) -> Self {
        self.foreign_keys = enabled;
        self
    }

    pub fn is_memory(&self) -> bool {
        self.path == ":memory:"
    }
}

impl TryFrom<&ConnectionConfig> for SqliteConfig {
    type Error = Error;

    fn try_from(config: &ConnectionConfig) -> Result<Self, Error> {
        let path = config.require("database", config.database.as_ref())?;
        let mut sqlite = SqliteConfig::file(path);
        if let Some(raw) = config.option_str("busy_timeout") {
            sqlite.busy_timeout_ms = raw
                .parse()
                .map_err(|_| Error::config(format!("invalid busy_timeout '{}'", raw)))?;
        }
        sqlite.foreign_keys = config.option_bool("foreign_keys", true);
        Ok(sqlite)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_from_connection_config() {
        let config = ConnectionConfig::new("sqlite")
            .database(":memory:")
            .option("busy_timeout", "250");
        let sqlite = SqliteConfig::try_from(&config).unwrap();
        assert!(sqlite.is_memory());
        assert_eq!(sqlite.busy_timeout_ms, 250);
        assert!(sqlite.foreign_keys);
    }

    #[test]
    fn database_key_is_required() {
        let config = ConnectionConfig::new("sqlite");
        assert!(matches!(
            SqliteConfig::try_from(&config),
            Err(Error::Config(_))
        ));
    }
}
