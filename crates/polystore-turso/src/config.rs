//! Remote pipeline configuration.

use polystore_core::{ConnectionConfig, DEFAULT_TIMEOUT, Error};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TursoConfig {
    /// Base URL; `libsql://` is rewritten to `https://`
    pub url: String,
    pub auth_token: Option<String>,
    /// Per-request timeout
    pub timeout: Duration,
}

impl TursoConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            auth_token: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Full URL of the pipeline endpoint.
    pub fn pipeline_url(&self) -> String {
        let base = match self.url.strip_prefix("libsql://") {
            Some(rest) => format!("https://{}", rest),
            None => self.url.clone(),
        };
        format!("{}/v2/pipeline", base.trim_end_matches('/'))
    }
}

impl TryFrom<&ConnectionConfig> for TursoConfig {
    type Error = Error;

    fn try_from(config: &ConnectionConfig) -> Result<Self, Error> {
        let url = config.require("url", config.url.as_ref())?;
        if url.trim().is_empty() {
            return Err(Error::config("driver 'turso' requires a non-empty 'url'"));
        }
        let mut turso = TursoConfig::new(url).timeout(config.timeout());
        turso.auth_token.clone_from(&config.auth_token);
        Ok(turso)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_url() {
        assert_eq!(
            TursoConfig::new("libsql://db-org.turso.io").pipeline_url(),
            "https://db-org.turso.io/v2/pipeline"
        );
        assert_eq!(
            TursoConfig::new("http://127.0.0.1:8080/").pipeline_url(),
            "http://127.0.0.1:8080/v2/pipeline"
        );
    }

    #[test]
    fn test_from_connection_config() {
        let config = ConnectionConfig::new("turso")
            .url("https://db.example")
            .auth_token("tok")
            .timeout_secs(3);
        let turso = TursoConfig::try_from(&config).unwrap();
        assert_eq!(turso.auth_token.as_deref(), Some("tok"));
        assert_eq!(turso.timeout, Duration::from_secs(3));

        let missing = ConnectionConfig::new("turso");
        assert!(matches!(
            TursoConfig::try_from(&missing),
            Err(Error::Config(_))
        ));
    }
}
