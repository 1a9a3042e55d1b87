//! Document-store connection configuration.

use polystore_core::{ConnectionConfig, DEFAULT_TIMEOUT, Error, Result};
use std::time::Duration;
use url::Url;

pub const DEFAULT_PORT: u16 = 27017;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MongoConfig {
    /// Full connection string; wins over host/port/credentials
    pub url: Option<String>,
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub database: String,
    /// Server selection and connect timeout
    pub timeout: Duration,
}

impl MongoConfig {
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            url: None,
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            username: None,
            password: None,
            database: database.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Connection string handed to the client, with timeouts appended
    /// unless the caller already set them.
    pub fn connection_uri(&self) -> Result<String> {
        let base = match &self.url {
            Some(url) => url.clone(),
            None => self.build_url()?,
        };
        Ok(with_timeouts(&base, self.timeout))
    }

    fn build_url(&self) -> Result<String> {
        let mut url = Url::parse(&format!("mongodb://{}:{}/", self.host, self.port))
            .map_err(|e| Error::config(format!("invalid mongodb host '{}': {}", self.host, e)))?;
        if let Some(username) = &self.username {
            url.set_username(username)
                .map_err(|()| Error::config("cannot set mongodb username"))?;
            url.set_password(self.password.as_deref())
                .map_err(|()| Error::config("cannot set mongodb password"))?;
        }
        Ok(url.into())
    }
}

fn with_timeouts(uri: &str, timeout: Duration) -> String {
    let millis = timeout.as_millis().to_string();
    let lower = uri.to_ascii_lowercase();
    let mut out = uri.to_string();
    if !out.contains('?') {
        let authority = out.find("://").map_or(0, |i| i + 3);
        if !out[authority..].contains('/') {
            out.push('/');
        }
        out.push('?');
    }
    for key in ["serverSelectionTimeoutMS", "connectTimeoutMS"] {
        if lower.contains(&key.to_ascii_lowercase()) {
            continue;
        }
        if !out.ends_with('?') && !out.ends_with('&') {
            out.push('&');
        }
        out.push_str(key);
        out.push('=');
        out.push_str(&millis);
    }
    out
}

/// Database named in the path of a connection string, if any.
fn database_from_url(url: &str) -> Option<String> {
    let rest = url.split_once("://")?.1;
    let path = rest.split_once('/')?.1;
    let name = path.split('?').next()?;
    (!name.is_empty()).then(|| name.to_string())
}

impl TryFrom<&ConnectionConfig> for MongoConfig {
    type Error = Error;

    fn try_from(config: &ConnectionConfig) -> Result<Self> {
        let database = config
            .database
            .clone()
            .or_else(|| config.url.as_deref().and_then(database_from_url))
            .ok_or_else(|| Error::config("driver 'mongodb' requires 'database'"))?;

        let mut mongo = MongoConfig::new(database).timeout(config.timeout());
        if let Some(url) = &config.url {
            mongo = mongo.url(url.clone());
        } else {
            let host = config.require("host", config.host.as_ref())?;
            mongo = mongo
                .host(host)
                .port(config.port.unwrap_or(DEFAULT_PORT));
            if let Some(username) = &config.username {
                mongo = mongo.credentials(username.clone(), config.password.clone().unwrap_or_default());
            }
        }
        Ok(mongo)
    }
}
