//! SQL Server connection configuration.

use polystore_core::{ConnectionConfig, DEFAULT_TIMEOUT, Error};
use std::time::Duration;
use tiberius::{AuthMethod, Config, EncryptionLevel};

pub const DEFAULT_PORT: u16 = 1433;

#[derive(Debug, Clone)]
pub struct MssqlConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: Option<String>,
    /// Accept any server certificate
    pub trust_cert: bool,
    /// Require TLS for the whole session; otherwise only the login is encrypted
    pub encrypt: bool,
    pub application_name: Option<String>,
    /// Applies to connecting and to every statement
    pub timeout: Duration,
}

impl MssqlConfig {
    pub fn new(host: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            user: user.into(),
            password: String::new(),
            database: None,
            trust_cert: false,
            encrypt: true,
            application_name: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn trust_cert(mut self, trust: bool) -> Self {
        self.trust_cert = trust;
        self
    }

    pub fn encrypt(mut self, encrypt: bool) -> Self {
        self.encrypt = encrypt;
        self
    }

    pub fn application_name(mut self, name: impl Into<String>) -> Self {
        self.application_name = Some(name.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build the tiberius client configuration.
    pub fn to_tiberius(&self) -> Config {
        let mut config = Config::new();
        config.host(&self.host);
        config.port(self.port);
        if let Some(database) = &self.database {
            config.database(database);
        }
        if let Some(name) = &self.application_name {
            config.application_name(name);
        }
        config.authentication(AuthMethod::sql_server(&self.user, &self.password));
        if self.trust_cert {
            config.trust_cert();
        }
        config.encryption(if self.encrypt {
            EncryptionLevel::Required
        } else {
            EncryptionLevel::Off
        });
        config
    }
}

impl TryFrom<&ConnectionConfig> for MssqlConfig {
    type Error = Error;

    fn try_from(config: &ConnectionConfig) -> Result<Self, Error> {
        let host = config.require("host", config.host.as_ref())?;
        let user = config.require("username", config.username.as_ref())?;
        let mut mssql = MssqlConfig::new(host, user)
            .port(config.port.unwrap_or(DEFAULT_PORT))
            .timeout(config.timeout())
            .trust_cert(config.option_bool("trust_cert", false))
            .encrypt(config.option_bool("encrypt", true));
        if let Some(password) = &config.password {
            mssql.password.clone_from(password);
        }
        mssql.database.clone_from(&config.database);
        if let Some(name) = config.option_str("application_name") {
            mssql = mssql.application_name(name);
        }
        Ok(mssql)
    }
}
