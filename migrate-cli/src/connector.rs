//! Connecting a datasource to its migration ledger

use migrate_core::ResolveError;
use migrate_sqlite::{LedgerConfig, SqliteLedgerStore};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use url::{Host, Url};

use crate::datasource::{Datasource, Provider};
use crate::error::CliError;

/// Default time allowed for reaching a database server
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Environment variable overriding the connect timeout, in milliseconds
pub const CONNECT_TIMEOUT_ENV: &str = "MIGRATE_CONNECT_TIMEOUT_MS";

/// Errors that can occur when building a [`ConnectorConfig`]
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("connect timeout must be greater than zero")]
    ZeroConnectTimeout,

    #[error("{var} must be a number of milliseconds, got '{value}'")]
    InvalidTimeout { var: &'static str, value: String },

    #[error(transparent)]
    Ledger(#[from] migrate_sqlite::ConfigError),
}

/// How datasources are connected
#[derive(Debug, Clone)]
pub struct ConnectorConfig {
    /// Time allowed for a server to accept a TCP connection
    pub connect_timeout: Duration,

    /// Options for SQLite ledgers
    pub ledger: LedgerConfig,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            ledger: LedgerConfig::default(),
        }
    }
}

impl ConnectorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> ConnectorConfigBuilder {
        ConnectorConfigBuilder::default()
    }

    /// Default configuration with overrides from the environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = Self::builder();
        if let Some(value) = lookup(CONNECT_TIMEOUT_ENV) {
            let millis = value
                .trim()
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidTimeout {
                    var: CONNECT_TIMEOUT_ENV,
                    value: value.clone(),
                })?;
            builder = builder.connect_timeout(Duration::from_millis(millis));
        }
        builder.build()
    }
}

/// Builder for [`ConnectorConfig`]
#[derive(Debug, Default)]
pub struct ConnectorConfigBuilder {
    connect_timeout: Option<Duration>,
    busy_timeout: Option<Duration>,
}

impl ConnectorConfigBuilder {
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// How long a SQLite commit waits for another writer
    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = Some(timeout);
        self
    }

    pub fn build(self) -> Result<ConnectorConfig, ConfigError> {
        let connect_timeout = self.connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT);
        if connect_timeout.is_zero() {
            return Err(ConfigError::ZeroConnectTimeout);
        }

        let mut ledger = LedgerConfig::builder();
        if let Some(busy_timeout) = self.busy_timeout {
            ledger = ledger.busy_timeout(busy_timeout);
        }

        Ok(ConnectorConfig {
            connect_timeout,
            ledger: ledger.build()?,
        })
    }
}

/// Resolves a `file:` url against the schema directory
pub fn sqlite_path(url: &str, schema_dir: &Path) -> Result<PathBuf, CliError> {
    let path = url.strip_prefix("file:").ok_or_else(|| {
        CliError::Schema(format!(
            "The sqlite datasource url must start with the protocol `file:`, got `{}`.",
            url
        ))
    })?;
    let path = path.split('?').next().unwrap_or(path);
    let path = Path::new(path);

    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(schema_dir.join(path).components().collect())
    }
}

fn unreachable(host: &str, port: u16) -> CliError {
    ResolveError::Connection(format!(
        "P1001: Can't reach database server at `{host}`:`{port}`\n\n\
         Please make sure your database server is running at `{host}`:`{port}`."
    ))
    .into()
}

/// Host and port a server url points at
///
/// IPv6 hosts come back without the brackets the url needs around them.
fn server_address(url: &str, provider: Provider) -> Result<(String, u16), CliError> {
    let parsed = Url::parse(url)
        .map_err(|e| CliError::Schema(format!("The datasource url is invalid: {}.", e)))?;
    let host = match parsed.host() {
        Some(Host::Domain(domain)) => domain.to_string(),
        Some(Host::Ipv4(ip)) => ip.to_string(),
        Some(Host::Ipv6(ip)) => ip.to_string(),
        None => return Err(CliError::Schema("The datasource url has no host.".to_string())),
    };
    let port = parsed
        .port()
        .or_else(|| provider.default_port())
        .unwrap_or_default();
    Ok((host, port))
}

/// Checks that the server behind `url` accepts TCP connections
async fn probe(url: &str, provider: Provider, timeout: Duration) -> Result<(), CliError> {
    let (host, port) = server_address(url, provider)?;

    log::debug!("probing {}:{} (timeout {:?})", host, port, timeout);
    match tokio::time::timeout(timeout, TcpStream::connect((host.as_str(), port))).await {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(e)) => {
            log::debug!("connection to {}:{} failed: {}", host, port, e);
            Err(unreachable(&host, port))
        }
        Err(_) => {
            log::debug!("connection to {}:{} timed out", host, port);
            Err(unreachable(&host, port))
        }
    }
}

/// Opens the migration ledger of `datasource`
///
/// # Errors
///
/// A connection error when the database is missing or unreachable, and
/// [`CliError::UnsupportedProvider`] for a reachable server whose ledger
/// this binary cannot open.
pub async fn connect(
    datasource: &Datasource,
    schema_dir: &Path,
    config: &ConnectorConfig,
) -> Result<SqliteLedgerStore, CliError> {
    match datasource.provider {
        Provider::Sqlite => {
            let path = sqlite_path(&datasource.url, schema_dir)?;
            let store = SqliteLedgerStore::open_with(path, &config.ledger)
                .map_err(ResolveError::from)?;
            Ok(store)
        }
        provider @ (Provider::Postgresql | Provider::Mysql) => {
            probe(&datasource.url, provider, config.connect_timeout).await?;
            Err(CliError::UnsupportedProvider(provider.to_string()))
        }
    }
}
