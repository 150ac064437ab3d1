//! Configuration loading and the API parameter store.
//!
//! Loads application configuration from TOML files. `AppConfig` is the root
//! configuration struct; `[api]` is the parameter store for the control-plane
//! server and is re-read on every activation, so an operator can change the
//! bind address, credentials, or TLS material between runs without restarting
//! the process. `ServerConfig` is the validated, immutable result of resolving
//! the store once.

use http::header::HeaderValue;
use serde::Deserialize;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

/// Default configuration file path
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Default log filter when RUST_LOG is not set
pub const DEFAULT_LOG_FILTER: &str = "spyglass=debug";

/// Default log format (text or json)
pub const DEFAULT_LOG_FORMAT: &str = "text";

/// Default bind address for the API server
pub const DEFAULT_API_ADDRESS: &str = "127.0.0.1";

/// Default bind port for the API server
pub const DEFAULT_API_PORT: u16 = 8081;

/// Default value of the Access-Control-Allow-Origin response header
pub const DEFAULT_ALLOW_ORIGIN: &str = "*";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// API server parameter store
    #[serde(default)]
    pub api: ApiConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Parameter store for the API server.
///
/// Every key has a default so an empty configuration file still resolves.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Address to bind the API server to
    #[serde(default = "ApiConfig::default_address")]
    pub address: String,
    /// Port to bind the API server to
    #[serde(default = "ApiConfig::default_port")]
    pub port: u16,
    /// Value of the Access-Control-Allow-Origin header on every response
    #[serde(default = "ApiConfig::default_allow_origin")]
    pub allow_origin: String,
    /// API authentication username (empty disables authentication)
    #[serde(default)]
    pub username: String,
    /// API authentication password (empty disables authentication)
    #[serde(default)]
    pub password: String,
    /// TLS certificate path (empty disables TLS)
    #[serde(default)]
    pub certificate: String,
    /// TLS key path (empty disables TLS)
    #[serde(default)]
    pub key: String,
    /// If true the /api/events route upgrades to a websocket instead of polling
    #[serde(default)]
    pub websocket: bool,
    /// Certificate profile used when generating a self-signed keypair
    #[serde(default)]
    pub tls: TlsProfile,
}

impl ApiConfig {
    fn default_address() -> String {
        DEFAULT_API_ADDRESS.to_string()
    }

    fn default_port() -> u16 {
        DEFAULT_API_PORT
    }

    fn default_allow_origin() -> String {
        DEFAULT_ALLOW_ORIGIN.to_string()
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            address: Self::default_address(),
            port: Self::default_port(),
            allow_origin: Self::default_allow_origin(),
            username: String::new(),
            password: String::new(),
            certificate: String::new(),
            key: String::new(),
            websocket: false,
            tls: TlsProfile::default(),
        }
    }
}

/// Subject and validity profile for generated self-signed certificates.
#[derive(Debug, Clone, Deserialize)]
pub struct TlsProfile {
    #[serde(default = "TlsProfile::default_common_name")]
    pub common_name: String,
    #[serde(default = "TlsProfile::default_organization")]
    pub organization: String,
    #[serde(default)]
    pub organizational_unit: String,
    #[serde(default = "TlsProfile::default_country")]
    pub country: String,
    #[serde(default)]
    pub locality: String,
    /// Validity window of the generated certificate in days
    #[serde(default = "TlsProfile::default_validity_days")]
    pub validity_days: i64,
}

impl TlsProfile {
    fn default_common_name() -> String {
        "spyglass.local".to_string()
    }

    fn default_organization() -> String {
        "spyglass devteam".to_string()
    }

    fn default_country() -> String {
        "US".to_string()
    }

    fn default_validity_days() -> i64 {
        365
    }
}

impl Default for TlsProfile {
    fn default() -> Self {
        Self {
            common_name: Self::default_common_name(),
            organization: Self::default_organization(),
            organizational_unit: String::new(),
            country: Self::default_country(),
            locality: String::new(),
            validity_days: Self::default_validity_days(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log format: "text" (human-readable, default) or "json" (structured)
    #[serde(default = "LoggingConfig::default_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: DEFAULT_LOG_FORMAT.to_string(),
        }
    }
}

impl LoggingConfig {
    fn default_format() -> String {
        DEFAULT_LOG_FORMAT.to_string()
    }
}

impl AppConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&contents)?;
        Ok(config)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Configuration error: {0}")]
    Validation(String),
}

/// Certificate and key paths for a TLS-enabled activation.
///
/// Constructed only when both paths are non-empty; either one empty falls
/// back to plain HTTP, it is not a partial state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsPaths {
    pub certificate: PathBuf,
    pub key: PathBuf,
}

/// Validated server configuration, immutable once resolved.
///
/// Resolved fresh from the parameter store on every activation; nothing in
/// here survives a stop/start cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub address: Ipv4Addr,
    pub port: u16,
    pub allow_origin: HeaderValue,
    pub username: String,
    pub password: String,
    pub tls: Option<TlsPaths>,
    pub websocket: bool,
}

impl ServerConfig {
    /// Resolve and validate the parameter store into a `ServerConfig`.
    ///
    /// Fails on the first invalid parameter; no partial config is ever
    /// returned.
    pub fn resolve(params: &ApiConfig) -> Result<Self, ConfigError> {
        let address: Ipv4Addr = params.address.parse().map_err(|_| {
            ConfigError::Validation(format!("'{}' is not a valid IPv4 address", params.address))
        })?;

        let allow_origin = HeaderValue::try_from(params.allow_origin.as_str()).map_err(|_| {
            ConfigError::Validation(format!(
                "'{}' is not a valid Access-Control-Allow-Origin value",
                params.allow_origin
            ))
        })?;

        let certificate = expand_path(&params.certificate)?;
        let key = expand_path(&params.key)?;
        let tls = match (certificate, key) {
            (Some(certificate), Some(key)) => Some(TlsPaths { certificate, key }),
            _ => None,
        };

        Ok(Self {
            address,
            port: params.port,
            allow_origin,
            username: params.username.clone(),
            password: params.password.clone(),
            tls,
            websocket: params.websocket,
        })
    }

    /// Socket address the listener binds to.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::from((self.address, self.port))
    }

    /// Basic-auth credentials, if the gate is armed.
    ///
    /// Returns `None` when either username or password is empty, in which
    /// case authentication is disabled entirely.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        if self.username.is_empty() || self.password.is_empty() {
            None
        } else {
            Some((&self.username, &self.password))
        }
    }
}

/// Expand a user-supplied path: `~` to the home directory, then absolutize
/// relative paths against the current directory.
///
/// Empty input means "unset" and expands to `None`.
fn expand_path(raw: &str) -> Result<Option<PathBuf>, ConfigError> {
    if raw.is_empty() {
        return Ok(None);
    }

    let path = if raw == "~" || raw.starts_with("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| ConfigError::Validation("Could not determine home directory".into()))?;
        home.join(raw.trim_start_matches("~/").trim_start_matches('~'))
    } else {
        PathBuf::from(raw)
    };

    let path = std::path::absolute(&path)
        .map_err(|e| ConfigError::Validation(format!("Invalid path '{}': {}", raw, e)))?;

    Ok(Some(path))
}
