//! Engine connection and query configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::auth::UserIdentity;
use crate::protocol::error::{QengineError, Result};

/// Port the Engine listens on in a default deployment.
pub const DEFAULT_ENGINE_PORT: u16 = 4747;

/// Locations of the PEM files used for mutual TLS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertPaths {
    pub client_cert: PathBuf,
    pub client_key: PathBuf,
    pub root_ca: PathBuf,
}

impl Default for CertPaths {
    fn default() -> Self {
        Self {
            client_cert: PathBuf::from("certs/client.pem"),
            client_key: PathBuf::from("certs/client_key.pem"),
            root_ca: PathBuf::from("certs/root.pem"),
        }
    }
}

/// Everything needed to reach the Engine and bound the work done there.
///
/// # Default Configuration
///
/// - `engine_port`: 4747
/// - `verify_tls`: true, `allow_insecure`: false
/// - `max_endpoint_candidates`: 4
/// - `connect_timeout`: 30s, `call_timeout`: 60s, `fetch_timeout`: 300s
/// - `max_page_size`: 1000, `max_rows_per_call`: 10 000
/// - `metadata_ttl`: 300s, `metadata_capacity`: 256 apps
///
/// # Example
///
/// ```
/// use qengine_common::config::EngineConfig;
/// use std::time::Duration;
///
/// let config = EngineConfig::new("qlik.example.com")
///     .with_identity("INTERNAL", "sa_engine")
///     .with_call_timeout(Duration::from_secs(10));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub host: String,
    pub engine_port: u16,
    pub user_directory: String,
    pub user_id: String,
    pub certs: CertPaths,
    /// Check the server certificate against `certs.root_ca`.
    pub verify_tls: bool,
    /// Also try plain `ws://` endpoints after the secure ones.
    pub allow_insecure: bool,
    pub max_endpoint_candidates: usize,
    /// Per-candidate connect and handshake budget.
    pub connect_timeout: Duration,
    /// Budget for a single RPC round trip.
    pub call_timeout: Duration,
    /// Budget for a whole page fetch, connect to last row.
    pub fetch_timeout: Duration,
    pub max_page_size: u32,
    pub max_rows_per_call: u32,
    pub metadata_ttl: Duration,
    pub metadata_capacity: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            engine_port: DEFAULT_ENGINE_PORT,
            user_directory: "INTERNAL".to_string(),
            user_id: "sa_engine".to_string(),
            certs: CertPaths::default(),
            verify_tls: true,
            allow_insecure: false,
            max_endpoint_candidates: 4,
            connect_timeout: Duration::from_secs(30),
            call_timeout: Duration::from_secs(60),
            fetch_timeout: Duration::from_secs(300),
            max_page_size: 1000,
            max_rows_per_call: 10_000,
            metadata_ttl: Duration::from_secs(300),
            metadata_capacity: 256,
        }
    }
}

impl EngineConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Self::default()
        }
    }

    /// Read the `QLIK_*` environment variables over the defaults.
    ///
    /// | Variable | Field |
    /// |---|---|
    /// | `QLIK_SENSE_HOST` | `host` |
    /// | `QLIK_ENGINE_PORT` | `engine_port` |
    /// | `QLIK_USER_DIRECTORY` / `QLIK_USER_ID` | identity |
    /// | `QLIK_CERT_PATH` / `QLIK_KEY_PATH` / `QLIK_ROOT_CERT_PATH` | `certs` |
    /// | `QLIK_VERIFY_SSL` | `verify_tls` |
    /// | `QLIK_CONNECTION_TIMEOUT` | `connect_timeout` (seconds) |
    /// | `QLIK_REQUEST_TIMEOUT` | `call_timeout` (seconds) |
    /// | `QLIK_WS_TIMEOUT` | `fetch_timeout` (seconds) |
    /// | `MAX_PAGE_SIZE` | `max_page_size` |
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env), reading variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(host) = lookup("QLIK_SENSE_HOST") {
            config.host = host;
        }
        if let Some(port) = parse_var(&lookup, "QLIK_ENGINE_PORT")? {
            config.engine_port = port;
        }
        if let Some(directory) = lookup("QLIK_USER_DIRECTORY") {
            config.user_directory = directory;
        }
        if let Some(user) = lookup("QLIK_USER_ID") {
            config.user_id = user;
        }
        if let Some(path) = lookup("QLIK_CERT_PATH") {
            config.certs.client_cert = path.into();
        }
        if let Some(path) = lookup("QLIK_KEY_PATH") {
            config.certs.client_key = path.into();
        }
        if let Some(path) = lookup("QLIK_ROOT_CERT_PATH") {
            config.certs.root_ca = path.into();
        }
        if let Some(raw) = lookup("QLIK_VERIFY_SSL") {
            config.verify_tls = parse_bool("QLIK_VERIFY_SSL", &raw)?;
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "QLIK_CONNECTION_TIMEOUT")? {
            config.connect_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "QLIK_REQUEST_TIMEOUT")? {
            config.call_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "QLIK_WS_TIMEOUT")? {
            config.fetch_timeout = Duration::from_secs(secs);
        }
        if let Some(size) = parse_var(&lookup, "MAX_PAGE_SIZE")? {
            config.max_page_size = size;
        }

        Ok(config)
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.engine_port = port;
        self
    }

    pub fn with_identity(
        mut self,
        user_directory: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        self.user_directory = user_directory.into();
        self.user_id = user_id.into();
        self
    }

    pub fn with_certs(mut self, certs: CertPaths) -> Self {
        self.certs = certs;
        self
    }

    pub fn with_verify_tls(mut self, verify: bool) -> Self {
        self.verify_tls = verify;
        self
    }

    pub fn with_allow_insecure(mut self, allow: bool) -> Self {
        self.allow_insecure = allow;
        self
    }

    pub fn with_max_endpoint_candidates(mut self, max: usize) -> Self {
        self.max_endpoint_candidates = max;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn with_max_page_size(mut self, size: u32) -> Self {
        self.max_page_size = size;
        self
    }

    pub fn with_max_rows_per_call(mut self, rows: u32) -> Self {
        self.max_rows_per_call = rows;
        self
    }

    pub fn with_metadata_ttl(mut self, ttl: Duration) -> Self {
        self.metadata_ttl = ttl;
        self
    }

    pub fn with_metadata_capacity(mut self, capacity: u64) -> Self {
        self.metadata_capacity = capacity;
        self
    }

    pub fn identity(&self) -> UserIdentity {
        UserIdentity::new(&self.user_directory, &self.user_id)
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(QengineError::Config("host must not be empty".into()));
        }
        if self.user_directory.is_empty() || self.user_id.is_empty() {
            return Err(QengineError::Config(
                "user directory and user id must both be set".into(),
            ));
        }
        if self.max_endpoint_candidates == 0 {
            return Err(QengineError::Config(
                "max_endpoint_candidates must be at least 1".into(),
            ));
        }
        if self.max_page_size == 0 {
            return Err(QengineError::Config("max_page_size must be at least 1".into()));
        }
        if self.max_rows_per_call == 0 {
            return Err(QengineError::Config(
                "max_rows_per_call must be at least 1".into(),
            ));
        }
        for (name, value) in [
            ("connect_timeout", self.connect_timeout),
            ("call_timeout", self.call_timeout),
            ("fetch_timeout", self.fetch_timeout),
        ] {
            if value.is_zero() {
                return Err(QengineError::Config(format!("{} must be non-zero", name)));
            }
        }
        Ok(())
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| QengineError::Config(format!("{}={:?}: {}", key, raw, e)))
        })
        .transpose()
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(QengineError::Config(format!(
            "{}={:?}: expected a boolean",
            key, raw
        ))),
    }
}
