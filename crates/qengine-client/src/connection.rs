use std::sync::{Arc, Mutex, PoisonError, Weak};

use qengine_common::auth::{CertificateProvider, PemFileProvider};
use qengine_common::config::{EngineConfig, DEFAULT_ENGINE_PORT};
use qengine_common::protocol::error::{ErrorKind, QengineError, Result};
use qengine_common::transport::{client_config, Connector, Endpoint, WsConnector};

use crate::session::{Session, SessionShared};

/// Paths the Engine serves its API on, in the order they are tried.
pub const ENGINE_PATHS: [&str; 2] = ["/app/engineData", "/app"];

/// Ordered endpoint candidates for `config`.
///
/// Secure candidates come first: the configured port, then the well-known
/// Engine port if it differs, each with every path in [`ENGINE_PATHS`]. The
/// list is cut to `max_endpoint_candidates`. Plain `ws://` equivalents follow
/// only when `allow_insecure` is set.
///
/// ```
/// use qengine_client::endpoint_candidates;
/// use qengine_common::config::EngineConfig;
///
/// let urls: Vec<String> = endpoint_candidates(&EngineConfig::new("qlik.local").with_port(4848))
///     .iter()
///     .map(|e| e.url())
///     .collect();
/// assert_eq!(urls, [
///     "wss://qlik.local:4848/app/engineData",
///     "wss://qlik.local:4848/app",
///     "wss://qlik.local:4747/app/engineData",
///     "wss://qlik.local:4747/app",
/// ]);
/// ```
pub fn endpoint_candidates(config: &EngineConfig) -> Vec<Endpoint> {
    let mut ports = vec![config.engine_port];
    if config.engine_port != DEFAULT_ENGINE_PORT {
        ports.push(DEFAULT_ENGINE_PORT);
    }

    let mut candidates: Vec<Endpoint> = ports
        .iter()
        .flat_map(|port| {
            ENGINE_PATHS
                .iter()
                .map(move |path| Endpoint::secure(config.host.clone(), *port, *path))
        })
        .take(config.max_endpoint_candidates.max(1))
        .collect();

    if config.allow_insecure {
        let insecure: Vec<Endpoint> = candidates
            .iter()
            .map(|e| Endpoint::insecure(e.host.clone(), e.port, e.path.clone()))
            .collect();
        candidates.extend(insecure);
    }

    candidates
}

/// Opens authenticated Engine sessions.
///
/// Each [`acquire_session`](Self::acquire_session) yields a fresh
/// [`Session`] for one logical operation, so two operations never share a
/// request id namespace. The manager remembers the sessions it handed out
/// so that [`shutdown`](Self::shutdown) can close any still open.
///
/// # Example
///
/// ```rust,no_run
/// use qengine_client::ConnectionManager;
/// use qengine_common::config::EngineConfig;
/// use serde_json::json;
///
/// # #[tokio::main]
/// # async fn main() -> qengine_common::Result<()> {
/// let manager = ConnectionManager::from_config(EngineConfig::from_env()?);
/// let session = manager.acquire_session().await?;
/// let version = session.call(-1, "EngineVersion", json!([])).await?;
/// session.close().await;
/// # Ok(())
/// # }
/// ```
pub struct ConnectionManager {
    config: EngineConfig,
    connector: Arc<dyn Connector>,
    certificates: Arc<dyn CertificateProvider>,
    live: Mutex<Vec<Weak<SessionShared>>>,
}

impl ConnectionManager {
    pub fn new(
        config: EngineConfig,
        connector: Arc<dyn Connector>,
        certificates: Arc<dyn CertificateProvider>,
    ) -> Self {
        Self {
            config,
            connector,
            certificates,
            live: Mutex::new(Vec::new()),
        }
    }

    /// WebSocket connector and PEM files, both taken from `config`.
    pub fn from_config(config: EngineConfig) -> Self {
        let connector = Arc::new(WsConnector::new(config.identity()));
        let certificates = Arc::new(PemFileProvider::new(&config.certs));
        Self::new(config, connector, certificates)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Connect to the first endpoint candidate that accepts us.
    ///
    /// Certificates are loaded before any connection attempt; if that fails
    /// no endpoint is tried. Each candidate gets one attempt bounded by
    /// `connect_timeout`. An authentication failure on any candidate ends the
    /// search immediately; any other failure moves on to the next one.
    pub async fn acquire_session(&self) -> Result<Session> {
        let material = self.certificates.load()?;
        let tls = client_config(material, self.config.verify_tls)?;

        let candidates = endpoint_candidates(&self.config);
        let mut attempts = 0;
        let mut last_error = String::from("no endpoint candidates");

        for endpoint in candidates {
            attempts += 1;
            let attempt = tokio::time::timeout(
                self.config.connect_timeout,
                self.connector.connect(&endpoint, tls.clone()),
            )
            .await;

            match attempt {
                Ok(Ok(duplex)) => {
                    let session = Session::new(duplex, endpoint, self.config.call_timeout);
                    tracing::info!(
                        endpoint = %session.endpoint(),
                        attempts,
                        user = %self.config.identity(),
                        "Engine session open"
                    );
                    self.track(&session);
                    return Ok(session);
                }
                Ok(Err(e)) if e.kind() == ErrorKind::Auth => {
                    tracing::error!(endpoint = %endpoint, error = %e, "Authentication failed");
                    return Err(e);
                }
                Ok(Err(e)) => {
                    tracing::warn!(endpoint = %endpoint, attempt = attempts, error = %e, "Endpoint failed");
                    last_error = e.to_string();
                }
                Err(_) => {
                    tracing::warn!(
                        endpoint = %endpoint,
                        attempt = attempts,
                        timeout_ms = self.config.connect_timeout.as_millis() as u64,
                        "Endpoint timed out"
                    );
                    last_error = format!(
                        "connect to {} timed out after {}ms",
                        endpoint,
                        self.config.connect_timeout.as_millis()
                    );
                }
            }
        }

        Err(QengineError::AllEndpointsFailed {
            attempts,
            last: last_error,
        })
    }

    /// Number of sessions handed out that are still open.
    pub fn open_sessions(&self) -> usize {
        let mut live = self.live.lock().unwrap_or_else(PoisonError::into_inner);
        live.retain(|weak| weak.upgrade().is_some_and(|s| s.is_live()));
        live.len()
    }

    /// Close every session still open.
    pub fn shutdown(&self) {
        let sessions: Vec<Weak<SessionShared>> = self
            .live
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();

        let mut closed = 0;
        for shared in sessions.iter().filter_map(Weak::upgrade) {
            if shared.is_live() {
                tracing::debug!(session = shared.number(), "Closing session on shutdown");
                shared.close("connection manager shut down");
                closed += 1;
            }
        }
        tracing::info!(closed, "Connection manager shut down");
    }

    fn track(&self, session: &Session) {
        let mut live = self.live.lock().unwrap_or_else(PoisonError::into_inner);
        live.retain(|weak| weak.upgrade().is_some_and(|s| s.is_live()));
        live.push(Arc::downgrade(session.shared()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidates_default_port() {
        let candidates = endpoint_candidates(&EngineConfig::new("qlik.local"));
        let urls: Vec<String> = candidates.iter().map(Endpoint::url).collect();
        assert_eq!(
            urls,
            vec![
                "wss://qlik.local:4747/app/engineData",
                "wss://qlik.local:4747/app",
            ]
        );
    }

    #[test]
    fn test_candidates_truncated() {
        let config = EngineConfig::new("qlik.local")
            .with_port(4848)
            .with_max_endpoint_candidates(3);
        let candidates = endpoint_candidates(&config);
        assert_eq!(candidates.len(), 3);
        assert_eq!(candidates[2].url(), "wss://qlik.local:4747/app/engineData");
    }

    #[test]
    fn test_candidates_insecure_appended() {
        let config = EngineConfig::new("localhost")
            .with_max_endpoint_candidates(1)
            .with_allow_insecure(true);
        let urls: Vec<String> = endpoint_candidates(&config)
            .iter()
            .map(Endpoint::url)
            .collect();
        assert_eq!(
            urls,
            vec![
                "wss://localhost:4747/app/engineData",
                "ws://localhost:4747/app/engineData",
            ]
        );
    }
}
