//! Command-line overrides on top of the environment configuration.

use std::path::PathBuf;

use qengine_common::config::EngineConfig;

/// Connection settings given on the command line. `None` keeps the value
/// read from the environment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConnectionOptions {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user_directory: Option<String>,
    pub user_id: Option<String>,
    pub cert: Option<PathBuf>,
    pub key: Option<PathBuf>,
    pub root_ca: Option<PathBuf>,
    pub no_verify: bool,
}

impl ConnectionOptions {
    pub fn apply(&self, mut config: EngineConfig) -> EngineConfig {
        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.port {
            config.engine_port = port;
        }
        if let Some(directory) = &self.user_directory {
            config.user_directory = directory.clone();
        }
        if let Some(user) = &self.user_id {
            config.user_id = user.clone();
        }
        if let Some(path) = &self.cert {
            config.certs.client_cert = path.clone();
        }
        if let Some(path) = &self.key {
            config.certs.client_key = path.clone();
        }
        if let Some(path) = &self.root_ca {
            config.certs.root_ca = path.clone();
        }
        if self.no_verify {
            config.verify_tls = false;
        }
        config
    }
}
