//! Authentication material for Engine sessions.
//!
//! The Engine authenticates a client twice on every connection:
//!
//! - **Mutual TLS**: the client presents a certificate signed by the
//!   deployment's root CA, and verifies the server against that same root.
//! - **Identity header**: the upgrade request names the user the session runs
//!   as, via `X-Qlik-User: UserDirectory=<dir>; UserId=<id>`.
//!
//! Certificates come from a [`CertificateProvider`]. Any failure to load them
//! is reported as [`QengineError::Auth`], which callers treat as fatal: it is
//! a local misconfiguration, never a reason to try another endpoint.

use std::fmt;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use rustls::pki_types::{CertificateDer, PrivateKeyDer};

use crate::config::CertPaths;
use crate::protocol::error::{QengineError, Result};

/// Header carrying the session identity on the WebSocket upgrade request.
pub const USER_HEADER: &str = "X-Qlik-User";

/// The user a session runs as.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserIdentity {
    pub user_directory: String,
    pub user_id: String,
}

impl UserIdentity {
    pub fn new(user_directory: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            user_directory: user_directory.into(),
            user_id: user_id.into(),
        }
    }

    /// Value of the [`USER_HEADER`] header.
    ///
    /// ```
    /// use qengine_common::auth::UserIdentity;
    ///
    /// let identity = UserIdentity::new("INTERNAL", "sa_engine");
    /// assert_eq!(identity.header_value(), "UserDirectory=INTERNAL; UserId=sa_engine");
    /// ```
    pub fn header_value(&self) -> String {
        format!(
            "UserDirectory={}; UserId={}",
            self.user_directory, self.user_id
        )
    }
}

impl fmt::Display for UserIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\\{}", self.user_directory, self.user_id)
    }
}

/// Parsed certificates and key for one TLS client configuration.
pub struct TlsMaterial {
    pub client_chain: Vec<CertificateDer<'static>>,
    pub client_key: PrivateKeyDer<'static>,
    pub roots: Vec<CertificateDer<'static>>,
}

impl fmt::Debug for TlsMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsMaterial")
            .field("client_chain", &self.client_chain.len())
            .field("client_key", &"*****")
            .field("roots", &self.roots.len())
            .finish()
    }
}

/// Source of the client certificate, key and CA bundle.
pub trait CertificateProvider: Send + Sync {
    fn load(&self) -> Result<TlsMaterial>;
}

/// Reads PEM files from disk on every [`load`](CertificateProvider::load).
#[derive(Clone, Debug)]
pub struct PemFileProvider {
    cert_path: PathBuf,
    key_path: PathBuf,
    ca_path: PathBuf,
}

impl PemFileProvider {
    pub fn new(paths: &CertPaths) -> Self {
        Self {
            cert_path: paths.client_cert.clone(),
            key_path: paths.client_key.clone(),
            ca_path: paths.root_ca.clone(),
        }
    }
}

impl CertificateProvider for PemFileProvider {
    fn load(&self) -> Result<TlsMaterial> {
        let client_chain = parse_certs(&read_pem(&self.cert_path)?, &self.cert_path)?;
        let client_key = parse_key(&read_pem(&self.key_path)?, &self.key_path)?;
        let roots = parse_certs(&read_pem(&self.ca_path)?, &self.ca_path)?;

        tracing::debug!(
            cert = %self.cert_path.display(),
            roots = roots.len(),
            "Loaded client certificates"
        );

        Ok(TlsMaterial {
            client_chain,
            client_key,
            roots,
        })
    }
}

/// Serves PEM blobs already held in memory.
#[derive(Clone)]
pub struct PemBytesProvider {
    cert: Vec<u8>,
    key: Vec<u8>,
    ca: Vec<u8>,
}

impl PemBytesProvider {
    pub fn new(cert: impl Into<Vec<u8>>, key: impl Into<Vec<u8>>, ca: impl Into<Vec<u8>>) -> Self {
        Self {
            cert: cert.into(),
            key: key.into(),
            ca: ca.into(),
        }
    }
}

impl CertificateProvider for PemBytesProvider {
    fn load(&self) -> Result<TlsMaterial> {
        Ok(TlsMaterial {
            client_chain: parse_certs(&self.cert, Path::new("<client cert>"))?,
            client_key: parse_key(&self.key, Path::new("<client key>"))?,
            roots: parse_certs(&self.ca, Path::new("<root ca>"))?,
        })
    }
}

fn read_pem(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path)
        .map_err(|e| QengineError::Auth(format!("cannot read {}: {}", path.display(), e)))
}

fn parse_certs(pem: &[u8], origin: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let certs = rustls_pemfile::certs(&mut BufReader::new(pem))
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| {
            QengineError::Auth(format!("invalid certificate in {}: {}", origin.display(), e))
        })?;

    if certs.is_empty() {
        return Err(QengineError::Auth(format!(
            "no certificate found in {}",
            origin.display()
        )));
    }
    Ok(certs)
}

fn parse_key(pem: &[u8], origin: &Path) -> Result<PrivateKeyDer<'static>> {
    rustls_pemfile::private_key(&mut BufReader::new(pem))
        .map_err(|e| QengineError::Auth(format!("invalid key in {}: {}", origin.display(), e)))?
        .ok_or_else(|| QengineError::Auth(format!("no private key found in {}", origin.display())))
}
