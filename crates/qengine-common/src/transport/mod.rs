//! Engine Transport Layer
//!
//! A session talks to the Engine over a [`Duplex`]: a sink of outbound text
//! frames and a stream of inbound ones. Everything above this module works on
//! that pair and never sees the socket underneath.
//!
//! # Components
//!
//! - **[`JsonCodec`]**: encode requests and classify inbound frames
//! - **[`client_config`]**: mutual-TLS client configuration
//! - **[`Connector`]** / **[`WsConnector`]**: open a duplex to one [`Endpoint`]
//! - **[`memory_duplex`]**: an in-process pair for Engine doubles
//!
//! # Example
//!
//! ```no_run
//! use qengine_common::auth::{PemFileProvider, CertificateProvider, UserIdentity};
//! use qengine_common::config::CertPaths;
//! use qengine_common::transport::{client_config, Connector, Endpoint, WsConnector};
//!
//! # #[tokio::main]
//! # async fn main() -> qengine_common::Result<()> {
//! let material = PemFileProvider::new(&CertPaths::default()).load()?;
//! let tls = client_config(material, true)?;
//!
//! let connector = WsConnector::new(UserIdentity::new("INTERNAL", "sa_engine"));
//! let endpoint = Endpoint::secure("qlik.example.com", 4747, "/app/engineData");
//! let duplex = connector.connect(&endpoint, tls).await?;
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod memory;
pub mod tls;
pub mod websocket;

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::{Sink, Stream};

use crate::protocol::error::{QengineError, Result};

pub use codec::JsonCodec;
pub use memory::{memory_duplex, MemoryPeer};
pub use tls::client_config;
pub use websocket::{from_websocket, WsConnector};

/// Outbound half of a duplex: one `String` per text frame.
pub type FrameSink = Pin<Box<dyn Sink<String, Error = QengineError> + Send>>;

/// Inbound half of a duplex. The stream ends when the peer closes.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// A connected, authenticated text channel to the Engine.
pub struct Duplex {
    pub sink: FrameSink,
    pub stream: FrameStream,
}

impl Duplex {
    pub fn new<S, T>(sink: S, stream: T) -> Self
    where
        S: Sink<String, Error = QengineError> + Send + 'static,
        T: Stream<Item = Result<String>> + Send + 'static,
    {
        Self {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        }
    }
}

impl fmt::Debug for Duplex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Duplex").finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    Wss,
    Ws,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Wss => "wss",
            Scheme::Ws => "ws",
        }
    }
}

/// One place the Engine may be listening.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub scheme: Scheme,
    pub host: String,
    pub port: u16,
    pub path: String,
}

impl Endpoint {
    pub fn secure(host: impl Into<String>, port: u16, path: impl Into<String>) -> Self {
        Self {
            scheme: Scheme::Wss,
            host: host.into(),
            port,
            path: path.into(),
        }
    }

    pub fn insecure(host: impl Into<String>, port: u16, path: impl Into<String>) -> Self {
        Self {
            scheme: Scheme::Ws,
            host: host.into(),
            port,
            path: path.into(),
        }
    }

    pub fn is_secure(&self) -> bool {
        self.scheme == Scheme::Wss
    }

    pub fn url(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}://{}:{}{}",
            self.scheme.as_str(),
            self.host,
            self.port,
            self.path
        )
    }
}

/// Opens a duplex to a single endpoint.
///
/// Implementations make exactly one attempt. Falling back across endpoints
/// is the caller's job. A failure that no other endpoint could fix (a bad
/// client certificate, an untrusted server) must be reported as
/// [`QengineError::Auth`].
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, endpoint: &Endpoint, tls: Arc<rustls::ClientConfig>)
        -> Result<Duplex>;
}
