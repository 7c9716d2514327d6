use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Every failure the Engine client can report.
///
/// The enum is `Clone` so that a single in-flight metadata refresh can hand
/// the same outcome to every waiter. Library errors are flattened to strings
/// on conversion for the same reason.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QengineError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("All {attempts} endpoint candidates failed (last error: {last})")]
    AllEndpointsFailed { attempts: usize, last: String },

    #[error("Authentication error: {0}")]
    Auth(String),

    /// Error object returned by the Engine, code and message kept verbatim.
    #[error("Engine error {code}: {message}")]
    Protocol {
        code: i64,
        message: String,
        parameter: Option<String>,
    },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Request timeout after {0}ms")]
    Timeout(u64),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("JSON serialization error: {0}")]
    Serialization(String),
}

/// Coarse error classes, used by callers that map failures onto status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Connection,
    Auth,
    Protocol,
    Validation,
    Timeout,
    NotFound,
    Config,
}

impl QengineError {
    pub fn validation(msg: impl Into<String>) -> Self {
        QengineError::Validation(msg.into())
    }

    pub fn timeout(elapsed: std::time::Duration) -> Self {
        QengineError::Timeout(elapsed.as_millis() as u64)
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            QengineError::Connection(_)
            | QengineError::AllEndpointsFailed { .. }
            | QengineError::Io(_) => ErrorKind::Connection,
            QengineError::Auth(_) => ErrorKind::Auth,
            QengineError::Protocol { .. }
            | QengineError::InvalidResponse(_)
            | QengineError::Serialization(_) => ErrorKind::Protocol,
            QengineError::Validation(_) => ErrorKind::Validation,
            QengineError::Timeout(_) => ErrorKind::Timeout,
            QengineError::NotFound(_) => ErrorKind::NotFound,
            QengineError::Config(_) => ErrorKind::Config,
        }
    }

    /// Remote error code, if the Engine reported one.
    pub fn engine_code(&self) -> Option<i64> {
        match self {
            QengineError::Protocol { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl From<std::io::Error> for QengineError {
    fn from(err: std::io::Error) -> Self {
        // tokio-rustls reports handshake failures as io errors wrapping the rustls error
        if let Some(tls) = err
            .get_ref()
            .and_then(|inner| inner.downcast_ref::<rustls::Error>())
        {
            return QengineError::from(tls.clone());
        }
        match err.kind() {
            std::io::ErrorKind::ConnectionRefused
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::NotConnected
            | std::io::ErrorKind::BrokenPipe => QengineError::Connection(err.to_string()),
            _ => QengineError::Io(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for QengineError {
    fn from(err: serde_json::Error) -> Self {
        QengineError::Serialization(err.to_string())
    }
}

impl From<rustls::Error> for QengineError {
    fn from(err: rustls::Error) -> Self {
        match err {
            rustls::Error::InvalidCertificate(_)
            | rustls::Error::NoCertificatesPresented
            | rustls::Error::UnsupportedNameType => QengineError::Auth(err.to_string()),
            other => QengineError::Connection(other.to_string()),
        }
    }
}

impl From<tungstenite::Error> for QengineError {
    fn from(err: tungstenite::Error) -> Self {
        match err {
            tungstenite::Error::Tls(tls) => match tls {
                tungstenite::error::TlsError::Rustls(inner) => QengineError::from(inner),
                other => QengineError::Connection(other.to_string()),
            },
            tungstenite::Error::Io(io) => QengineError::from(io),
            tungstenite::Error::Url(url) => QengineError::Config(url.to_string()),
            other => QengineError::Connection(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, QengineError>;
