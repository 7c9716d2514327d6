use std::sync::Arc;

use async_trait::async_trait;
use futures::{future, SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use super::{Connector, Duplex, Endpoint, Scheme};
use crate::auth::{UserIdentity, USER_HEADER};
use crate::protocol::error::{QengineError, Result};

/// Connects to the Engine over WebSocket, `wss` with the supplied mutual-TLS
/// configuration or plain `ws` for insecure endpoints.
///
/// Every upgrade request carries the [`USER_HEADER`] identity.
#[derive(Clone, Debug)]
pub struct WsConnector {
    identity: UserIdentity,
}

impl WsConnector {
    pub fn new(identity: UserIdentity) -> Self {
        Self { identity }
    }

    pub fn identity(&self) -> &UserIdentity {
        &self.identity
    }

    fn upgrade_request(
        &self,
        endpoint: &Endpoint,
    ) -> Result<tokio_tungstenite::tungstenite::handshake::client::Request> {
        let mut request = endpoint.url().into_client_request()?;

        let name = HeaderName::from_bytes(USER_HEADER.as_bytes())
            .map_err(|e| QengineError::Config(format!("invalid header name: {}", e)))?;
        let value = HeaderValue::from_str(&self.identity.header_value()).map_err(|e| {
            QengineError::Config(format!("identity {} is not a valid header: {}", self.identity, e))
        })?;
        request.headers_mut().insert(name, value);

        Ok(request)
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(
        &self,
        endpoint: &Endpoint,
        tls: Arc<rustls::ClientConfig>,
    ) -> Result<Duplex> {
        let request = self.upgrade_request(endpoint)?;
        let connector = match endpoint.scheme {
            Scheme::Wss => tokio_tungstenite::Connector::Rustls(tls),
            Scheme::Ws => tokio_tungstenite::Connector::Plain,
        };

        let (ws, response) =
            tokio_tungstenite::connect_async_tls_with_config(request, None, false, Some(connector))
                .await?;

        tracing::debug!(
            endpoint = %endpoint,
            status = %response.status(),
            "WebSocket upgrade accepted"
        );

        Ok(from_websocket(ws))
    }
}

/// Adapts a WebSocket into a text [`Duplex`].
///
/// Binary frames are accepted if they hold UTF-8. Control frames are
/// swallowed; tungstenite answers pings on its own.
pub fn from_websocket<S>(ws: WebSocketStream<S>) -> Duplex
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (write, read) = ws.split();

    let sink = write
        .sink_map_err(QengineError::from)
        .with(|text: String| future::ready(Ok::<_, QengineError>(Message::Text(text))));

    let stream = read.filter_map(|message| {
        future::ready(match message {
            Ok(Message::Text(text)) => Some(Ok(text)),
            Ok(Message::Binary(bytes)) => Some(String::from_utf8(bytes).map_err(|e| {
                QengineError::InvalidResponse(format!("binary frame is not UTF-8: {}", e))
            })),
            Ok(Message::Close(frame)) => {
                tracing::debug!(?frame, "Engine closed the WebSocket");
                None
            }
            Ok(_) => None,
            Err(e) => Some(Err(QengineError::from(e))),
        })
    });

    Duplex::new(sink, stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upgrade_request_carries_identity() {
        let connector = WsConnector::new(UserIdentity::new("INTERNAL", "sa_engine"));
        let endpoint = Endpoint::secure("qlik.local", 4747, "/app/engineData");

        let request = connector.upgrade_request(&endpoint).unwrap();
        assert_eq!(request.uri().to_string(), "wss://qlik.local:4747/app/engineData");
        assert_eq!(
            request.headers().get("x-qlik-user").unwrap(),
            "UserDirectory=INTERNAL; UserId=sa_engine"
        );
    }

    #[test]
    fn test_identity_with_newline_is_config_error() {
        let connector = WsConnector::new(UserIdentity::new("INTERNAL", "bad\nuser"));
        let endpoint = Endpoint::secure("qlik.local", 4747, "/app");

        let err = connector.upgrade_request(&endpoint).unwrap_err();
        assert!(matches!(err, QengineError::Config(_)));
    }

    #[tokio::test]
    async fn test_refused_connection_is_not_auth() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let material = {
            use crate::auth::{CertificateProvider, PemBytesProvider};
            let cert =
                rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
            let pem = cert.cert.pem();
            PemBytesProvider::new(pem.clone(), cert.key_pair.serialize_pem(), pem)
                .load()
                .unwrap()
        };
        let tls = crate::transport::client_config(material, true).unwrap();

        let connector = WsConnector::new(UserIdentity::new("INTERNAL", "sa_engine"));
        let err = connector
            .connect(&Endpoint::insecure("127.0.0.1", port, "/app"), tls)
            .await
            .unwrap_err();
        assert_ne!(err.kind(), crate::protocol::ErrorKind::Auth);
    }
}
