//! In-process duplex, used to stand up Engine doubles without a socket.

use futures::channel::mpsc::{self, UnboundedReceiver, UnboundedSender};
use futures::{SinkExt, StreamExt};
use serde_json::Value;

use super::{Duplex, JsonCodec};
use crate::protocol::error::{QengineError, Result};
use crate::protocol::{Request, RequestId, RpcError};

/// The Engine side of a [`memory_duplex`].
///
/// Dropping the peer closes the client's inbound stream, which a session
/// sees as the connection going away.
pub struct MemoryPeer {
    pub incoming: UnboundedReceiver<String>,
    pub outgoing: UnboundedSender<String>,
}

impl MemoryPeer {
    /// Next request the client sent, or `None` once the client side is gone.
    pub async fn recv_request(&mut self) -> Option<Request> {
        loop {
            let text = self.incoming.next().await?;
            match JsonCodec::decode_request(&text) {
                Ok(request) => return Some(request),
                Err(e) => tracing::debug!(error = %e, "Peer skipped undecodable frame"),
            }
        }
    }

    pub fn send_text(&self, text: impl Into<String>) -> Result<()> {
        self.outgoing
            .unbounded_send(text.into())
            .map_err(|e| QengineError::Connection(e.to_string()))
    }

    pub fn reply(&self, id: RequestId, result: Value) -> Result<()> {
        self.send_text(JsonCodec::encode_result(id, &result)?)
    }

    pub fn reply_error(&self, id: RequestId, error: RpcError) -> Result<()> {
        self.send_text(JsonCodec::encode_error(id, &error)?)
    }

    /// Push an unsolicited notification.
    pub fn notify(&self, method: &str, params: Value) -> Result<()> {
        self.send_text(
            serde_json::json!({"jsonrpc": "2.0", "method": method, "params": params}).to_string(),
        )
    }
}

/// A connected client [`Duplex`] and the [`MemoryPeer`] on the other end.
pub fn memory_duplex() -> (Duplex, MemoryPeer) {
    let (to_peer, incoming) = mpsc::unbounded::<String>();
    let (outgoing, from_peer) = mpsc::unbounded::<String>();

    let sink = to_peer.sink_map_err(|e| QengineError::Connection(e.to_string()));
    let stream = from_peer.map(Ok);

    (
        Duplex::new(sink, stream),
        MemoryPeer { incoming, outgoing },
    )
}
