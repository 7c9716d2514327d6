use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use futures::{SinkExt, StreamExt};
use qengine_common::protocol::error::{QengineError, Result};
use qengine_common::protocol::{Frame, Handle, Request, RequestId};
use qengine_common::transport::{Duplex, Endpoint, FrameSink, FrameStream, JsonCodec};
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;

static NEXT_SESSION: AtomicU64 = AtomicU64::new(1);

/// Lifecycle of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Open,
    Closed,
    Failed,
}

/// A call waiting for its response.
struct PendingCall {
    method: String,
    reply: oneshot::Sender<Result<Value>>,
}

/// State shared between a session, its reader task and the connection
/// manager's drain list.
pub(crate) struct SessionShared {
    number: u64,
    endpoint: Endpoint,
    next_id: AtomicU64,
    pending: Mutex<HashMap<RequestId, PendingCall>>,
    state: Mutex<SessionState>,
    last_used: Mutex<Instant>,
    reader: Mutex<Option<AbortHandle>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SessionShared {
    fn state(&self) -> SessionState {
        *lock(&self.state)
    }

    fn set_state(&self, state: SessionState) {
        *lock(&self.state) = state;
    }

    fn take(&self, id: RequestId) -> Option<PendingCall> {
        lock(&self.pending).remove(&id)
    }

    /// Route one inbound frame to the call waiting on its id.
    fn dispatch(&self, text: &str) {
        match JsonCodec::decode_frame(text) {
            Frame::Response { id, outcome } => match self.take(id) {
                Some(call) => {
                    tracing::debug!(session = self.number, id, method = %call.method, ok = outcome.is_ok(), "Response received");
                    let _ = call.reply.send(outcome.map_err(QengineError::from));
                }
                None => {
                    tracing::debug!(session = self.number, id, "Discarding response for unknown or retired id");
                }
            },
            Frame::Notification { method } => {
                tracing::debug!(session = self.number, method = %method, "Ignoring notification");
            }
            Frame::Malformed {
                id: Some(id),
                reason,
            } => match self.take(id) {
                Some(call) => {
                    tracing::warn!(session = self.number, id, method = %call.method, reason = %reason, "Malformed response");
                    let _ = call.reply.send(Err(QengineError::InvalidResponse(reason)));
                }
                None => {
                    tracing::debug!(session = self.number, id, reason = %reason, "Discarding malformed frame");
                }
            },
            Frame::Malformed { id: None, reason } => {
                tracing::warn!(session = self.number, reason = %reason, "Discarding malformed frame");
            }
        }
    }

    /// Fail every outstanding call with a connection error.
    fn fail_pending(&self, reason: &str) {
        let drained: Vec<(RequestId, PendingCall)> = lock(&self.pending).drain().collect();
        if !drained.is_empty() {
            tracing::debug!(session = self.number, count = drained.len(), reason, "Failing pending calls");
        }
        for (_, call) in drained {
            let _ = call
                .reply
                .send(Err(QengineError::Connection(reason.to_string())));
        }
    }

    /// Stop reading and fail everything still in flight.
    pub(crate) fn close(&self, reason: &str) {
        {
            let mut state = lock(&self.state);
            if *state == SessionState::Open || *state == SessionState::Connecting {
                *state = SessionState::Closed;
            }
        }
        if let Some(reader) = lock(&self.reader).take() {
            reader.abort();
        }
        self.fail_pending(reason);
    }

    pub(crate) fn is_live(&self) -> bool {
        self.state() == SessionState::Open
    }

    pub(crate) fn number(&self) -> u64 {
        self.number
    }
}

/// Removes a call from the pending map when the waiting future goes away,
/// whether it completed, timed out or was dropped.
struct PendingGuard<'a> {
    shared: &'a SessionShared,
    id: RequestId,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        lock(&self.shared.pending).remove(&self.id);
    }
}

/// One authenticated duplex connection and its request correlator.
///
/// Request ids start at 1 and only ever grow. Any number of calls may be in
/// flight at once; responses are matched strictly by id, so the Engine may
/// answer them in any order. A background task reads the inbound stream for
/// the whole life of the session.
///
/// Dropping the session closes it: the reader stops and every pending call
/// fails with [`QengineError::Connection`].
pub struct Session {
    shared: Arc<SessionShared>,
    sink: tokio::sync::Mutex<FrameSink>,
    call_timeout: Duration,
}

impl Session {
    /// Wrap a connected duplex. Must be called from within a tokio runtime.
    pub fn new(duplex: Duplex, endpoint: Endpoint, call_timeout: Duration) -> Self {
        let shared = Arc::new(SessionShared {
            number: NEXT_SESSION.fetch_add(1, Ordering::Relaxed),
            endpoint,
            next_id: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
            state: Mutex::new(SessionState::Connecting),
            last_used: Mutex::new(Instant::now()),
            reader: Mutex::new(None),
        });

        let reader = tokio::spawn(read_loop(shared.clone(), duplex.stream));
        *lock(&shared.reader) = Some(reader.abort_handle());
        {
            let mut state = lock(&shared.state);
            if *state == SessionState::Connecting {
                *state = SessionState::Open;
            }
        }

        Self {
            shared,
            sink: tokio::sync::Mutex::new(duplex.sink),
            call_timeout,
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.shared.endpoint
    }

    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    pub fn is_open(&self) -> bool {
        self.shared.is_live()
    }

    pub fn last_used(&self) -> Instant {
        *lock(&self.shared.last_used)
    }

    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    pub(crate) fn shared(&self) -> &Arc<SessionShared> {
        &self.shared
    }

    /// Send `method` to `handle` and wait for its response under the
    /// session's default call timeout.
    pub async fn call(&self, handle: Handle, method: &str, params: Value) -> Result<Value> {
        self.call_with_timeout(handle, method, params, self.call_timeout)
            .await
    }

    /// Send `method` to `handle` and wait at most `timeout` for the response.
    ///
    /// On timeout the id is retired: a response arriving later is discarded.
    pub async fn call_with_timeout(
        &self,
        handle: Handle,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value> {
        self.ensure_open()?;

        let id = self.shared.next_id.fetch_add(1, Ordering::SeqCst);
        let text = JsonCodec::encode_request(&Request::new(id, handle, method, params))?;

        let (reply, response) = oneshot::channel();
        lock(&self.shared.pending).insert(
            id,
            PendingCall {
                method: method.to_string(),
                reply,
            },
        );
        let _guard = PendingGuard {
            shared: &self.shared,
            id,
        };
        // The reader may have shut down between the check above and the insert.
        self.ensure_open()?;

        tracing::debug!(session = self.shared.number, id, handle, method, "Sending request");
        // Waiting for the sink and writing the frame count against the deadline.
        let exchange = async {
            self.sink.lock().await.send(text).await?;
            *lock(&self.shared.last_used) = Instant::now();
            match response.await {
                Ok(outcome) => outcome,
                Err(_) => Err(QengineError::Connection(
                    "session closed before the response arrived".into(),
                )),
            }
        };

        match tokio::time::timeout(timeout, exchange).await {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::debug!(session = self.shared.number, id, method, "Call timed out, retiring id");
                Err(QengineError::timeout(timeout))
            }
        }
    }

    /// Close the connection and fail any calls still waiting.
    pub async fn close(&self) {
        if self.state() == SessionState::Open {
            tracing::info!(session = self.shared.number, endpoint = %self.shared.endpoint, "Closing session");
        }
        self.shared.close("session closed");
        let _ = self.sink.lock().await.close().await;
    }

    fn ensure_open(&self) -> Result<()> {
        match self.state() {
            SessionState::Open => Ok(()),
            state => Err(QengineError::Connection(format!(
                "session {} is {:?}",
                self.shared.number, state
            ))),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shared.close("session dropped");
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("number", &self.shared.number)
            .field("endpoint", &self.shared.endpoint.to_string())
            .field("state", &self.state())
            .finish()
    }
}

async fn read_loop(shared: Arc<SessionShared>, mut stream: FrameStream) {
    let failure = loop {
        match stream.next().await {
            Some(Ok(text)) => shared.dispatch(&text),
            Some(Err(e)) => break Some(e),
            None => break None,
        }
    };

    let reason = match failure {
        Some(e) => {
            tracing::warn!(session = shared.number, error = %e, "Session read failed");
            shared.set_state(SessionState::Failed);
            format!("session dropped: {}", e)
        }
        None => {
            tracing::info!(session = shared.number, "Engine closed the session");
            shared.set_state(SessionState::Closed);
            "session dropped: connection closed by peer".to_string()
        }
    };
    shared.fail_pending(&reason);
}
