//! Engine API Envelopes
//!
//! The Engine speaks JSON-RPC 2.0 with one extension: every request names the
//! `handle` of the object it targets (`-1` for the global object).
//!
//! - Request: `{"jsonrpc": "2.0", "id": 7, "handle": 1, "method": "GetLayout", "params": []}`
//! - Response: `{"jsonrpc": "2.0", "id": 7, "result": {...}}`
//! - Error: `{"jsonrpc": "2.0", "id": 7, "error": {"code": 1002, "message": "...", "parameter": "..."}}`
//! - Notification: `{"jsonrpc": "2.0", "method": "OnConnected", "params": {...}}`

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::QengineError;

pub type RequestId = u64;
pub type Handle = i64;
pub type MethodName = String;

/// Handle of the Engine's global object.
pub const GLOBAL_HANDLE: Handle = -1;

/// Outgoing request envelope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Request {
    pub jsonrpc: String,
    pub id: RequestId,
    pub handle: Handle,
    pub method: MethodName,
    pub params: Value,
}

impl Request {
    pub fn new(id: RequestId, handle: Handle, method: impl Into<String>, params: Value) -> Self {
        Request {
            jsonrpc: "2.0".into(),
            id,
            handle,
            method: method.into(),
            params,
        }
    }
}

/// Error object carried by a failed response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameter: Option<String>,
}

impl From<RpcError> for QengineError {
    fn from(err: RpcError) -> Self {
        QengineError::Protocol {
            code: err.code,
            message: err.message,
            parameter: err.parameter,
        }
    }
}

/// One decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// A reply to a request we sent.
    Response {
        id: RequestId,
        outcome: std::result::Result<Value, RpcError>,
    },
    /// Server push (`OnConnected`, `OnChanged`, ...). Never correlated.
    Notification { method: String },
    /// Could not be interpreted. `id` is set when the frame named one.
    Malformed {
        id: Option<RequestId>,
        reason: String,
    },
}

/// The app is already open in this session
pub const APP_ALREADY_OPEN: i64 = 1002;
