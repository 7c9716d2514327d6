use serde_json::{json, Value};

use crate::protocol::error::Result;
use crate::protocol::{Frame, Request, RequestId, RpcError};

/// JSON text codec for Engine envelopes.
///
/// Every WebSocket text frame carries exactly one envelope, so there is no
/// length prefix or framing beyond what the transport provides.
///
/// # Example
///
/// ```
/// use qengine_common::transport::JsonCodec;
/// use qengine_common::protocol::{Frame, Request};
/// use serde_json::json;
///
/// let request = Request::new(1, -1, "OpenDoc", json!(["app-id"]));
/// let text = JsonCodec::encode_request(&request).unwrap();
/// assert!(text.contains("\"OpenDoc\""));
///
/// let frame = JsonCodec::decode_frame(r#"{"jsonrpc":"2.0","id":1,"result":{}}"#);
/// assert!(matches!(frame, Frame::Response { id: 1, .. }));
/// ```
pub struct JsonCodec;

impl JsonCodec {
    pub fn encode_request(request: &Request) -> Result<String> {
        Ok(serde_json::to_string(request)?)
    }

    pub fn decode_request(text: &str) -> Result<Request> {
        Ok(serde_json::from_str(text)?)
    }

    /// Encode a success response. Used by in-process Engine doubles.
    pub fn encode_result(id: RequestId, result: &Value) -> Result<String> {
        Ok(serde_json::to_string(&json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": result,
        }))?)
    }

    /// Encode an error response. Used by in-process Engine doubles.
    pub fn encode_error(id: RequestId, error: &RpcError) -> Result<String> {
        Ok(serde_json::to_string(&json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": error,
        }))?)
    }

    /// Classify one inbound text frame.
    ///
    /// Never fails: anything that is not a well-formed response or
    /// notification comes back as [`Frame::Malformed`] so the caller can
    /// decide whether a pending call should see it.
    pub fn decode_frame(text: &str) -> Frame {
        let value: Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(e) => {
                return Frame::Malformed {
                    id: None,
                    reason: format!("invalid JSON: {}", e),
                }
            }
        };

        let Some(object) = value.as_object() else {
            return Frame::Malformed {
                id: None,
                reason: "envelope is not a JSON object".into(),
            };
        };

        let id = match object.get("id") {
            None | Some(Value::Null) => {
                return match object.get("method").and_then(Value::as_str) {
                    Some(method) => Frame::Notification {
                        method: method.to_string(),
                    },
                    None => Frame::Malformed {
                        id: None,
                        reason: "envelope has neither id nor method".into(),
                    },
                };
            }
            Some(raw) => match raw.as_u64() {
                Some(id) => id,
                None => {
                    return Frame::Malformed {
                        id: None,
                        reason: format!("unusable id {}", raw),
                    }
                }
            },
        };

        if let Some(error) = object.get("error").filter(|e| !e.is_null()) {
            return match serde_json::from_value::<RpcError>(error.clone()) {
                Ok(error) => Frame::Response {
                    id,
                    outcome: Err(error),
                },
                Err(e) => Frame::Malformed {
                    id: Some(id),
                    reason: format!("invalid error object: {}", e),
                },
            };
        }

        match object.get("result") {
            Some(result) => Frame::Response {
                id,
                outcome: Ok(result.clone()),
            },
            None => Frame::Malformed {
                id: Some(id),
                reason: "response has neither result nor error".into(),
            },
        }
    }
}
