//! qengine Common Types and Transport
//!
//! Shared building blocks for talking to the Qlik Engine API:
//!
//! - **Protocol Layer**: JSON-RPC envelopes with Engine handles, typed
//!   hypercube and data-model structures, and the [`QengineError`] type
//! - **Transport Layer**: the text [`Duplex`](transport::Duplex) seam, the
//!   WebSocket connector and mutual-TLS configuration
//! - **Auth**: client certificates and the `X-Qlik-User` identity header
//! - **Config**: [`EngineConfig`](config::EngineConfig), read from `QLIK_*`
//!   environment variables or built in code
//!
//! # Wire Format
//!
//! One JSON envelope per WebSocket text frame:
//!
//! ```text
//! -> {"jsonrpc":"2.0","id":1,"handle":-1,"method":"OpenDoc","params":["<app-id>"]}
//! <- {"jsonrpc":"2.0","id":1,"result":{"qReturn":{"qHandle":1,"qType":"Doc"}}}
//! ```
//!
//! # Example
//!
//! ```
//! use qengine_common::{QengineError, Request, GLOBAL_HANDLE};
//! use serde_json::json;
//!
//! let request = Request::new(1, GLOBAL_HANDLE, "OpenDoc", json!(["app-id"]));
//! assert_eq!(request.handle, -1);
//!
//! let err = QengineError::validation("page must be >= 1");
//! assert_eq!(err.to_string(), "Validation error: page must be >= 1");
//! ```

pub mod auth;
pub mod config;
pub mod protocol;
pub mod transport;

pub use protocol::*;
