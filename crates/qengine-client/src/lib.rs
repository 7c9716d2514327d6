//! Engine API sessions.
//!
//! - [`ConnectionManager`] opens a [`Session`], walking the ordered endpoint
//!   candidates until one accepts the mutual-TLS handshake.
//! - [`Session`] correlates pipelined requests with their responses by id.
//! - [`AppHandle`] / [`ObjectHandle`] wrap the Engine calls used to read
//!   data-model metadata and page through hypercubes.

pub mod connection;
pub mod engine;
pub mod session;

pub use connection::{endpoint_candidates, ConnectionManager, ENGINE_PATHS};
pub use engine::{AppHandle, FieldHandle, ObjectHandle};
pub use session::{Session, SessionState};
