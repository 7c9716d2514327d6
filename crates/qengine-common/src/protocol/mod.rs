pub mod envelope;
pub mod error;
pub mod hypercube;
pub mod tables;


pub use envelope::{Frame, Handle, MethodName, Request, RequestId, RpcError, GLOBAL_HANDLE};
pub use error::{ErrorKind, QengineError, Result};
