//! Shared pieces of the NanoRPC client and server runtimes: the
//! request-ID counter and the unified `NanoRpcError` taxonomy.

mod error;
mod request_id;

pub use error::NanoRpcError;
pub use request_id::RequestIdCounter;
