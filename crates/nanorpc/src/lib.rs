//! NanoRPC: a length-delimited, Protocol-Buffers RPC protocol for trusted,
//! low-bandwidth links (serial lines, local TCP) between embedded devices
//! and a companion host.
//!
//! This crate is a thin facade over the five crates that make up the
//! protocol core:
//!
//! - [`nanorpc_wire`] — the length-delimited wire codec (`Request`/
//!   `Response` framing, varint length prefix).
//! - [`nanorpc_hash`] — the FNV-1a 32-bit path hash cache shared by client
//!   and server.
//! - [`nanorpc_core`] — the request-ID counter and the unified
//!   [`nanorpc_core::NanoRpcError`] taxonomy.
//! - [`nanorpc_client`] — the reconnecting client runtime.
//! - [`nanorpc_server`] — the server runtime (session manager, handler
//!   dispatch, subscription fan-out).
//!
//! Most applications only need [`prelude`].

pub use nanorpc_client;
pub use nanorpc_core;
pub use nanorpc_hash;
pub use nanorpc_server;
pub use nanorpc_wire;

/// The commonly used types from every layer, re-exported for a single
/// `use nanorpc::prelude::*;`.
pub mod prelude {
    pub use nanorpc_client::{
        Callback, ClientHooks, ClientSession, ClientSupervisor, ClientSupervisorConfig,
        ReconnectTransport, SessionTimeouts, TcpReconnectTransport,
    };
    pub use nanorpc_core::{NanoRpcError, RequestIdCounter};
    pub use nanorpc_hash::{fnv1a_32, HashCache, HashError};
    pub use nanorpc_server::{
        handler_fn, serve, Listener, MessageHandler, PathHandler, RequestContext, ServerSession,
        ServerSessionTimeouts, SessionManager, SubscriptionRegistry, TcpListener,
    };
    pub use nanorpc_wire::{
        request, FrameCodec, Request, RequestType, Response, ResponseStatus, ResponseType,
        WireError,
    };
}
