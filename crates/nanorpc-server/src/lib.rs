//! The NanoRPC server runtime.
//!
//! [`ServerSession`] owns one accepted connection; [`SessionManager`] tracks
//! every live session by ID; [`MessageHandler`] resolves paths (hash or
//! string) and dispatches to registered [`PathHandler`]s; [`SubscriptionRegistry`]
//! fans `UPDATE`s out to `SUBSCRIBE`d sessions.

mod handler;
mod listener;
mod manager;
mod session;
mod subscriptions;

pub use handler::{handler_fn, MessageHandler, PathHandler, RequestContext};
pub use listener::{serve, Listener, TcpListener};
pub use manager::SessionManager;
pub use session::{ServerSession, ServerSessionTimeouts};
pub use subscriptions::SubscriptionRegistry;
