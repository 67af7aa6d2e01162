//! The reconnecting NanoRPC client runtime.
//!
//! [`ClientSession`] owns one live transport connection; [`ClientSupervisor`]
//! owns the session pointer across reconnects and exposes the client's
//! public operations (`ping`, `request`, `subscribe`, ...).

mod callback;
mod session;
mod supervisor;
mod transport;
mod typed;

pub use callback::{Callback, CallbackTable};
pub use session::{ClientSession, SessionTimeouts};
pub use supervisor::{ClientHooks, ClientSupervisor, ClientSupervisorConfig};
pub use transport::{ReconnectTransport, TcpReconnectTransport};
pub use typed::{get_response, subscribe};
