use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;

use nanorpc_core::NanoRpcError;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

use crate::handler::MessageHandler;
use crate::manager::SessionManager;
use crate::session::{ServerSession, ServerSessionTimeouts};

/// An acceptor of inbound connections.
///
/// Mirrors [`nanorpc_client::ReconnectTransport`]'s manual future boxing for
/// the same reason: no `async-trait` dependency in this workspace.
pub trait Listener: Send + Sync {
    type Conn: AsyncRead + AsyncWrite + Send + 'static;

    fn accept(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<(Self::Conn, SocketAddr), NanoRpcError>> + Send + '_>>;
}

/// A [`Listener`] backed by a bound TCP socket.
pub struct TcpListener {
    inner: tokio::net::TcpListener,
}

impl TcpListener {
    pub async fn bind(addr: impl Into<String>) -> Result<Self, NanoRpcError> {
        let addr = addr.into();
        let inner = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| NanoRpcError::Transport(format!("bind {addr} failed: {e}")))?;
        Ok(Self { inner })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, NanoRpcError> {
        self.inner
            .local_addr()
            .map_err(|e| NanoRpcError::Transport(e.to_string()))
    }
}

impl Listener for TcpListener {
    type Conn = TcpStream;

    fn accept(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<(Self::Conn, SocketAddr), NanoRpcError>> + Send + '_>> {
        Box::pin(async move {
            self.inner
                .accept()
                .await
                .map_err(|e| NanoRpcError::Transport(format!("accept failed: {e}")))
        })
    }
}

/// Accepts connections from `listener` until `shutdown` fires, spawning a
/// [`ServerSession`] per connection and registering it with `manager`.
///
/// A failed single `accept()` is logged and retried; the loop only exits on
/// cancellation.
pub async fn serve<L: Listener + 'static>(
    listener: L,
    manager: Arc<SessionManager>,
    handler: Arc<MessageHandler>,
    timeouts: ServerSessionTimeouts,
    shutdown: CancellationToken,
) {
    loop {
        let accepted = tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((conn, remote_addr)) => {
                let session = ServerSession::spawn(conn, remote_addr, timeouts.clone(), Arc::clone(&handler));
                manager.add_session(session, Some(Arc::clone(handler.subscriptions())));
            }
            Err(e) => {
                tracing::warn!(error = %e, "accept failed");
            }
        }
    }
}
