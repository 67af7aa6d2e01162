use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use nanorpc_core::NanoRpcError;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

/// Abstracts dialing a fresh connection so the supervisor can redial after
/// a session ends, without depending on TCP specifically.
pub trait ReconnectTransport: Send + Sync + 'static {
    /// The connection type handed to a freshly spawned `ClientSession`.
    type Conn: AsyncRead + AsyncWrite + Send + 'static;

    /// Dials a new connection, bounded by `dial_timeout`.
    fn dial(
        &self,
        dial_timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<Self::Conn, NanoRpcError>> + Send + '_>>;
}

/// Dials `host:port` over TCP. `remote` must include a port (`Invalid`
/// configuration error if missing or zero); IPv6 addresses must be
/// bracketed, matching `std::net::SocketAddr`'s string form.
pub struct TcpReconnectTransport {
    remote: String,
}

impl TcpReconnectTransport {
    pub fn new(remote: impl Into<String>) -> Result<Self, NanoRpcError> {
        let remote = remote.into();
        let port_present = remote
            .rsplit_once(':')
            .map(|(_, port)| !port.is_empty() && port != "0")
            .unwrap_or(false);
        if !port_present {
            return Err(NanoRpcError::Configuration(format!(
                "remote address {remote:?} is missing a non-zero port"
            )));
        }
        Ok(Self { remote })
    }
}

impl ReconnectTransport for TcpReconnectTransport {
    type Conn = TcpStream;

    fn dial(
        &self,
        dial_timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<Self::Conn, NanoRpcError>> + Send + '_>> {
        Box::pin(async move {
            match tokio::time::timeout(dial_timeout, TcpStream::connect(&self.remote)).await {
                Ok(Ok(stream)) => Ok(stream),
                Ok(Err(e)) => Err(NanoRpcError::Transport(format!(
                    "failed to dial {}: {e}",
                    self.remote
                ))),
                Err(_elapsed) => Err(NanoRpcError::Transport(format!(
                    "dialing {} timed out after {:?}",
                    self.remote, dial_timeout
                ))),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_port_is_a_configuration_error() {
        let err = TcpReconnectTransport::new("localhost").unwrap_err();
        assert!(matches!(err, NanoRpcError::Configuration(_)));
    }

    #[test]
    fn zero_port_is_a_configuration_error() {
        let err = TcpReconnectTransport::new("localhost:0").unwrap_err();
        assert!(matches!(err, NanoRpcError::Configuration(_)));
    }

    #[test]
    fn bracketed_ipv6_with_port_is_accepted() {
        assert!(TcpReconnectTransport::new("[::1]:9000").is_ok());
    }

    #[tokio::test]
    async fn dial_failure_surfaces_as_transport_error() {
        let transport = TcpReconnectTransport::new("127.0.0.1:1").unwrap();
        let err = transport
            .dial(Duration::from_millis(200))
            .await
            .unwrap_err();
        assert!(matches!(err, NanoRpcError::Transport(_)));
    }
}
