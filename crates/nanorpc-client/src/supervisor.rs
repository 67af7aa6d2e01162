use std::sync::Arc;
use std::time::Duration;

use nanorpc_core::{NanoRpcError, RequestIdCounter};
use nanorpc_hash::HashCache;
use nanorpc_wire::{request::PathOneof, Request, RequestType, Response};
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::callback::Callback;
use crate::session::{ClientSession, SessionTimeouts};
use crate::transport::ReconnectTransport;

/// Durations and switches recognized by the supervisor. Defaults match the
/// protocol's reference configuration.
#[derive(Clone)]
pub struct ClientSupervisorConfig {
    pub dial_timeout: Duration,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub idle_timeout: Duration,
    pub keep_alive: Duration,
    pub reconnect_delay: Duration,
    pub queue_size: usize,
    /// When true, outgoing REQUEST/SUBSCRIBE rewrite string paths to
    /// `path_hash` variants before send, populating the hash cache.
    pub always_hash_paths: bool,
    /// Shared hash cache; defaults to a fresh process-wide instance if not
    /// set explicitly.
    pub hash_cache: Option<HashCache>,
}

impl Default for ClientSupervisorConfig {
    fn default() -> Self {
        Self {
            dial_timeout: Duration::from_secs(2),
            read_timeout: Duration::from_secs(2),
            write_timeout: Duration::from_secs(2),
            idle_timeout: Duration::from_secs(10),
            keep_alive: Duration::from_secs(5),
            reconnect_delay: Duration::from_secs(5),
            queue_size: 64,
            always_hash_paths: false,
            hash_cache: None,
        }
    }
}

/// User hooks invoked around the connection lifecycle. `on_connect`
/// returning an error terminates the freshly spawned session and triggers
/// reconnect scheduling, same as any other disconnect.
#[derive(Default)]
pub struct ClientHooks {
    pub on_connect: Option<Box<dyn Fn() -> Result<(), NanoRpcError> + Send + Sync>>,
    pub on_disconnect: Option<Box<dyn Fn() + Send + Sync>>,
    pub on_error: Option<Box<dyn Fn(&NanoRpcError) + Send + Sync>>,
}

/// Owns the current session across reconnects and exposes the client's
/// public operations. Dials through a [`ReconnectTransport`], redialing
/// after `reconnect_delay` whenever the active session ends.
pub struct ClientSupervisor<T: ReconnectTransport> {
    transport: T,
    config: ClientSupervisorConfig,
    hooks: ClientHooks,
    session: Mutex<Option<Arc<ClientSession>>>,
    counter: Arc<RequestIdCounter>,
    hash_cache: HashCache,
    shutdown: CancellationToken,
}

impl<T: ReconnectTransport> ClientSupervisor<T> {
    pub fn new(transport: T, config: ClientSupervisorConfig, hooks: ClientHooks) -> Arc<Self> {
        let hash_cache = config.hash_cache.clone().unwrap_or_default();
        Arc::new(Self {
            transport,
            config,
            hooks,
            session: Mutex::new(None),
            counter: Arc::new(RequestIdCounter::new()),
            hash_cache,
            shutdown: CancellationToken::new(),
        })
    }

    /// Spawns the background connect/reconnect loop. The loop keeps
    /// redialing until [`ClientSupervisor::shutdown`] is called.
    pub fn start(self: &Arc<Self>) {
        tokio::spawn(Arc::clone(self).run());
    }

    async fn run(self: Arc<Self>) {
        loop {
            if self.shutdown.is_cancelled() {
                break;
            }

            match self.transport.dial(self.config.dial_timeout).await {
                Ok(conn) => {
                    let session = Arc::new(ClientSession::spawn(
                        conn,
                        SessionTimeouts {
                            read_timeout: self.config.read_timeout,
                            write_timeout: self.config.write_timeout,
                            queue_size: self.config.queue_size,
                        },
                        Arc::clone(&self.counter),
                        self.hash_cache.clone(),
                        self.config.always_hash_paths,
                    ));

                    if self.attach_session(Arc::clone(&session)).is_err() {
                        tracing::error!("supervisor already had an attached session");
                        session.close();
                    } else {
                        if let Some(on_connect) = &self.hooks.on_connect {
                            if let Err(e) = on_connect() {
                                tracing::warn!(error = %e, "on_connect hook failed, closing session");
                                session.close();
                            }
                        }
                        session.closed().await;
                        self.detach_session();
                        if let Some(on_disconnect) = &self.hooks.on_disconnect {
                            on_disconnect();
                        }
                    }
                }
                Err(e) => {
                    if let Some(on_error) = &self.hooks.on_error {
                        on_error(&e);
                    }
                }
            }

            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.config.reconnect_delay) => {}
            }
        }
    }

    fn attach_session(&self, session: Arc<ClientSession>) -> Result<(), NanoRpcError> {
        let mut current = self.session.lock();
        if current.is_some() {
            return Err(NanoRpcError::Configuration(
                "a session is already attached".to_string(),
            ));
        }
        *current = Some(session);
        Ok(())
    }

    fn detach_session(&self) {
        *self.session.lock() = None;
    }

    /// Stops the reconnect loop and tears down the current session, if any.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        if let Some(session) = self.session.lock().take() {
            session.close();
        }
    }

    /// The current session, or `Transport` ("not connected") if no
    /// connection is attached.
    pub fn get_session(&self) -> Result<Arc<ClientSession>, NanoRpcError> {
        self.session
            .lock()
            .clone()
            .ok_or_else(|| NanoRpcError::Transport("not connected".to_string()))
    }

    /// Fire-and-forget `PING`. Returns `false` if not connected.
    pub async fn ping(&self) -> bool {
        match self.get_session() {
            Ok(session) => session.ping().await,
            Err(_) => false,
        }
    }

    /// Sends a `PING` with a callback wired to the returned channel. The
    /// channel resolves to `Some(response)` on `PONG`, or `None` if the
    /// session ends before a reply arrives.
    pub async fn pong(&self) -> oneshot::Receiver<Option<Response>> {
        let (tx, rx) = oneshot::channel();
        match self.get_session() {
            Ok(session) => {
                // `oneshot::Sender::send` consumes itself, so it's boxed in
                // a `Mutex<Option<_>>` to fit the `FnMut` callback shape;
                // `.take()` leaves later (impossible, for PING) invocations
                // a no-op instead of panicking.
                //
                // If `send` fails to enqueue, the callback is dropped
                // without ever running, and `rx` observes a closed sender —
                // the caller sees that as the session-end sentinel too.
                let tx = Mutex::new(Some(tx));
                let req = Request::ping(0);
                let _ = session
                    .send(
                        req,
                        Some(Box::new(move |resp| {
                            if let Some(tx) = tx.lock().take() {
                                let _ = tx.send(resp);
                            }
                        })),
                    )
                    .await;
            }
            Err(_) => {
                let _ = tx.send(None);
            }
        }
        rx
    }

    /// Sends a `REQUEST` to a string path.
    pub async fn request(
        &self,
        path: impl Into<String>,
        data: Vec<u8>,
        cb: Callback,
    ) -> Result<i32, NanoRpcError> {
        self.send_request(Some(PathOneof::Path(path.into())), data, cb)
            .await
    }

    /// Sends a `REQUEST` directly by path hash, bypassing string
    /// resolution entirely.
    pub async fn request_by_hash(
        &self,
        path_hash: u32,
        data: Vec<u8>,
        cb: Callback,
    ) -> Result<i32, NanoRpcError> {
        self.send_request(Some(PathOneof::PathHash(path_hash)), data, cb)
            .await
    }

    /// Sends a `REQUEST` to a string path, but forces the wire frame to
    /// carry `path_hash` regardless of `always_hash_paths`.
    pub async fn request_with_hash(
        &self,
        path: &str,
        data: Vec<u8>,
        cb: Callback,
    ) -> Result<i32, NanoRpcError> {
        let hash = self.hash_cache.hash(path)?;
        self.send_request(Some(PathOneof::PathHash(hash)), data, cb)
            .await
    }

    async fn send_request(
        &self,
        path_oneof: Option<PathOneof>,
        data: Vec<u8>,
        cb: Callback,
    ) -> Result<i32, NanoRpcError> {
        let session = self.get_session()?;
        let req = Request {
            request_id: 0,
            request_type: RequestType::Request as i32,
            path_oneof,
            data,
        };
        session.send(req, Some(cb)).await
    }

    /// Installs a subscription on a string path.
    pub async fn subscribe(
        &self,
        path: impl Into<String>,
        data: Vec<u8>,
        cb: Callback,
    ) -> Result<i32, NanoRpcError> {
        self.send_subscribe(Some(PathOneof::Path(path.into())), data, cb)
            .await
    }

    /// Installs a subscription directly by path hash.
    pub async fn subscribe_by_hash(
        &self,
        path_hash: u32,
        data: Vec<u8>,
        cb: Callback,
    ) -> Result<i32, NanoRpcError> {
        self.send_subscribe(Some(PathOneof::PathHash(path_hash)), data, cb)
            .await
    }

    async fn send_subscribe(
        &self,
        path_oneof: Option<PathOneof>,
        data: Vec<u8>,
        cb: Callback,
    ) -> Result<i32, NanoRpcError> {
        let session = self.get_session()?;
        let req = Request {
            request_id: 0,
            request_type: RequestType::Subscribe as i32,
            path_oneof,
            data,
        };
        session.send(req, Some(cb)).await
    }

    /// Unsubscribes from a previously installed subscription by sending a
    /// `REQUEST` to the same path with the same `request_id` and empty
    /// data, per the protocol's unsubscribe convention.
    pub async fn unsubscribe(
        &self,
        path: impl Into<String>,
        request_id: i32,
        cb: Callback,
    ) -> Result<i32, NanoRpcError> {
        let session = self.get_session()?;
        let req = Request {
            request_id,
            request_type: RequestType::Request as i32,
            path_oneof: Some(PathOneof::Path(path.into())),
            data: Vec::new(),
        };
        session.send(req, Some(cb)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn not_connected_operations_fail_with_transport_error() {
        let transport = crate::transport::TcpReconnectTransport::new("127.0.0.1:1").unwrap();
        let supervisor =
            ClientSupervisor::new(transport, ClientSupervisorConfig::default(), ClientHooks::default());

        assert!(!supervisor.ping().await);
        let err = supervisor
            .request("/a", Vec::new(), Box::new(|_| {}))
            .await
            .unwrap_err();
        assert!(matches!(err, NanoRpcError::Transport(_)));
    }

    #[tokio::test]
    async fn pong_without_a_session_resolves_to_none() {
        let transport = crate::transport::TcpReconnectTransport::new("127.0.0.1:1").unwrap();
        let supervisor =
            ClientSupervisor::new(transport, ClientSupervisorConfig::default(), ClientHooks::default());
        let rx = supervisor.pong().await;
        assert_eq!(rx.await.unwrap(), None);
    }
}
