use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use nanorpc_core::{NanoRpcError, RequestIdCounter};
use nanorpc_hash::HashCache;
use nanorpc_wire::{request::PathOneof, FrameCodec, Request, RequestType, Response};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;

use crate::callback::{Callback, CallbackTable};

/// Per-session timeouts and queue sizing. Mirrors the durations recognized
/// by the supervisor's configuration surface.
#[derive(Clone, Debug)]
pub struct SessionTimeouts {
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub queue_size: usize,
}

impl Default for SessionTimeouts {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_secs(2),
            write_timeout: Duration::from_secs(2),
            queue_size: 64,
        }
    }
}

/// A live client connection: one writer task, one reader task, and one
/// dispatcher task, cooperating over channels and a shared callback table.
///
/// Bound 1-to-1 with a transport connection. When the transport ends (EOF,
/// decode error, write failure) all three tasks wind down and every
/// outstanding callback is invoked once with `None` (`NoResponse`).
pub struct ClientSession {
    outbound: mpsc::Sender<Request>,
    callbacks: Arc<CallbackTable>,
    counter: Arc<RequestIdCounter>,
    hash_cache: HashCache,
    always_hash_paths: bool,
    cancellation: CancellationToken,
    closed: Arc<AtomicBool>,
}

impl ClientSession {
    /// Spawns the writer/reader/dispatcher tasks over `stream` and returns
    /// the session handle. `stream` is split into independent read/write
    /// halves, matching the one-socket-two-directions shape of a live TCP
    /// connection.
    pub fn spawn<S>(
        stream: S,
        timeouts: SessionTimeouts,
        counter: Arc<RequestIdCounter>,
        hash_cache: HashCache,
        always_hash_paths: bool,
    ) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let (outbound_tx, outbound_rx) = mpsc::channel(timeouts.queue_size);
        let (dispatch_tx, dispatch_rx) = mpsc::channel(timeouts.queue_size);

        let callbacks = Arc::new(CallbackTable::new());
        let cancellation = CancellationToken::new();
        let closed = Arc::new(AtomicBool::new(false));

        tokio::spawn(writer_loop(
            write_half,
            outbound_rx,
            timeouts.write_timeout,
            cancellation.clone(),
        ));
        tokio::spawn(reader_loop(
            read_half,
            dispatch_tx,
            timeouts.read_timeout,
            cancellation.clone(),
        ));
        tokio::spawn(dispatcher_loop(
            dispatch_rx,
            Arc::clone(&callbacks),
            cancellation.clone(),
        ));
        tokio::spawn(drain_on_cancel(Arc::clone(&callbacks), cancellation.clone()));
        tokio::spawn(mark_closed_on_cancel(Arc::clone(&closed), cancellation.clone()));

        Self {
            outbound: outbound_tx,
            callbacks,
            counter,
            hash_cache,
            always_hash_paths,
            cancellation,
            closed,
        }
    }

    /// Sends `req`, assigning a request ID and registering `cb` per the
    /// client session's send contract:
    /// `PING` accepts an optional callback; `REQUEST`/`SUBSCRIBE` require
    /// one; any other request type is rejected as a configuration error.
    pub async fn send(&self, mut req: Request, cb: Option<Callback>) -> Result<i32, NanoRpcError> {
        let req_type = RequestType::from_i32(req.request_type).unwrap_or(RequestType::Unspecified);
        match req_type {
            RequestType::Ping => {}
            RequestType::Request | RequestType::Subscribe => {
                if cb.is_none() {
                    return Err(NanoRpcError::Configuration(format!(
                        "{req_type:?} requires a callback"
                    )));
                }
            }
            RequestType::Unspecified => {
                return Err(NanoRpcError::Configuration(
                    "unsupported request type".to_string(),
                ));
            }
        }

        if req.request_id < 0 {
            req.request_id = 0;
        }
        if req.request_id == 0 {
            loop {
                let candidate = self.counter.next_id();
                if !self.callbacks.contains(candidate) {
                    req.request_id = candidate;
                    break;
                }
            }
        }

        if self.always_hash_paths {
            if let Some(PathOneof::Path(path)) = &req.path_oneof {
                let hash = self.hash_cache.hash(path)?;
                req.path_oneof = Some(PathOneof::PathHash(hash));
            }
        }

        let request_id = req.request_id;
        if let Some(cb) = cb {
            self.callbacks.register(request_id, req_type, cb);
        }

        if self.outbound.send(req).await.is_err() {
            self.callbacks.remove(request_id);
            return Err(NanoRpcError::Termination);
        }
        Ok(request_id)
    }

    /// Fire-and-forget `PING`. Returns `false` if the outbound queue is
    /// already closed (the session has ended).
    pub async fn ping(&self) -> bool {
        let req = Request::ping(0);
        self.send(req, None).await.is_ok()
    }

    /// `true` once this session has torn down (writer, reader, or
    /// dispatcher exited).
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Resolves once the session has torn down.
    pub async fn closed(&self) {
        self.cancellation.cancelled().await;
    }

    /// Idempotently tears down the session: cancels the three tasks and
    /// drains the callback table.
    pub fn close(&self) {
        self.cancellation.cancel();
    }
}

async fn writer_loop<W>(
    mut write_half: W,
    mut outbound_rx: mpsc::Receiver<Request>,
    write_timeout: Duration,
    cancellation: CancellationToken,
) where
    W: AsyncWrite + Unpin,
{
    loop {
        let req = tokio::select! {
            _ = cancellation.cancelled() => break,
            req = outbound_rx.recv() => match req {
                Some(req) => req,
                None => break,
            },
        };

        let encoded = match nanorpc_wire::encode_frame(&req) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(error = %e, "failed to encode outbound request");
                continue;
            }
        };

        let write_result = tokio::time::timeout(write_timeout, write_half.write_all(&encoded)).await;
        match write_result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "client write failed, closing session");
                cancellation.cancel();
                break;
            }
            Err(_elapsed) => {
                tracing::warn!("client write timed out, closing session");
                cancellation.cancel();
                break;
            }
        }
    }
}

async fn reader_loop<R>(
    read_half: R,
    dispatch_tx: mpsc::Sender<Response>,
    read_timeout: Duration,
    cancellation: CancellationToken,
) where
    R: AsyncRead + Unpin,
{
    let mut framed = FramedRead::new(read_half, FrameCodec::<Response>::new());
    loop {
        let next = tokio::select! {
            _ = cancellation.cancelled() => break,
            next = tokio::time::timeout(read_timeout, framed.next()) => next,
        };

        match next {
            Ok(Some(Ok(resp))) => {
                if dispatch_tx.send(resp).await.is_err() {
                    break;
                }
            }
            Ok(Some(Err(e))) => {
                tracing::warn!(error = %e, "client read decode error, closing session");
                cancellation.cancel();
                break;
            }
            Ok(None) => {
                tracing::debug!("server closed connection");
                cancellation.cancel();
                break;
            }
            Err(_elapsed) => {
                tracing::warn!("client read timed out, closing session");
                cancellation.cancel();
                break;
            }
        }
    }
}

async fn dispatcher_loop(
    mut dispatch_rx: mpsc::Receiver<Response>,
    callbacks: Arc<CallbackTable>,
    cancellation: CancellationToken,
) {
    loop {
        let resp = tokio::select! {
            _ = cancellation.cancelled() => break,
            resp = dispatch_rx.recv() => match resp {
                Some(resp) => resp,
                None => break,
            },
        };

        match callbacks.pop(resp.request_id) {
            Some(cb) => (cb.lock())(Some(resp)),
            None => tracing::debug!(request_id = resp.request_id, "unmatched response"),
        }
    }
}

/// Drains the callback table exactly once, when the session's cancellation
/// token fires from any of the three tasks ending.
async fn drain_on_cancel(callbacks: Arc<CallbackTable>, cancellation: CancellationToken) {
    cancellation.cancelled().await;
    callbacks.drain();
}

async fn mark_closed_on_cancel(closed: Arc<AtomicBool>, cancellation: CancellationToken) {
    cancellation.cancelled().await;
    closed.store(true, Ordering::Release);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;
    use tokio::io::duplex;

    fn counter() -> Arc<RequestIdCounter> {
        Arc::new(RequestIdCounter::with_seed(1))
    }

    #[tokio::test]
    async fn ping_with_no_peer_response_eventually_drains_as_no_response() {
        let (client_side, _server_side) = duplex(4096);
        let session = ClientSession::spawn(
            client_side,
            SessionTimeouts {
                read_timeout: Duration::from_millis(50),
                write_timeout: Duration::from_millis(50),
                queue_size: 8,
            },
            counter(),
            HashCache::new(),
            false,
        );

        let result: Arc<StdMutex<Option<Option<Response>>>> = Arc::new(StdMutex::new(None));
        let result_clone = Arc::clone(&result);
        let req = Request::ping(0);
        session
            .send(
                req,
                Some(Box::new(move |resp| {
                    *result_clone.lock().unwrap() = Some(resp);
                })),
            )
            .await
            .unwrap();

        session.closed().await;
        assert_eq!(*result.lock().unwrap(), Some(None));
    }

    #[tokio::test]
    async fn request_without_callback_is_rejected() {
        let (client_side, _server_side) = duplex(4096);
        let session = ClientSession::spawn(
            client_side,
            SessionTimeouts::default(),
            counter(),
            HashCache::new(),
            false,
        );
        let req = Request {
            request_id: 0,
            request_type: RequestType::Request as i32,
            path_oneof: Some(PathOneof::Path("/a".into())),
            data: Vec::new(),
        };
        let err = session.send(req, None).await.unwrap_err();
        assert!(matches!(err, NanoRpcError::Configuration(_)));
    }

    #[tokio::test]
    async fn always_hash_paths_rewrites_string_path_before_send() {
        let (client_side, mut server_side) = duplex(4096);
        let session = ClientSession::spawn(
            client_side,
            SessionTimeouts::default(),
            counter(),
            HashCache::new(),
            true,
        );
        let req = Request {
            request_id: 0,
            request_type: RequestType::Request as i32,
            path_oneof: Some(PathOneof::Path("/api/temperature".into())),
            data: Vec::new(),
        };
        session
            .send(req, Some(Box::new(|_| {})))
            .await
            .unwrap();

        use tokio::io::AsyncReadExt;
        let mut buf = [0u8; 64];
        let n = server_side.read(&mut buf).await.unwrap();
        let (_advance, frame) = nanorpc_wire::split_frame(&buf[..n], false).unwrap();
        let (decoded, _consumed): (Request, usize) =
            nanorpc_wire::decode_message(frame.unwrap()).unwrap();
        assert!(matches!(decoded.path_oneof, Some(PathOneof::PathHash(_))));
    }
}
