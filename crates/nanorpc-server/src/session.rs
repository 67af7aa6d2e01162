use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use nanorpc_core::NanoRpcError;
use nanorpc_wire::{FrameCodec, Request, Response};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::handler::MessageHandler;

/// Read/write timeouts and outbound queue depth for a server session.
#[derive(Clone, Debug)]
pub struct ServerSessionTimeouts {
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub queue_size: usize,
}

impl Default for ServerSessionTimeouts {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_secs(10),
            write_timeout: Duration::from_secs(2),
            queue_size: 64,
        }
    }
}

/// A session bound to one accepted connection.
///
/// Session ID is `<uuid-v7>@<remote-addr>`: the UUID is time-ordered so
/// session IDs sort by creation order in logs.
///
/// The reader loop hands each incoming `Request` off to a spawned task so a
/// slow handler can't stall reading the next frame on the same connection;
/// the writer loop serializes every outbound `Response` (replies and
/// subscription `UPDATE`s alike) through one outbound queue.
pub struct ServerSession {
    id: String,
    remote_addr: SocketAddr,
    outbound: mpsc::Sender<Response>,
    cancellation: CancellationToken,
    closed: Arc<AtomicBool>,
}

impl ServerSession {
    /// Spawns the writer and reader tasks over `stream` and returns the
    /// session handle. Incoming requests are dispatched through `handler`.
    pub fn spawn<S>(
        stream: S,
        remote_addr: SocketAddr,
        timeouts: ServerSessionTimeouts,
        handler: Arc<MessageHandler>,
    ) -> Arc<Self>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let (outbound_tx, outbound_rx) = mpsc::channel(timeouts.queue_size);
        let cancellation = CancellationToken::new();
        let closed = Arc::new(AtomicBool::new(false));

        let session = Arc::new(Self {
            id: format!("{}@{}", Uuid::now_v7(), remote_addr),
            remote_addr,
            outbound: outbound_tx,
            cancellation: cancellation.clone(),
            closed: Arc::clone(&closed),
        });

        tokio::spawn(writer_loop(
            write_half,
            outbound_rx,
            timeouts.write_timeout,
            cancellation.clone(),
        ));
        tokio::spawn(reader_loop(
            read_half,
            Arc::clone(&session),
            handler,
            timeouts.read_timeout,
            cancellation.clone(),
        ));
        tokio::spawn(mark_closed_on_cancel(closed, cancellation));

        session
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    /// Encodes and enqueues `resp` for delivery. Missing envelope fields
    /// (`request_id`, when zero) are filled from `req`. Returns
    /// `Termination` if the session has already closed.
    pub async fn send_response(
        &self,
        req: Option<&Request>,
        mut resp: Response,
    ) -> Result<(), NanoRpcError> {
        if resp.request_id == 0 {
            if let Some(req) = req {
                resp.request_id = req.request_id;
            }
        }
        self.outbound
            .send(resp)
            .await
            .map_err(|_| NanoRpcError::Termination)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Resolves once the session has torn down.
    pub async fn closed(&self) {
        self.cancellation.cancelled().await;
    }

    /// Idempotently tears down the session's reader and writer tasks.
    pub fn close(&self) {
        self.cancellation.cancel();
    }
}

async fn writer_loop<W>(
    mut write_half: W,
    mut outbound_rx: mpsc::Receiver<Response>,
    write_timeout: Duration,
    cancellation: CancellationToken,
) where
    W: AsyncWrite + Unpin,
{
    loop {
        let resp = tokio::select! {
            _ = cancellation.cancelled() => break,
            resp = outbound_rx.recv() => match resp {
                Some(resp) => resp,
                None => break,
            },
        };

        let encoded = match nanorpc_wire::encode_frame(&resp) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(error = %e, "failed to encode outbound response");
                continue;
            }
        };

        match tokio::time::timeout(write_timeout, write_half.write_all(&encoded)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "server write failed, closing session");
                cancellation.cancel();
                break;
            }
            Err(_elapsed) => {
                tracing::warn!("server write timed out, closing session");
                cancellation.cancel();
                break;
            }
        }
    }
}

async fn reader_loop<R>(
    read_half: R,
    session: Arc<ServerSession>,
    handler: Arc<MessageHandler>,
    read_timeout: Duration,
    cancellation: CancellationToken,
) where
    R: AsyncRead + Unpin,
{
    let mut framed = FramedRead::new(read_half, FrameCodec::<Request>::new());
    loop {
        let next = tokio::select! {
            _ = cancellation.cancelled() => break,
            next = tokio::time::timeout(read_timeout, framed.next()) => next,
        };

        match next {
            Ok(Some(Ok(req))) => {
                let session = Arc::clone(&session);
                let handler = Arc::clone(&handler);
                tokio::spawn(async move {
                    handler.handle_message(session, req).await;
                });
            }
            Ok(Some(Err(e))) => {
                tracing::warn!(error = %e, session_id = session.id(), "decode error, closing session");
                cancellation.cancel();
                break;
            }
            Ok(None) => {
                tracing::debug!(session_id = session.id(), "client closed connection");
                cancellation.cancel();
                break;
            }
            Err(_elapsed) => {
                tracing::debug!(session_id = session.id(), "read idle timeout, closing session");
                cancellation.cancel();
                break;
            }
        }
    }
}

async fn mark_closed_on_cancel(closed: Arc<AtomicBool>, cancellation: CancellationToken) {
    cancellation.cancelled().await;
    closed.store(true, Ordering::Release);
}
