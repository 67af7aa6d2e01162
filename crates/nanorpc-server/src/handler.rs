use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use nanorpc_core::NanoRpcError;
use nanorpc_hash::HashCache;
use nanorpc_wire::{Request, RequestType, Response, ResponseStatus};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::session::ServerSession;
use crate::subscriptions::SubscriptionRegistry;

/// A handler bound to one registered path.
///
/// Mirrors [`nanorpc_client::ReconnectTransport::dial`]'s manual future
/// boxing: there's no `async-trait` in this workspace, so trait methods
/// returning a future spell out the `Pin<Box<dyn Future<...>>>` by hand.
pub trait PathHandler: Send + Sync + 'static {
    fn handle<'a>(&'a self, ctx: RequestContext) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>>;
}

struct FnHandler<F>(F);

impl<F, Fut> PathHandler for FnHandler<F>
where
    F: Fn(RequestContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    fn handle<'a>(&'a self, ctx: RequestContext) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin((self.0)(ctx))
    }
}

/// Wraps a plain async closure as a [`PathHandler`], for handlers that don't
/// need to carry their own state.
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn PathHandler>
where
    F: Fn(RequestContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

/// The request passed to a [`PathHandler`], and the one way it can reply.
pub struct RequestContext {
    session: Arc<ServerSession>,
    request: Request,
    path: String,
    path_hash: u32,
}

impl RequestContext {
    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn path_hash(&self) -> u32 {
        self.path_hash
    }

    pub fn data(&self) -> &[u8] {
        &self.request.data
    }

    pub fn session(&self) -> &Arc<ServerSession> {
        &self.session
    }

    pub async fn send_ok(&self, data: Vec<u8>) -> Result<(), NanoRpcError> {
        self.session
            .send_response(Some(&self.request), Response::ok(self.request.request_id, data))
            .await
    }

    pub async fn send_error(
        &self,
        status: ResponseStatus,
        message: impl Into<String>,
    ) -> Result<(), NanoRpcError> {
        self.session
            .send_response(
                Some(&self.request),
                Response::error(self.request.request_id, status, message),
            )
            .await
    }

    pub async fn send_not_found(&self, message: impl Into<String>) -> Result<(), NanoRpcError> {
        self.send_error(ResponseStatus::NotFound, message).await
    }

    pub async fn send_unauthorized(&self, message: impl Into<String>) -> Result<(), NanoRpcError> {
        self.send_error(ResponseStatus::NotAuthorized, message).await
    }

    pub async fn send_internal_error(&self, message: impl Into<String>) -> Result<(), NanoRpcError> {
        self.send_error(ResponseStatus::InternalError, message).await
    }

    /// The wire's `ResponseStatus` has no dedicated `BAD_REQUEST` value, so
    /// malformed-request replies are sent as `INTERNAL_ERROR` with a
    /// message that says what was wrong with the request.
    pub async fn send_bad_request(&self, message: impl Into<String>) -> Result<(), NanoRpcError> {
        self.send_error(ResponseStatus::InternalError, message).await
    }

    pub async fn send_json<T: Serialize>(&self, value: &T) -> Result<(), NanoRpcError> {
        let data = serde_json::to_vec(value)
            .map_err(|e| NanoRpcError::Protocol(format!("json encode failed: {e}")))?;
        self.send_ok(data).await
    }

    pub async fn send_protobuf<M: prost::Message>(&self, message: &M) -> Result<(), NanoRpcError> {
        self.send_ok(message.encode_to_vec()).await
    }

    pub fn unmarshal_request_json<T: DeserializeOwned>(&self) -> Result<T, NanoRpcError> {
        serde_json::from_slice(&self.request.data)
            .map_err(|e| NanoRpcError::Protocol(format!("json decode failed: {e}")))
    }

    pub fn unmarshal_request_protobuf<M: prost::Message + Default>(&self) -> Result<M, NanoRpcError> {
        M::decode(self.request.data.as_slice())
            .map_err(|e| NanoRpcError::Protocol(format!("protobuf decode failed: {e}")))
    }
}

/// Resolves a request's path, looks up its handler, and dispatches.
///
/// Owns the path->handler table, the shared [`HashCache`] used to resolve
/// hashed paths, and the [`SubscriptionRegistry`] that `SUBSCRIBE` requests
/// register into.
pub struct MessageHandler {
    handlers: RwLock<HashMap<String, Arc<dyn PathHandler>>>,
    hash_cache: HashCache,
    subscriptions: Arc<SubscriptionRegistry>,
}

impl MessageHandler {
    pub fn new(hash_cache: HashCache) -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
            hash_cache,
            subscriptions: Arc::new(SubscriptionRegistry::new()),
        }
    }

    pub fn subscriptions(&self) -> &Arc<SubscriptionRegistry> {
        &self.subscriptions
    }

    pub fn hash_cache(&self) -> &HashCache {
        &self.hash_cache
    }

    /// Registers `handler` at `path`. Fails if a handler is already
    /// registered there, or if `path`'s FNV-1a hash collides with a
    /// different path already in the shared hash cache.
    pub fn register_handler(
        &self,
        path: impl Into<String>,
        handler: Arc<dyn PathHandler>,
    ) -> Result<(), NanoRpcError> {
        let path = path.into();
        let mut handlers = self.handlers.write();
        if handlers.contains_key(&path) {
            return Err(NanoRpcError::Configuration(format!(
                "handler already registered for {path:?}"
            )));
        }
        self.hash_cache.hash(&path)?;
        handlers.insert(path, handler);
        Ok(())
    }

    /// Removes the handler registered at `path`. Fails if none is
    /// registered.
    pub fn unregister_handler(&self, path: &str) -> Result<(), NanoRpcError> {
        let mut handlers = self.handlers.write();
        if handlers.remove(path).is_none() {
            return Err(NanoRpcError::Configuration(format!(
                "no handler registered for {path:?}"
            )));
        }
        Ok(())
    }

    /// Dispatches one incoming frame: `PING` -> `PONG`, `REQUEST` -> handler
    /// lookup and invocation (or unsubscribe, for the empty-data convention
    /// described below), `SUBSCRIBE` -> registry entry plus `OK`. Anything
    /// else is ignored.
    pub async fn handle_message(&self, session: Arc<ServerSession>, req: Request) {
        let request_type = RequestType::from_i32(req.request_type).unwrap_or(RequestType::Unspecified);
        match request_type {
            RequestType::Ping => {
                let _ = session.send_response(Some(&req), Response::pong(req.request_id)).await;
            }
            RequestType::Request => self.handle_request(session, req).await,
            RequestType::Subscribe => self.handle_subscribe(session, req).await,
            RequestType::Unspecified => {}
        }
    }

    async fn handle_request(&self, session: Arc<ServerSession>, req: Request) {
        let (path, path_hash) = match self.hash_cache.resolve(&req) {
            Ok(resolved) => resolved,
            Err(_collision) => {
                let _ = session
                    .send_response(
                        Some(&req),
                        Response::error(req.request_id, ResponseStatus::InternalError, "path hash collision"),
                    )
                    .await;
                return;
            }
        };

        if path.is_empty() {
            let _ = session
                .send_response(Some(&req), Response::error(req.request_id, ResponseStatus::NotFound, "unknown path"))
                .await;
            return;
        }

        // A REQUEST to the same path and request_id as a live SUBSCRIBE,
        // carrying no data, is the wire convention for unsubscribing: it
        // removes the registry entry instead of reaching a path handler.
        // There is no way to tell this frame apart from an ordinary
        // empty-payload REQUEST, so once data is empty the dispatcher
        // commits to the unsubscribe interpretation either way: a match
        // removes the entry and replies OK, a miss replies NOT_FOUND
        // (the spec's recommended behaviour — the reference implementation
        // replies OK unconditionally, which this workspace treats as a bug).
        if req.data.is_empty() {
            let status = if self
                .subscriptions
                .unsubscribe(session.id(), req.request_id, path_hash)
            {
                ResponseStatus::Ok
            } else {
                ResponseStatus::NotFound
            };
            let resp = if status == ResponseStatus::Ok {
                Response::ok(req.request_id, Vec::new())
            } else {
                Response::error(req.request_id, status, "no matching subscription")
            };
            let _ = session.send_response(Some(&req), resp).await;
            return;
        }

        let handler = self.handlers.read().get(&path).cloned();
        match handler {
            Some(handler) => {
                let ctx = RequestContext {
                    session,
                    request: req,
                    path,
                    path_hash,
                };
                handler.handle(ctx).await;
            }
            None => {
                let _ = session
                    .send_response(Some(&req), Response::error(req.request_id, ResponseStatus::NotFound, "unknown path"))
                    .await;
            }
        }
    }

    async fn handle_subscribe(&self, session: Arc<ServerSession>, req: Request) {
        let (path, path_hash) = match self.hash_cache.resolve(&req) {
            Ok(resolved) => resolved,
            Err(_collision) => {
                let _ = session
                    .send_response(
                        Some(&req),
                        Response::error(req.request_id, ResponseStatus::InternalError, "path hash collision"),
                    )
                    .await;
                return;
            }
        };

        if path.is_empty() {
            let _ = session
                .send_response(
                    Some(&req),
                    Response::error(req.request_id, ResponseStatus::InternalError, "unresolvable path hash"),
                )
                .await;
            return;
        }

        self.subscriptions.add(path_hash, &session, req.request_id, req.data.clone());
        let _ = session.send_response(Some(&req), Response::ok(req.request_id, Vec::new())).await;
    }
}
