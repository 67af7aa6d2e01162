use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Instant;

use nanorpc_core::NanoRpcError;
use nanorpc_hash::HashCache;
use nanorpc_wire::Response;
use parking_lot::RwLock;

use crate::session::ServerSession;

/// One live `SUBSCRIBE` registration.
///
/// `session` is a weak back-reference: it exists so `publish_by_hash` can
/// reach the session to deliver an `UPDATE` without keeping the session
/// alive past its own lifetime. A dead weak entry is pruned the next time
/// its bucket is touched rather than proactively reaped.
struct ActiveSubscription {
    session_id: String,
    session: Weak<ServerSession>,
    request_id: i32,
    #[allow(dead_code)]
    created_at: Instant,
    #[allow(dead_code)]
    filter: Vec<u8>,
}

/// Subscriptions keyed by the subscribed path's FNV-1a hash.
#[derive(Default)]
pub struct SubscriptionRegistry {
    buckets: RwLock<HashMap<u32, Vec<ActiveSubscription>>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new subscription under `path_hash`.
    pub fn add(&self, path_hash: u32, session: &Arc<ServerSession>, request_id: i32, filter: Vec<u8>) {
        self.buckets.write().entry(path_hash).or_default().push(ActiveSubscription {
            session_id: session.id().to_string(),
            session: Arc::downgrade(session),
            request_id,
            created_at: Instant::now(),
            filter,
        });
    }

    /// Removes the single subscription matching `session_id`, `request_id`,
    /// and `path_hash`. Returns whether an entry was removed. Drops the
    /// bucket entirely if it becomes empty.
    pub fn unsubscribe(&self, session_id: &str, request_id: i32, path_hash: u32) -> bool {
        let mut buckets = self.buckets.write();
        let Some(entries) = buckets.get_mut(&path_hash) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|s| !(s.session_id == session_id && s.request_id == request_id));
        let removed = entries.len() != before;
        if entries.is_empty() {
            buckets.remove(&path_hash);
        }
        removed
    }

    /// Drops every subscription belonging to `session_id`, e.g. on session
    /// teardown.
    pub fn remove_for_session(&self, session_id: &str) {
        let mut buckets = self.buckets.write();
        buckets.retain(|_, entries| {
            entries.retain(|s| s.session_id != session_id);
            !entries.is_empty()
        });
    }

    /// Delivers `data` as an `UPDATE` to every live subscriber of
    /// `path_hash`. Entries whose session has already dropped are skipped
    /// (lazily pruned rather than actively reaped). Errors are logged
    /// per-subscriber; the first one encountered becomes the return value.
    pub async fn publish_by_hash(&self, path_hash: u32, data: Vec<u8>) -> Result<(), NanoRpcError> {
        let targets: Vec<(Weak<ServerSession>, i32)> = {
            let buckets = self.buckets.read();
            match buckets.get(&path_hash) {
                Some(entries) => entries.iter().map(|s| (s.session.clone(), s.request_id)).collect(),
                None => return Ok(()),
            }
        };

        let mut first_err = None;
        for (weak, request_id) in targets {
            let Some(session) = weak.upgrade() else {
                continue;
            };
            let message = Response::update(request_id, data.clone());
            if let Err(e) = session.send_response(None, message).await {
                tracing::warn!(error = %e, session_id = session.id(), "failed to deliver subscription update");
                if first_err.is_none() {
                    first_err = Some(e);
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Like [`publish_by_hash`](Self::publish_by_hash), but resolves `path`
    /// to a hash through `hash_cache` first.
    pub async fn publish(
        &self,
        path: &str,
        data: Vec<u8>,
        hash_cache: &HashCache,
    ) -> Result<(), NanoRpcError> {
        let hash = hash_cache.hash(path)?;
        self.publish_by_hash(hash, data).await
    }
}
