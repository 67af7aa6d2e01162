use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::session::ServerSession;
use crate::subscriptions::SubscriptionRegistry;

/// Tracks every live session by ID and reaps entries reactively as sessions
/// close, so nothing external needs to poll for dead connections.
#[derive(Default)]
pub struct SessionManager {
    sessions: RwLock<HashMap<String, Arc<ServerSession>>>,
}

impl SessionManager {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registers `session` and spawns a task that removes it from the table
    /// the moment it closes. `subscriptions`, when given, has
    /// `remove_for_session` invoked with the session's ID at that point too,
    /// so a disconnecting client's subscriptions are reaped in the same
    /// reactive sweep as its table entry.
    pub fn add_session(
        self: &Arc<Self>,
        session: Arc<ServerSession>,
        subscriptions: Option<Arc<SubscriptionRegistry>>,
    ) {
        let id = session.id().to_string();
        self.sessions.write().insert(id.clone(), Arc::clone(&session));

        let manager = Arc::clone(self);
        tokio::spawn(async move {
            session.closed().await;
            manager.remove_session(&id);
            if let Some(subscriptions) = subscriptions {
                subscriptions.remove_for_session(&id);
            }
        });
    }

    pub fn remove_session(&self, id: &str) {
        self.sessions.write().remove(id);
    }

    pub fn get_session(&self, id: &str) -> Option<Arc<ServerSession>> {
        self.sessions.read().get(id).cloned()
    }

    pub fn session_ids(&self) -> Vec<String> {
        self.sessions.read().keys().cloned().collect()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }

    /// Closes every tracked session. Each session's own reaper task removes
    /// it from the table as it tears down.
    pub fn shutdown(&self) {
        let sessions: Vec<Arc<ServerSession>> = self.sessions.read().values().cloned().collect();
        for session in sessions {
            session.close();
        }
    }
}
