use std::collections::HashMap;
use std::sync::Arc;

use nanorpc_wire::{RequestType, Response};
use parking_lot::Mutex;

/// A response callback. Invoked with `Some(response)` on a matching reply,
/// or `None` when the owning session tears down with this callback still
/// outstanding (the caller sees this as `NoResponse`).
pub type Callback = Box<dyn FnMut(Option<Response>) + Send + 'static>;

struct Entry {
    request_type: RequestType,
    callback: Arc<Mutex<Callback>>,
}

/// Request-ID keyed table of outstanding callbacks, shared by a session's
/// writer (on `register`) and dispatcher (on `pop`) tasks.
///
/// A single exclusion region guards the whole table; callback bodies run
/// with the table lock released (see [`CallbackTable::pop`]), so a slow
/// callback never blocks registration of new requests.
#[derive(Default)]
pub struct CallbackTable {
    entries: Mutex<HashMap<i32, Entry>>,
}

impl CallbackTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a callback for `request_id`. Called before enqueueing the
    /// request so a fast reply can never arrive before the entry exists.
    pub fn register(&self, request_id: i32, request_type: RequestType, callback: Callback) {
        self.entries.lock().insert(
            request_id,
            Entry {
                request_type,
                callback: Arc::new(Mutex::new(callback)),
            },
        );
    }

    /// `true` if a callback is currently registered for `request_id`, used
    /// by ID assignment to avoid handing out a colliding in-flight ID.
    pub fn contains(&self, request_id: i32) -> bool {
        self.entries.lock().contains_key(&request_id)
    }

    /// Locates the callback for `request_id`. Entries for any request type
    /// other than `SUBSCRIBE` are removed on pop; `SUBSCRIBE` callbacks stay
    /// installed so they can fire again on the next `UPDATE`.
    pub fn pop(&self, request_id: i32) -> Option<Arc<Mutex<Callback>>> {
        let mut entries = self.entries.lock();
        let entry = entries.get(&request_id)?;
        let callback = Arc::clone(&entry.callback);
        if entry.request_type != RequestType::Subscribe {
            entries.remove(&request_id);
        }
        Some(callback)
    }

    /// Removes a `SUBSCRIBE` callback by request ID (used by client-side
    /// unsubscribe). Returns `true` if an entry was removed.
    pub fn remove(&self, request_id: i32) -> bool {
        self.entries.lock().remove(&request_id).is_some()
    }

    /// Invokes every outstanding callback with `None` (`NoResponse`), then
    /// clears the table. Called once on session teardown.
    pub fn drain(&self) {
        let drained: Vec<Arc<Mutex<Callback>>> = {
            let mut entries = self.entries.lock();
            let callbacks = entries.values().map(|e| Arc::clone(&e.callback)).collect();
            entries.clear();
            callbacks
        };
        for callback in drained {
            (callback.lock())(None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn response(request_id: i32) -> Response {
        Response {
            request_id,
            response_type: nanorpc_wire::ResponseType::Response as i32,
            response_status: nanorpc_wire::ResponseStatus::Ok as i32,
            response_message: String::new(),
            data: Vec::new(),
        }
    }

    #[test]
    fn non_subscribe_callback_removed_after_pop() {
        let table = CallbackTable::new();
        table.register(1, RequestType::Request, Box::new(|_| {}));
        assert!(table.contains(1));
        assert!(table.pop(1).is_some());
        assert!(!table.contains(1));
        assert!(table.pop(1).is_none());
    }

    #[test]
    fn subscribe_callback_survives_repeated_pops() {
        let table = CallbackTable::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);
        table.register(
            1,
            RequestType::Subscribe,
            Box::new(move |_| {
                calls_clone.fetch_add(1, Ordering::SeqCst);
            }),
        );

        for _ in 0..3 {
            let cb = table.pop(1).unwrap();
            (cb.lock())(Some(response(1)));
        }

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(table.contains(1));
    }

    #[test]
    fn remove_deletes_a_subscribe_entry() {
        let table = CallbackTable::new();
        table.register(1, RequestType::Subscribe, Box::new(|_| {}));
        assert!(table.remove(1));
        assert!(!table.contains(1));
        assert!(!table.remove(1));
    }

    #[test]
    fn drain_invokes_every_callback_with_none_and_clears_table() {
        let table = CallbackTable::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for id in [1, 2, 3] {
            let seen = Arc::clone(&seen);
            table.register(
                id,
                RequestType::Request,
                Box::new(move |resp| seen.lock().push((id, resp.is_none()))),
            );
        }

        table.drain();

        let mut seen = seen.lock().clone();
        seen.sort();
        assert_eq!(seen, vec![(1, true), (2, true), (3, true)]);
        assert!(!table.contains(1));
        assert!(!table.contains(2));
        assert!(!table.contains(3));
    }
}
