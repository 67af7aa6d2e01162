use std::collections::HashMap;
use std::sync::Arc;

use nanorpc_wire::{request::PathOneof, Request};
use parking_lot::RwLock;

use crate::error::HashError;
use crate::fnv::fnv1a_32;

#[derive(Default)]
struct Maps {
    forward: HashMap<String, u32>,
    reverse: HashMap<u32, String>,
}

/// A bidirectional map between string paths and their FNV-1a 32-bit hash.
///
/// Process-lifetime by default, shared between client and server handler
/// registration via `Arc`. Every mutating operation keeps `forward` and
/// `reverse` consistent: an entry exists in one iff it exists in the other.
#[derive(Default, Clone)]
pub struct HashCache {
    maps: Arc<RwLock<Maps>>,
}

impl HashCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached hash for `path` if present; else computes it with
    /// FNV-1a, atomically inserts both directions, and returns it.
    ///
    /// Fails with `HashCollision` if the computed hash is already bound to a
    /// different path, and makes no change in that case.
    pub fn hash(&self, path: &str) -> Result<u32, HashError> {
        {
            let maps = self.maps.read();
            if let Some(&h) = maps.forward.get(path) {
                return Ok(h);
            }
        }

        let computed = fnv1a_32(path);
        let mut maps = self.maps.write();
        // Re-check under the write lock: another writer may have inserted
        // this exact path (or a colliding one) between the read above and
        // acquiring the write lock.
        if let Some(&h) = maps.forward.get(path) {
            return Ok(h);
        }
        if let Some(existing) = maps.reverse.get(&computed) {
            if existing != path {
                return Err(HashError::HashCollision {
                    hash: computed,
                    existing: existing.clone(),
                    attempted: path.to_string(),
                });
            }
        }
        maps.forward.insert(path.to_string(), computed);
        maps.reverse.insert(computed, path.to_string());
        Ok(computed)
    }

    /// Returns the string path bound to `hash`, if known.
    pub fn path(&self, hash: u32) -> Option<String> {
        self.maps.read().reverse.get(&hash).cloned()
    }

    /// Resolves a request's `path_oneof` to a string path and hash.
    ///
    /// - String-path requests: computes and caches the hash, returning
    ///   `(path, hash)`.
    /// - Hash-path requests: looks up the string. If unknown, returns
    ///   `(String::new(), hash)` — callers (the server dispatcher) treat an
    ///   empty resolved path as NOT_FOUND.
    /// - `PING` (no `path_oneof`): returns `(String::new(), 0)`.
    pub fn resolve(&self, request: &Request) -> Result<(String, u32), HashError> {
        match &request.path_oneof {
            Some(PathOneof::Path(p)) => {
                let h = self.hash(p)?;
                Ok((p.clone(), h))
            }
            Some(PathOneof::PathHash(h)) => match self.path(*h) {
                Some(p) => Ok((p, *h)),
                None => Ok((String::new(), *h)),
            },
            None => Ok((String::new(), 0)),
        }
    }

    /// In-place rewrite of a hash-path request to a string-path request when
    /// the hash is resolvable. Identity (no-op) otherwise, including for
    /// requests that already carry a string path or carry none (`PING`).
    pub fn dehash(&self, request: &mut Request) {
        if let Some(PathOneof::PathHash(h)) = &request.path_oneof {
            if let Some(path) = self.path(*h) {
                request.path_oneof = Some(PathOneof::Path(path));
            }
        }
    }
}
