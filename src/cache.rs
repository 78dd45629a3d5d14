//! # Response Cache Binding
//!
//! Whole-handler response caching. A cache-eligible handler's output is
//! captured once as a [`CachedSnapshot`] (status, headers and fully
//! materialized body bytes) and replayed verbatim on later requests for as
//! long as the handler's applicability predicate passes.
//!
//! The key is the handler's [`HandlerId`], never the request parameters.
//! There is no single-flight guard: concurrent first requests may each
//! generate and store a snapshot, and the last `put` wins.
//!
//! Storage policy (eviction, persistence) belongs to the [`CacheStore`]
//! implementation. [`InMemoryCacheStore`] keeps snapshots until they are
//! removed explicitly.

use crate::ids::HandlerId;
use crate::response::Response;
use bytes::Bytes;
use dashmap::DashMap;
use http::{HeaderMap, StatusCode};
use std::sync::Arc;

/// Immutable captured response
#[derive(Debug, Clone)]
pub struct CachedSnapshot {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl CachedSnapshot {
    /// Materialize `response` into a replayable snapshot
    pub fn capture(response: &Response) -> Self {
        Self {
            status: response.status(),
            headers: response.headers().clone(),
            body: response.body().to_bytes(),
        }
    }

    /// Rebuild a response carrying exactly the captured bytes
    pub fn replay(&self) -> Response {
        Response::from_parts(self.status, self.headers.clone(), self.body.clone())
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }
}

/// Storage collaborator for snapshots, shared across all worker threads
pub trait CacheStore: Send + Sync {
    fn get(&self, key: &HandlerId) -> Option<Arc<CachedSnapshot>>;

    /// Store a snapshot, overwriting any previous entry for `key`
    fn put(&self, key: HandlerId, snapshot: Arc<CachedSnapshot>);

    fn remove(&self, key: &HandlerId) -> Option<Arc<CachedSnapshot>>;

    fn clear(&self);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Unbounded in-process store backed by a sharded concurrent map
#[derive(Debug, Default)]
pub struct InMemoryCacheStore {
    entries: DashMap<HandlerId, Arc<CachedSnapshot>>,
}

impl InMemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheStore for InMemoryCacheStore {
    fn get(&self, key: &HandlerId) -> Option<Arc<CachedSnapshot>> {
        self.entries.get(key).map(|e| Arc::clone(e.value()))
    }

    fn put(&self, key: HandlerId, snapshot: Arc<CachedSnapshot>) {
        self.entries.insert(key, snapshot);
    }

    fn remove(&self, key: &HandlerId) -> Option<Arc<CachedSnapshot>> {
        self.entries.remove(key).map(|(_, v)| v)
    }

    fn clear(&self) {
        self.entries.clear();
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::Body;

    #[test]
    fn test_snapshot_replays_identical_bytes() {
        let resp = Response::text("cached body").with_header("x-extra", "1");
        let snapshot = CachedSnapshot::capture(&resp);
        let replayed = snapshot.replay();
        assert_eq!(replayed.status(), StatusCode::OK);
        assert_eq!(replayed.header("x-extra"), Some("1"));
        assert_eq!(replayed.body().as_bytes(), b"cached body");
        assert!(matches!(replayed.body(), Body::Bytes(_)));
    }

    #[test]
    fn test_store_last_write_wins() {
        let store = InMemoryCacheStore::new();
        let key = HandlerId::new();
        store.put(key, Arc::new(CachedSnapshot::capture(&Response::text("first"))));
        store.put(key, Arc::new(CachedSnapshot::capture(&Response::text("second"))));
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&key).unwrap().body().as_ref(), b"second");
    }

    #[test]
    fn test_store_remove_and_clear() {
        let store = InMemoryCacheStore::new();
        let a = HandlerId::new();
        let b = HandlerId::new();
        store.put(a, Arc::new(CachedSnapshot::capture(&Response::text("a"))));
        store.put(b, Arc::new(CachedSnapshot::capture(&Response::text("b"))));
        assert!(store.remove(&a).is_some());
        assert!(store.get(&a).is_none());
        store.clear();
        assert!(store.is_empty());
    }
}
