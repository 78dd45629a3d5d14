//! Session collaborator.
//!
//! The worker asks a [`SessionProvider`] for a session on every request and
//! attaches it to the [`IncomingRequest`](crate::request::IncomingRequest).
//! When the provider had to mint a new session, the worker adds a
//! `Set-Cookie` header after cache capture so cookies never end up in a
//! shared snapshot.

use crate::ids::SessionId;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Table size above which idle sessions are swept on creation
const SESSION_PRUNE_THRESHOLD: usize = 4096;

/// Idle time after which [`InMemorySessions::new`] forgets a session
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(30 * 60);

/// Per-client state shared across that client's requests
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    created_at: Instant,
    last_seen: Mutex<Instant>,
    data: RwLock<HashMap<String, Value>>,
}

impl Session {
    pub fn new(id: SessionId) -> Self {
        let now = Instant::now();
        Self {
            id,
            created_at: now,
            last_seen: Mutex::new(now),
            data: RwLock::new(HashMap::new()),
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// When a request last resolved this session
    pub fn last_seen(&self) -> Instant {
        *self.last_seen.lock()
    }

    fn touch(&self, now: Instant) {
        *self.last_seen.lock() = now;
    }

    fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_seen())
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.data.read().get(key).cloned()
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.data.write().insert(key.into(), value.into());
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.data.write().remove(key)
    }
}

/// A resolved session plus whether it was created for this request
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub session: Arc<Session>,
    pub created: bool,
}

/// Resolves the session for a request from its cookie value
pub trait SessionProvider: Send + Sync {
    /// Name of the cookie carrying the session id
    fn cookie_name(&self) -> &str;

    /// Look up `cookie` or create a fresh session when it is absent or unknown
    fn resolve(&self, cookie: Option<&str>) -> SessionHandle;

    /// `Set-Cookie` value announcing a newly created session
    fn set_cookie(&self, session: &Session) -> String {
        format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax",
            self.cookie_name(),
            session.id()
        )
    }

    /// Forget a session (logout)
    fn invalidate(&self, id: &SessionId);
}

/// Process-local session table
///
/// A session unused for longer than the TTL resolves as unknown. Expired
/// entries are swept whenever the table grows past a threshold, and
/// [`InMemorySessions::prune`] sweeps on demand.
#[derive(Debug)]
pub struct InMemorySessions {
    cookie_name: String,
    ttl: Duration,
    sessions: DashMap<SessionId, Arc<Session>>,
}

impl InMemorySessions {
    pub fn new(cookie_name: impl Into<String>) -> Self {
        Self::with_ttl(cookie_name, DEFAULT_SESSION_TTL)
    }

    pub fn with_ttl(cookie_name: impl Into<String>, ttl: Duration) -> Self {
        Self {
            cookie_name: cookie_name.into(),
            ttl,
            sessions: DashMap::new(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Drop every session idle for longer than the TTL, returning how many went
    pub fn prune(&self) -> usize {
        let now = Instant::now();
        let before = self.sessions.len();
        self.sessions
            .retain(|_, session| session.idle_for(now) <= self.ttl);
        let removed = before.saturating_sub(self.sessions.len());
        if removed > 0 {
            debug!(removed, remaining = self.sessions.len(), "Expired sessions pruned");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn create(&self) -> SessionHandle {
        if self.sessions.len() >= SESSION_PRUNE_THRESHOLD {
            self.prune();
        }
        let session = Arc::new(Session::new(SessionId::generate()));
        self.sessions
            .insert(session.id().clone(), Arc::clone(&session));
        debug!(session_id = %session.id(), "Session created");
        SessionHandle {
            session,
            created: true,
        }
    }
}

impl SessionProvider for InMemorySessions {
    fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    fn resolve(&self, cookie: Option<&str>) -> SessionHandle {
        let now = Instant::now();
        let known = cookie
            .and_then(SessionId::parse)
            .and_then(|id| self.sessions.get(&id).map(|s| Arc::clone(s.value())));
        match known {
            Some(session) if session.idle_for(now) <= self.ttl => {
                session.touch(now);
                SessionHandle {
                    session,
                    created: false,
                }
            }
            Some(expired) => {
                self.sessions.remove(expired.id());
                debug!(session_id = %expired.id(), "Session expired");
                self.create()
            }
            None => self.create(),
        }
    }

    fn invalidate(&self, id: &SessionId) {
        self.sessions.remove(id);
    }
}
