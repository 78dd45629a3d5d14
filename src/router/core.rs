//! Router core module - hot path for request routing.

use crate::handler::RequestHandler;
use crate::pattern::Captures;
use arc_swap::ArcSwap;
use http::Method;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of resolving a request to a registered handler
#[derive(Debug, Clone)]
pub struct RouteMatch {
    /// The first registered handler whose pattern matched
    pub handler: Arc<RequestHandler>,
    /// Variables captured from the path (may be empty)
    pub captures: Captures,
}

impl RouteMatch {
    #[inline]
    #[must_use]
    pub fn capture(&self, name: &str) -> Option<&str> {
        self.captures.get(name)
    }
}

/// Ordered handler registry
///
/// Resolution walks handlers in registration order and returns the first
/// match; operators control precedence purely by registration order.
///
/// Reads take a lock-free snapshot of the handler list, so matching keeps
/// running against a consistent list while `add`/`remove`/`clear` publish a
/// new one.
pub struct Router {
    handlers: ArcSwap<Vec<Arc<RequestHandler>>>,
}

impl Router {
    #[must_use]
    pub fn new() -> Self {
        Self {
            handlers: ArcSwap::from_pointee(Vec::new()),
        }
    }

    /// Append `handler`; returns it unchanged
    pub fn add(&self, handler: Arc<RequestHandler>) -> Arc<RequestHandler> {
        self.handlers.rcu(|current| {
            let mut next = Vec::with_capacity(current.len() + 1);
            next.extend(current.iter().cloned());
            next.push(Arc::clone(&handler));
            next
        });
        info!(
            handler = %handler.name(),
            pattern = %handler.pattern(),
            method = ?handler.method(),
            handlers_count = self.len(),
            "Handler registered"
        );
        handler
    }

    /// Remove `handler` by identity; returns whether it was registered
    pub fn remove(&self, handler: &RequestHandler) -> bool {
        let id = handler.id();
        let previous = self.handlers.rcu(|current| {
            current
                .iter()
                .filter(|h| h.id() != id)
                .cloned()
                .collect::<Vec<_>>()
        });
        let removed = previous.iter().any(|h| h.id() == id);
        if removed {
            info!(handler = %handler.name(), "Handler unregistered");
        } else {
            warn!(handler = %handler.name(), "Attempted to unregister unknown handler");
        }
        removed
    }

    /// Remove every handler
    pub fn clear(&self) {
        let previous = self.handlers.swap(Arc::new(Vec::new()));
        info!(handlers_count = previous.len(), "Router cleared");
    }

    pub fn len(&self) -> usize {
        self.handlers.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.load().is_empty()
    }

    /// Snapshot of the registered handlers in registration order
    pub fn handlers(&self) -> Arc<Vec<Arc<RequestHandler>>> {
        self.handlers.load_full()
    }

    /// Resolve a request to the first matching handler
    ///
    /// No match is not an error; callers fall back to a not-found response.
    #[must_use]
    pub fn match_request(&self, method: &Method, path: &str) -> Option<RouteMatch> {
        let handlers = self.handlers.load();
        for handler in handlers.iter() {
            if let Some(captures) = handler.matches(method, path) {
                debug!(
                    method = %method,
                    path = %path,
                    handler = %handler.name(),
                    captures = captures.len(),
                    "Route matched"
                );
                return Some(RouteMatch {
                    handler: Arc::clone(handler),
                    captures,
                });
            }
        }
        debug!(method = %method, path = %path, "No route matched");
        None
    }

    /// Log every registered handler in order
    pub fn dump(&self) {
        let handlers = self.handlers.load();
        info!(handlers_count = handlers.len(), "Registered handlers");
        for (position, handler) in handlers.iter().enumerate() {
            let capabilities = handler.capabilities();
            info!(
                position,
                handler = %handler.name(),
                pattern = %handler.pattern(),
                method = %handler.method().map_or("*", Method::as_str),
                cacheable = capabilities.cacheable,
                force_https = capabilities.force_https,
                middleware = ?handler.middleware_names(),
                "Handler"
            );
        }
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}
