//! # Request Handlers
//!
//! A [`RequestHandler`] pairs a [`CompiledPattern`] with response-generation
//! logic and per-handler policy:
//!
//! - an optional HTTP method constraint (any method by default)
//! - a [`Capabilities`] set checked by value (`cacheable`, `force_https`)
//! - a cache applicability predicate evaluated on every request
//! - named alternate outcomes a middleware can select
//! - the ordered middleware list, frozen after the first dispatch
//!
//! Handlers are built through [`Server::register`](crate::server::Server::register)
//! with a [`HandlerOptions`] builder.

use crate::error::{HandlerError, PatternError, RegistrationError};
use crate::ids::HandlerId;
use crate::middleware::Middleware;
use crate::pattern::{Captures, CompiledPattern};
use crate::request::IncomingRequest;
use crate::response::Response;
use http::Method;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Response-generation logic
pub type GenerateFn =
    dyn Fn(&mut IncomingRequest) -> Result<Response, HandlerError> + Send + Sync + 'static;

/// Per-request cache applicability check
pub type ApplicablePredicate = dyn Fn(&IncomingRequest) -> bool + Send + Sync + 'static;

/// Tagged handler capabilities
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// Whole-handler output may be cached and replayed
    pub cacheable: bool,
    /// Requests over plain HTTP are redirected to HTTPS
    pub force_https: bool,
}

/// Registration-time handler configuration
#[derive(Default)]
pub struct HandlerOptions {
    name: Option<String>,
    method: Option<Method>,
    capabilities: Capabilities,
    applicable: Option<Arc<ApplicablePredicate>>,
    alternates: HashMap<String, Arc<GenerateFn>>,
    middleware: Vec<Arc<dyn Middleware>>,
}

impl HandlerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Name used in logs; defaults to the pattern template
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Only match requests using `method`
    #[must_use]
    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    #[must_use]
    pub fn cacheable(mut self, cacheable: bool) -> Self {
        self.capabilities.cacheable = cacheable;
        self
    }

    #[must_use]
    pub fn force_https(mut self, force: bool) -> Self {
        self.capabilities.force_https = force;
        self
    }

    /// Cache only requests for which `predicate` returns true
    #[must_use]
    pub fn applicable_when<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&IncomingRequest) -> bool + Send + Sync + 'static,
    {
        self.applicable = Some(Arc::new(predicate));
        self
    }

    /// Register a named alternate generator (see [`IncomingRequest::select_outcome`])
    #[must_use]
    pub fn alternate_outcome<F>(mut self, name: impl Into<String>, generate: F) -> Self
    where
        F: Fn(&mut IncomingRequest) -> Result<Response, HandlerError> + Send + Sync + 'static,
    {
        self.alternates.insert(name.into(), Arc::new(generate));
        self
    }

    /// Append a middleware to the handler's chain
    #[must_use]
    pub fn middleware(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middleware.push(middleware);
        self
    }
}

/// A registered route
pub struct RequestHandler {
    id: HandlerId,
    name: String,
    pattern: CompiledPattern,
    method: Option<Method>,
    capabilities: Capabilities,
    applicable: Option<Arc<ApplicablePredicate>>,
    generate: Arc<GenerateFn>,
    alternates: HashMap<String, Arc<GenerateFn>>,
    middleware: RwLock<Vec<Arc<dyn Middleware>>>,
    dispatched: AtomicBool,
}

impl RequestHandler {
    /// Compile `template` and build a handler around `generate`
    ///
    /// # Errors
    ///
    /// Returns [`PatternError`] if the template does not compile.
    pub fn new<F>(template: &str, generate: F, options: HandlerOptions) -> Result<Self, PatternError>
    where
        F: Fn(&mut IncomingRequest) -> Result<Response, HandlerError> + Send + Sync + 'static,
    {
        let pattern = CompiledPattern::compile(template)?;
        let name = options.name.unwrap_or_else(|| template.to_string());
        if options.capabilities.cacheable && pattern.has_variables() {
            warn!(
                handler = %name,
                pattern = %pattern,
                "Cacheable handler captures path variables; one snapshot will be served for every value"
            );
        }
        Ok(Self {
            id: HandlerId::new(),
            name,
            pattern,
            method: options.method,
            capabilities: options.capabilities,
            applicable: options.applicable,
            generate: Arc::new(generate),
            alternates: options.alternates,
            middleware: RwLock::new(options.middleware),
            dispatched: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> HandlerId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pattern(&self) -> &CompiledPattern {
        &self.pattern
    }

    pub fn method(&self) -> Option<&Method> {
        self.method.as_ref()
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// Match method and path; `None` means this handler does not apply
    pub fn matches(&self, method: &Method, path: &str) -> Option<Captures> {
        if let Some(required) = &self.method {
            if required != method {
                return None;
            }
        }
        self.pattern.matches(path)
    }

    /// Whether a cached snapshot may serve (or be taken from) `req`
    pub fn is_cache_applicable(&self, req: &IncomingRequest) -> bool {
        self.capabilities.cacheable && self.applicable.as_ref().map_or(true, |p| p(req))
    }

    /// Run the primary generation logic
    pub fn generate(&self, req: &mut IncomingRequest) -> Result<Response, HandlerError> {
        (self.generate)(req)
    }

    /// Run a named alternate outcome
    ///
    /// # Errors
    ///
    /// Unknown outcome names are a [`HandlerError`].
    pub fn generate_outcome(
        &self,
        outcome: &str,
        req: &mut IncomingRequest,
    ) -> Result<Response, HandlerError> {
        match self.alternates.get(outcome) {
            Some(generate) => generate(req),
            None => Err(HandlerError::new(format!(
                "handler '{}' has no alternate outcome '{outcome}'",
                self.name
            ))),
        }
    }

    pub fn has_outcome(&self, outcome: &str) -> bool {
        self.alternates.contains_key(outcome)
    }

    /// Append middleware; only allowed before the handler's first dispatch
    ///
    /// # Errors
    ///
    /// [`RegistrationError::AlreadyDispatched`] once a request has been served.
    pub fn add_middleware(&self, middleware: Arc<dyn Middleware>) -> Result<(), RegistrationError> {
        let mut list = self.middleware.write();
        if self.dispatched.load(Ordering::SeqCst) {
            return Err(RegistrationError::AlreadyDispatched {
                handler: self.name.clone(),
            });
        }
        list.push(middleware);
        Ok(())
    }

    pub(crate) fn prepend_middleware(&self, middleware: Arc<dyn Middleware>) {
        self.middleware.write().insert(0, middleware);
    }

    /// Snapshot the middleware list for one dispatch and freeze it
    pub(crate) fn middleware_for_dispatch(&self) -> Vec<Arc<dyn Middleware>> {
        self.dispatched.store(true, Ordering::SeqCst);
        self.middleware.read().clone()
    }

    pub fn middleware_names(&self) -> Vec<String> {
        self.middleware
            .read()
            .iter()
            .map(|m| m.name().to_string())
            .collect()
    }

    pub fn has_dispatched(&self) -> bool {
        self.dispatched.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for RequestHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestHandler")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("pattern", &self.pattern.as_str())
            .field("method", &self.method)
            .field("capabilities", &self.capabilities)
            .field("outcomes", &self.alternates.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}
