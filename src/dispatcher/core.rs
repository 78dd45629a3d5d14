//! Dispatcher core module - per-request route, chain and generate steps.

use crate::cache::{CacheStore, CachedSnapshot};
use crate::error::HandlerError;
use crate::handler::RequestHandler;
use crate::middleware::{ChainOutcome, MiddlewareChain};
use crate::request::{IncomingRequest, Protocol};
use crate::response::Response;
use crate::router::Router;
use crate::worker_pool::panic_message;
use http::StatusCode;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Internal redirects allowed for one request before it is failed
pub const MAX_INTERNAL_REDIRECTS: usize = 16;

/// Dispatch-time switches taken from the server configuration
#[derive(Debug, Clone, Copy)]
pub struct DispatchSettings {
    /// Consult and populate the response cache
    pub cache_enabled: bool,
    /// Include error detail and request id in error bodies
    pub debug: bool,
    /// Port of the TLS listener, used for HTTPS upgrade redirects
    pub tls_port: Option<u16>,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            cache_enabled: true,
            debug: false,
            tls_port: None,
        }
    }
}

/// What the worker should do after dispatch
#[derive(Debug)]
pub enum DispatchOutcome {
    /// Write this response
    Respond(Response),
    /// A middleware halted the chain without producing a response; the
    /// worker writes nothing and closes the connection
    Silent,
}

impl DispatchOutcome {
    pub fn response(&self) -> Option<&Response> {
        match self {
            DispatchOutcome::Respond(r) => Some(r),
            DispatchOutcome::Silent => None,
        }
    }
}

/// Routes a request, drains the handler's middleware and produces a response
///
/// One dispatcher is shared by all worker threads; all per-request state
/// lives in the [`IncomingRequest`].
pub struct Dispatcher {
    router: Arc<Router>,
    cache: Arc<dyn CacheStore>,
    settings: DispatchSettings,
}

impl Dispatcher {
    pub fn new(router: Arc<Router>, cache: Arc<dyn CacheStore>, settings: DispatchSettings) -> Self {
        Self {
            router,
            cache,
            settings,
        }
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    pub fn settings(&self) -> DispatchSettings {
        self.settings
    }

    /// Run the route → chain → generate pipeline for `req`
    ///
    /// Every failure (handler error, panic in middleware or generation,
    /// redirect loop) is turned into an error response for this request only.
    pub fn dispatch(&self, req: &mut IncomingRequest) -> DispatchOutcome {
        let mut redirects = 0;
        loop {
            let Some(route) = self.router.match_request(req.method(), req.path()) else {
                debug!(
                    request_id = %req.request_id(),
                    method = %req.method(),
                    path = %req.path(),
                    "No handler matched"
                );
                return DispatchOutcome::Respond(Response::not_found(req.path()));
            };
            let handler = route.handler;
            req.set_captures(route.captures);
            req.set_handler(Arc::clone(&handler));
            req.clear_outcome();

            if handler.capabilities().force_https && req.protocol() == Protocol::Plain {
                return DispatchOutcome::Respond(self.https_redirect(req));
            }

            let chain = MiddlewareChain::new(handler.middleware_for_dispatch());
            let outcome = match catch_unwind(AssertUnwindSafe(|| chain.run(req))) {
                Ok(outcome) => outcome,
                Err(panic) => {
                    let message = panic_message(&*panic);
                    error!(
                        request_id = %req.request_id(),
                        handler = %handler.name(),
                        panic_message = %message,
                        "Middleware panicked"
                    );
                    return DispatchOutcome::Respond(self.error_response(
                        req,
                        StatusCode::INTERNAL_SERVER_ERROR,
                        &message,
                    ));
                }
            };

            match outcome {
                ChainOutcome::Finished => {
                    return DispatchOutcome::Respond(self.generate(&handler, req));
                }
                ChainOutcome::Halted => {
                    return match req.take_early_response() {
                        Some(response) => DispatchOutcome::Respond(response),
                        None => DispatchOutcome::Silent,
                    };
                }
                ChainOutcome::Redirected(target) => {
                    redirects += 1;
                    if redirects > MAX_INTERNAL_REDIRECTS {
                        error!(
                            request_id = %req.request_id(),
                            handler = %handler.name(),
                            target = %target,
                            limit = MAX_INTERNAL_REDIRECTS,
                            "Internal redirect limit exceeded"
                        );
                        return DispatchOutcome::Respond(self.error_response(
                            req,
                            StatusCode::INTERNAL_SERVER_ERROR,
                            "internal redirect limit exceeded",
                        ));
                    }
                    debug!(
                        request_id = %req.request_id(),
                        from = %req.path(),
                        to = %target,
                        "Internal redirect"
                    );
                    req.rewrite_target(&target);
                }
            }
        }
    }

    /// Cache-first response generation for a fully drained chain
    fn generate(&self, handler: &RequestHandler, req: &mut IncomingRequest) -> Response {
        if let Some(outcome) = req.selected_outcome().map(str::to_string) {
            debug!(
                request_id = %req.request_id(),
                handler = %handler.name(),
                outcome = %outcome,
                "Running alternate outcome"
            );
            let result = catch_unwind(AssertUnwindSafe(|| handler.generate_outcome(&outcome, req)));
            return self.finish(handler, req, result);
        }

        let cacheable = self.settings.cache_enabled && handler.is_cache_applicable(req);
        if cacheable {
            if let Some(snapshot) = self.cache.get(&handler.id()) {
                debug!(
                    request_id = %req.request_id(),
                    handler = %handler.name(),
                    "Cache hit"
                );
                return snapshot.replay();
            }
            debug!(
                request_id = %req.request_id(),
                handler = %handler.name(),
                "Cache miss"
            );
        }

        let result = catch_unwind(AssertUnwindSafe(|| handler.generate(req)));
        let generated_ok = matches!(result, Ok(Ok(_)));
        let response = self.finish(handler, req, result);
        if cacheable && generated_ok {
            self.cache
                .put(handler.id(), Arc::new(CachedSnapshot::capture(&response)));
        }
        response
    }

    fn finish(
        &self,
        handler: &RequestHandler,
        req: &IncomingRequest,
        result: std::thread::Result<Result<Response, HandlerError>>,
    ) -> Response {
        match result {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                error!(
                    request_id = %req.request_id(),
                    handler = %handler.name(),
                    status = e.status().as_u16(),
                    error = %e.message(),
                    "Handler returned an error"
                );
                self.error_response(req, e.status(), e.message())
            }
            Err(panic) => {
                let message = panic_message(&*panic);
                error!(
                    request_id = %req.request_id(),
                    handler = %handler.name(),
                    panic_message = %message,
                    "Handler panicked"
                );
                self.error_response(req, StatusCode::INTERNAL_SERVER_ERROR, &message)
            }
        }
    }

    /// Error body for `status`
    ///
    /// Server errors carry only the canonical reason unless debug mode is on;
    /// client errors raised by a handler keep their message.
    pub fn error_response(&self, req: &IncomingRequest, status: StatusCode, message: &str) -> Response {
        let reason = status.canonical_reason().unwrap_or("Error");
        let body = if self.settings.debug {
            format!("{reason}: {message}\nrequest id: {}", req.request_id())
        } else if status.is_client_error() {
            format!("{reason}: {message}")
        } else {
            reason.to_string()
        };
        Response::error(status, &body)
    }

    fn https_redirect(&self, req: &IncomingRequest) -> Response {
        let host = req
            .header(http::header::HOST.as_str())
            .map(|h| match h.rsplit_once(':') {
                Some((name, _)) if !h.ends_with(']') => name,
                _ => h,
            })
            .filter(|h| !h.is_empty())
            .unwrap_or("localhost");
        let location = match self.settings.tls_port {
            Some(port) if port != 443 => format!("https://{host}:{port}{}", req.target()),
            _ => format!("https://{host}{}", req.target()),
        };
        if self.settings.tls_port.is_none() {
            warn!(
                request_id = %req.request_id(),
                "HTTPS redirect issued without a TLS listener configured"
            );
        }
        Response::redirect(StatusCode::MOVED_PERMANENTLY, &location)
    }
}
