//! Incoming request model shared by the compiler, middleware and handlers.
//!
//! An [`IncomingRequest`] belongs to exactly one worker at a time. Middleware
//! and generation logic mutate it through `&mut` access: the metadata bag,
//! captures, pending internal redirect and selected alternate outcome all
//! live here rather than in shared state.

use crate::handler::RequestHandler;
use crate::ids::RequestId;
use crate::pattern::Captures;
use crate::response::Response;
use crate::session::Session;
use bytes::Bytes;
use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use http::{Method, Version};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

/// Listener a request arrived on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    /// Plain-text HTTP
    Plain,
    /// HTTP over TLS
    Tls,
}

impl Protocol {
    pub fn scheme(self) -> &'static str {
        match self {
            Protocol::Plain => "http",
            Protocol::Tls => "https",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Plain => f.write_str("plain"),
            Protocol::Tls => f.write_str("tls"),
        }
    }
}

/// One parsed HTTP exchange
#[derive(Debug)]
pub struct IncomingRequest {
    method: Method,
    target: String,
    path: String,
    query: HashMap<String, String>,
    version: Version,
    headers: HeaderMap,
    body: Bytes,
    protocol: Protocol,
    peer: Option<SocketAddr>,
    request_id: RequestId,
    captures: Captures,
    handler: Option<Arc<RequestHandler>>,
    meta: HashMap<String, Value>,
    session: Option<Arc<Session>>,
    pending_redirect: Option<String>,
    outcome: Option<String>,
    early_response: Option<Response>,
}

impl IncomingRequest {
    /// Build a request for `method` and request-target `target` (`/path?query`)
    pub fn new(method: Method, target: &str) -> Self {
        let (path, query) = split_target(target);
        Self {
            method,
            target: target.to_string(),
            path,
            query,
            version: Version::HTTP_11,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            protocol: Protocol::Plain,
            peer: None,
            request_id: RequestId::new(),
            captures: Captures::default(),
            handler: None,
            meta: HashMap::new(),
            session: None,
            pending_redirect: None,
            outcome: None,
            early_response: None,
        }
    }

    /// Append a header, silently skipping names or values that are not valid HTTP
    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(n), Ok(v)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.append(n, v);
        }
        self
    }

    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self.request_id = RequestId::from_header_or_new(
            self.headers
                .get("x-request-id")
                .and_then(|v| v.to_str().ok()),
        );
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    #[must_use]
    pub fn with_version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    #[must_use]
    pub fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }

    #[must_use]
    pub fn with_peer(mut self, peer: SocketAddr) -> Self {
        self.peer = Some(peer);
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The raw request-target, including any query string
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Path component used for routing (query stripped, not percent-decoded)
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query(&self) -> &HashMap<String, String> {
        &self.query
    }

    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// First value of header `name` if it is valid UTF-8
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Value of cookie `name` from the `Cookie` header(s)
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v)
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Variables captured by the most recent route match
    pub fn captures(&self) -> &Captures {
        &self.captures
    }

    /// Shorthand for `captures().get(name)`
    pub fn capture(&self, name: &str) -> Option<&str> {
        self.captures.get(name)
    }

    pub(crate) fn set_captures(&mut self, captures: Captures) {
        self.captures = captures;
    }

    /// Handler the request is currently routed to
    pub fn handler(&self) -> Option<&Arc<RequestHandler>> {
        self.handler.as_ref()
    }

    pub(crate) fn set_handler(&mut self, handler: Arc<RequestHandler>) {
        self.handler = Some(handler);
    }

    /// Whether the client asked to keep the connection open
    pub fn wants_keep_alive(&self) -> bool {
        let connection = self
            .header(header::CONNECTION.as_str())
            .map(str::to_ascii_lowercase);
        match self.version {
            Version::HTTP_10 => connection.as_deref() == Some("keep-alive"),
            _ => connection.as_deref() != Some("close"),
        }
    }

    pub fn meta(&self, key: &str) -> Option<&Value> {
        self.meta.get(key)
    }

    pub fn set_meta(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.meta.insert(key.into(), value.into());
    }

    pub fn remove_meta(&mut self, key: &str) -> Option<Value> {
        self.meta.remove(key)
    }

    pub fn session(&self) -> Option<&Arc<Session>> {
        self.session.as_ref()
    }

    pub(crate) fn attach_session(&mut self, session: Arc<Session>) {
        self.session = Some(session);
    }

    /// Ask the worker to re-route this request to `path` without a new round-trip
    ///
    /// Takes effect when the current middleware returns; a middleware may
    /// also return [`Flow::Redirect`](crate::middleware::Flow::Redirect) directly.
    pub fn redirect_to(&mut self, path: impl Into<String>) {
        self.pending_redirect = Some(path.into());
    }

    pub(crate) fn take_pending_redirect(&mut self) -> Option<String> {
        self.pending_redirect.take()
    }

    /// Point the request at a new target; query parameters are re-parsed
    pub(crate) fn rewrite_target(&mut self, target: &str) {
        let (path, query) = split_target(target);
        self.target = target.to_string();
        self.path = path;
        self.query = query;
    }

    /// Select a named alternate outcome registered on the handler
    pub fn select_outcome(&mut self, name: impl Into<String>) {
        self.outcome = Some(name.into());
    }

    pub fn selected_outcome(&self) -> Option<&str> {
        self.outcome.as_deref()
    }

    pub(crate) fn clear_outcome(&mut self) {
        self.outcome = None;
    }

    /// Record the response a middleware produced before halting the chain
    pub fn respond(&mut self, response: Response) {
        self.early_response = Some(response);
    }

    pub(crate) fn take_early_response(&mut self) -> Option<Response> {
        self.early_response.take()
    }
}

fn split_target(target: &str) -> (String, HashMap<String, String>) {
    match target.split_once('?') {
        Some((path, query)) => (
            path.to_string(),
            url::form_urlencoded::parse(query.as_bytes())
                .into_owned()
                .collect(),
        ),
        None => (target.to_string(), HashMap::new()),
    }
}
