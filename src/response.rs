//! Response model populated by generation logic and written by the worker.

use bytes::Bytes;
use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use http::StatusCode;
use std::io::{self, Write};

/// Response payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    /// UTF-8 text (HTML, JSON, plain text)
    Text(String),
    /// Raw bytes (images, downloads, replayed snapshots)
    Bytes(Bytes),
}

impl Body {
    pub fn len(&self) -> usize {
        match self {
            Body::Text(s) => s.len(),
            Body::Bytes(b) => b.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Body::Text(s) => s.as_bytes(),
            Body::Bytes(b) => b,
        }
    }

    /// Fully materialize into shareable bytes
    pub fn to_bytes(&self) -> Bytes {
        match self {
            Body::Text(s) => Bytes::copy_from_slice(s.as_bytes()),
            Body::Bytes(b) => b.clone(),
        }
    }
}

impl Default for Body {
    fn default() -> Self {
        Body::Bytes(Bytes::new())
    }
}

/// Status, headers and body produced for one request
#[derive(Debug, Clone)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: Body,
}

impl Response {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Body::default(),
        }
    }

    /// `200 OK` with a `text/plain` body
    pub fn text(body: impl Into<String>) -> Self {
        Self::new(StatusCode::OK)
            .with_header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
            .with_body(Body::Text(body.into()))
    }

    /// `200 OK` with a `text/html` body
    pub fn html(body: impl Into<String>) -> Self {
        Self::new(StatusCode::OK)
            .with_header(header::CONTENT_TYPE, "text/html; charset=utf-8")
            .with_body(Body::Text(body.into()))
    }

    /// `200 OK` with a JSON body
    pub fn json(value: &serde_json::Value) -> Self {
        Self::new(StatusCode::OK)
            .with_header(header::CONTENT_TYPE, "application/json")
            .with_body(Body::Text(value.to_string()))
    }

    /// `200 OK` with raw bytes of the given content type
    pub fn bytes(content_type: &str, body: impl Into<Bytes>) -> Self {
        Self::new(StatusCode::OK)
            .with_header(header::CONTENT_TYPE, content_type)
            .with_body(Body::Bytes(body.into()))
    }

    /// Redirect to `location` with the given 3xx status
    pub fn redirect(status: StatusCode, location: &str) -> Self {
        Self::new(status).with_header(header::LOCATION, location)
    }

    /// Default response for requests no handler matched
    pub fn not_found(path: &str) -> Self {
        Self::text(format!("Not Found: {path}")).with_status(StatusCode::NOT_FOUND)
    }

    /// Plain-text error body for `status`
    pub fn error(status: StatusCode, message: &str) -> Self {
        Self::text(message.to_string()).with_status(status)
    }

    #[must_use]
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    /// Set a header, replacing existing values; invalid names/values are dropped
    #[must_use]
    pub fn with_header<K, V>(mut self, name: K, value: V) -> Self
    where
        K: TryInto<HeaderName>,
        V: TryInto<HeaderValue>,
    {
        self.set_header(name, value);
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: Body) -> Self {
        self.body = body;
        self
    }

    pub fn set_header<K, V>(&mut self, name: K, value: V)
    where
        K: TryInto<HeaderName>,
        V: TryInto<HeaderValue>,
    {
        if let (Ok(n), Ok(v)) = (name.try_into(), value.try_into()) {
            self.headers.insert(n, v);
        }
    }

    /// Add a header value without replacing existing ones (e.g. `Set-Cookie`)
    pub fn append_header<K, V>(&mut self, name: K, value: V)
    where
        K: TryInto<HeaderName>,
        V: TryInto<HeaderValue>,
    {
        if let (Ok(n), Ok(v)) = (name.try_into(), value.try_into()) {
            self.headers.append(n, v);
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    pub(crate) fn from_parts(status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            status,
            headers,
            body: Body::Bytes(body),
        }
    }

    /// Serialize as an HTTP/1.1 response
    ///
    /// `Content-Length` and `Connection` are always computed here and any
    /// handler-set values for them are ignored. With `head_only` the body is
    /// omitted but the length still reflects it.
    pub fn write_to<W: Write>(&self, out: &mut W, keep_alive: bool, head_only: bool) -> io::Result<()> {
        let mut buf = Vec::with_capacity(256 + self.body.len());
        write!(
            buf,
            "HTTP/1.1 {} {}\r\n",
            self.status.as_u16(),
            self.status.canonical_reason().unwrap_or("")
        )?;
        for (name, value) in &self.headers {
            if name == header::CONTENT_LENGTH || name == header::CONNECTION {
                continue;
            }
            buf.extend_from_slice(name.as_str().as_bytes());
            buf.extend_from_slice(b": ");
            buf.extend_from_slice(value.as_bytes());
            buf.extend_from_slice(b"\r\n");
        }
        write!(buf, "content-length: {}\r\n", self.body.len())?;
        let connection = if keep_alive { "keep-alive" } else { "close" };
        write!(buf, "connection: {connection}\r\n\r\n")?;
        if !head_only {
            buf.extend_from_slice(self.body.as_bytes());
        }
        out.write_all(&buf)?;
        out.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(resp: &Response, keep_alive: bool) -> String {
        let mut out = Vec::new();
        resp.write_to(&mut out, keep_alive, false).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_text_response_serialization() {
        let raw = render(&Response::text("hello"), true);
        assert!(raw.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(raw.contains("content-type: text/plain; charset=utf-8\r\n"));
        assert!(raw.contains("content-length: 5\r\n"));
        assert!(raw.contains("connection: keep-alive\r\n"));
        assert!(raw.ends_with("\r\n\r\nhello"));
    }

    #[test]
    fn test_handler_set_framing_headers_are_overridden() {
        let resp = Response::text("abc").with_header("content-length", "999");
        let raw = render(&resp, false);
        assert!(raw.contains("content-length: 3\r\n"));
        assert!(!raw.contains("999"));
        assert!(raw.contains("connection: close\r\n"));
    }

    #[test]
    fn test_head_only_omits_body() {
        let mut out = Vec::new();
        Response::text("hello").write_to(&mut out, true, true).unwrap();
        let raw = String::from_utf8(out).unwrap();
        assert!(raw.contains("content-length: 5\r\n"));
        assert!(raw.ends_with("\r\n\r\n"));
    }

    #[test]
    fn test_append_header_keeps_existing_values() {
        let mut resp = Response::new(StatusCode::NO_CONTENT);
        resp.append_header(header::SET_COOKIE, "a=1");
        resp.append_header(header::SET_COOKIE, "b=2");
        assert_eq!(resp.headers().get_all(header::SET_COOKIE).iter().count(), 2);
    }

    #[test]
    fn test_invalid_header_value_dropped() {
        let resp = Response::new(StatusCode::OK).with_header("x-bad", "line\nbreak");
        assert!(resp.header("x-bad").is_none());
    }
}
