//! Request compiler: raw connection bytes to [`IncomingRequest`].
//!
//! [`Http1Compiler`] reads one HTTP/1.x request at a time from a buffered
//! stream, tokenizes the head with `httparse` and reads a `Content-Length`
//! body. Chunked request bodies are rejected as unsupported.

use crate::error::ParseError;
use crate::request::{IncomingRequest, Protocol};
use bytes::Bytes;
use http::header::{HeaderMap, HeaderName, HeaderValue};
use http::{Method, Version};
use std::io::{BufRead, Read};
use std::net::SocketAddr;

/// Maximum number of request headers accepted
pub const MAX_HEADERS: usize = 64;

/// Connection metadata handed to the compiler with the stream
#[derive(Debug, Clone, Copy)]
pub struct ConnectionContext {
    pub protocol: Protocol,
    pub peer: Option<SocketAddr>,
}

/// Turns a byte stream into structured requests
pub trait RequestCompiler: Send + Sync {
    /// Read the next request from `stream`
    ///
    /// Returns `Ok(None)` when the peer closed the connection cleanly before
    /// sending any byte of a new request.
    ///
    /// # Errors
    ///
    /// [`ParseError`] when the bytes are not an acceptable request; the
    /// worker answers with a protocol-error response and closes.
    fn compile(
        &self,
        stream: &mut dyn BufRead,
        ctx: ConnectionContext,
    ) -> Result<Option<IncomingRequest>, ParseError>;
}

/// HTTP/1.0 and HTTP/1.1 request compiler
#[derive(Debug, Clone, Copy)]
pub struct Http1Compiler {
    max_header_bytes: usize,
    max_body_bytes: usize,
}

impl Http1Compiler {
    pub fn new(max_header_bytes: usize, max_body_bytes: usize) -> Self {
        Self {
            max_header_bytes,
            max_body_bytes,
        }
    }

    /// Read up to and including the blank line ending the header section
    fn read_head(&self, stream: &mut dyn BufRead) -> Result<Option<Vec<u8>>, ParseError> {
        let mut head = Vec::with_capacity(512);
        let mut skipped = 0usize;
        loop {
            let before = head.len();
            let budget = (self.max_header_bytes + 1).saturating_sub(head.len()) as u64;
            let n = (&mut *stream).take(budget).read_until(b'\n', &mut head)?;
            if n == 0 {
                if head.iter().all(u8::is_ascii_whitespace) {
                    return Ok(None);
                }
                return Err(ParseError::Malformed("connection closed mid-request".into()));
            }
            if head.len() > self.max_header_bytes {
                return Err(ParseError::HeadersTooLarge {
                    limit: self.max_header_bytes,
                });
            }
            let line = &head[before..];
            // tolerate blank lines preceding the request line
            if head.len() == line.len() && (line == b"\r\n" || line == b"\n") {
                skipped += line.len();
                if skipped > self.max_header_bytes {
                    return Err(ParseError::HeadersTooLarge {
                        limit: self.max_header_bytes,
                    });
                }
                head.clear();
                continue;
            }
            if line == b"\r\n" || line == b"\n" {
                return Ok(Some(head));
            }
        }
    }
}

impl Default for Http1Compiler {
    fn default() -> Self {
        Self::new(8 * 1024, 1024 * 1024)
    }
}

impl RequestCompiler for Http1Compiler {
    fn compile(
        &self,
        stream: &mut dyn BufRead,
        ctx: ConnectionContext,
    ) -> Result<Option<IncomingRequest>, ParseError> {
        let Some(head) = self.read_head(stream)? else {
            return Ok(None);
        };

        let mut storage = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut parsed = httparse::Request::new(&mut storage);
        match parsed.parse(&head) {
            Ok(httparse::Status::Complete(_)) => {}
            Ok(httparse::Status::Partial) => {
                return Err(ParseError::Malformed("incomplete request head".into()))
            }
            Err(e) => return Err(ParseError::Malformed(e.to_string())),
        }

        let method = parsed
            .method
            .ok_or_else(|| ParseError::Malformed("missing method".into()))
            .and_then(|m| {
                Method::from_bytes(m.as_bytes())
                    .map_err(|_| ParseError::Malformed(format!("invalid method '{m}'")))
            })?;
        let target = parsed
            .path
            .ok_or_else(|| ParseError::Malformed("missing request target".into()))?;
        let version = match parsed.version {
            Some(0) => Version::HTTP_10,
            _ => Version::HTTP_11,
        };

        let mut headers = HeaderMap::with_capacity(parsed.headers.len());
        for h in parsed.headers.iter() {
            let name = HeaderName::from_bytes(h.name.as_bytes())
                .map_err(|_| ParseError::Malformed(format!("invalid header name '{}'", h.name)))?;
            let value = HeaderValue::from_bytes(h.value)
                .map_err(|_| ParseError::Malformed(format!("invalid value for header '{}'", h.name)))?;
            headers.append(name, value);
        }

        if let Some(te) = headers.get(http::header::TRANSFER_ENCODING) {
            let te = te.to_str().unwrap_or_default();
            if !te.eq_ignore_ascii_case("identity") {
                return Err(ParseError::Unsupported(format!("transfer-encoding: {te}")));
            }
        }

        let content_length = match headers.get(http::header::CONTENT_LENGTH) {
            Some(v) => v
                .to_str()
                .ok()
                .and_then(|s| s.trim().parse::<usize>().ok())
                .ok_or_else(|| ParseError::Malformed("invalid content-length".into()))?,
            None => 0,
        };
        if content_length > self.max_body_bytes {
            return Err(ParseError::BodyTooLarge {
                declared: content_length,
                limit: self.max_body_bytes,
            });
        }
        let mut body = vec![0u8; content_length];
        stream.read_exact(&mut body)?;

        let mut request = IncomingRequest::new(method, target)
            .with_version(version)
            .with_headers(headers)
            .with_body(Bytes::from(body))
            .with_protocol(ctx.protocol);
        if let Some(peer) = ctx.peer {
            request = request.with_peer(peer);
        }
        Ok(Some(request))
    }
}
