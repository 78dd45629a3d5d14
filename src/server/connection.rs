//! Per-connection request loop run on a worker thread.

use crate::compiler::{ConnectionContext, RequestCompiler};
use crate::dispatcher::{DispatchOutcome, Dispatcher};
use crate::error::ParseError;
use crate::filter::ConnectionInfo;
use crate::response::Response;
use crate::session::SessionProvider;
use http::{header, Method};
use std::io::{self, BufReader, Read, Write};
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

/// Byte stream a connection is served over (plain TCP or a rustls stream)
pub(crate) trait Transport: Read + Write + Send {}

impl<T: Read + Write + Send> Transport for T {}

/// Keep-alive policy applied after every response
#[derive(Debug, Clone, Copy)]
pub(crate) struct ConnectionPolicy {
    pub keep_alive: bool,
    pub idle_timeout: Duration,
    pub max_requests: usize,
    pub debug: bool,
}

/// Everything a worker needs to serve connections
pub(crate) struct ConnectionWorker {
    pub dispatcher: Arc<Dispatcher>,
    pub compiler: Arc<dyn RequestCompiler>,
    pub sessions: Arc<dyn SessionProvider>,
    pub policy: ConnectionPolicy,
    pub stopping: Arc<AtomicBool>,
}

impl ConnectionWorker {
    /// Apply socket timeouts before the stream is wrapped
    pub(crate) fn prepare(&self, stream: &TcpStream) {
        let timeout = Some(self.policy.idle_timeout).filter(|t| !t.is_zero());
        if let Err(e) = stream
            .set_read_timeout(timeout)
            .and_then(|()| stream.set_write_timeout(timeout))
            .and_then(|()| stream.set_nodelay(true))
        {
            debug!(error = %e, "Failed to configure connection socket");
        }
    }

    /// Serve requests on `stream` until the peer closes, an error occurs or
    /// a response ends the connection
    pub(crate) fn serve(&self, stream: Box<dyn Transport>, info: ConnectionInfo) {
        let ctx = ConnectionContext {
            protocol: info.protocol,
            peer: info.peer,
        };
        let mut reader = BufReader::new(stream);
        let mut served = 0usize;

        loop {
            if self.stopping.load(Ordering::SeqCst) {
                debug!(peer = ?info.peer, "Closing connection for shutdown");
                break;
            }

            let mut req = match self.compiler.compile(&mut reader, ctx) {
                Ok(Some(req)) => req,
                Ok(None) => {
                    debug!(peer = ?info.peer, served, "Peer closed connection");
                    break;
                }
                Err(ParseError::Io(e)) => {
                    if is_idle_close(&e) {
                        debug!(peer = ?info.peer, served, "Connection idle, closing");
                    } else {
                        debug!(peer = ?info.peer, error = %e, "Connection read failed");
                    }
                    break;
                }
                Err(e) => {
                    warn!(
                        peer = ?info.peer,
                        protocol = %info.protocol,
                        error = %e,
                        "Rejecting unparseable request"
                    );
                    let status = e.status();
                    let body = if self.policy.debug {
                        format!("{}: {e}", status.canonical_reason().unwrap_or("Error"))
                    } else {
                        status.canonical_reason().unwrap_or("Error").to_string()
                    };
                    let response = Response::error(status, &body);
                    if let Err(e) = write_response(reader.get_mut(), &response, false, false) {
                        debug!(peer = ?info.peer, error = %e, "Failed to write protocol error");
                    }
                    break;
                }
            };
            served += 1;
            let started = Instant::now();

            let cookie = req.cookie(self.sessions.cookie_name()).map(str::to_string);
            let session = self.sessions.resolve(cookie.as_deref());
            req.attach_session(Arc::clone(&session.session));

            let mut response = match self.dispatcher.dispatch(&mut req) {
                DispatchOutcome::Respond(response) => response,
                DispatchOutcome::Silent => {
                    debug!(
                        request_id = %req.request_id(),
                        path = %req.path(),
                        "Chain halted without a response, closing connection"
                    );
                    break;
                }
            };

            response.set_header("x-request-id", req.request_id().to_string());
            if session.created {
                response.append_header(header::SET_COOKIE, self.sessions.set_cookie(&session.session));
            }

            let keep_alive = self.policy.keep_alive
                && req.wants_keep_alive()
                && served < self.policy.max_requests
                && !self.stopping.load(Ordering::SeqCst);
            let head_only = *req.method() == Method::HEAD;

            if let Err(e) = write_response(reader.get_mut(), &response, keep_alive, head_only) {
                error!(
                    request_id = %req.request_id(),
                    peer = ?info.peer,
                    error = %e,
                    "Failed to write response"
                );
                break;
            }

            debug!(
                request_id = %req.request_id(),
                method = %req.method(),
                path = %req.path(),
                status = response.status().as_u16(),
                protocol = %info.protocol,
                keep_alive,
                duration_us = started.elapsed().as_micros() as u64,
                "Request completed"
            );

            if !keep_alive {
                break;
            }
        }
    }
}

fn write_response(
    out: &mut Box<dyn Transport>,
    response: &Response,
    keep_alive: bool,
    head_only: bool,
) -> io::Result<()> {
    response.write_to(out, keep_alive, head_only)?;
    out.flush()
}

fn is_idle_close(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::UnexpectedEof
    )
}
