//! Accept loops: one thread per listening protocol.

use super::connection::{ConnectionWorker, Transport};
use crate::filter::{ConnectionFilter, ConnectionInfo};
use crate::request::Protocol;
use crate::worker_pool::WorkerPool;
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Back-off after a failed `accept` so a persistent error (e.g. EMFILE)
/// does not spin the accept thread
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(10);

/// Flags shared by the accept loops, workers and the server handle
#[derive(Debug, Default)]
pub(crate) struct AcceptState {
    pub stopping: Arc<AtomicBool>,
    pub paused: AtomicBool,
}

pub(crate) struct AcceptLoop {
    pub listener: TcpListener,
    pub protocol: Protocol,
    pub tls: Option<Arc<rustls::ServerConfig>>,
    pub filters: Arc<[Arc<dyn ConnectionFilter>]>,
    pub pool: Arc<WorkerPool>,
    pub worker: Arc<ConnectionWorker>,
    pub state: Arc<AcceptState>,
    pub pause_poll: Duration,
}

impl AcceptLoop {
    pub(crate) fn run(self) {
        let local = self.listener.local_addr().ok();
        info!(addr = ?local, protocol = %self.protocol, "Accept loop started");
        loop {
            if self.state.stopping.load(Ordering::SeqCst) {
                break;
            }
            if self.state.paused.load(Ordering::SeqCst) {
                thread::sleep(self.pause_poll);
                continue;
            }
            match self.listener.accept() {
                Ok((stream, _)) => {
                    if self.state.stopping.load(Ordering::SeqCst) {
                        // wake-up connection from shutdown, or a late client
                        close(&stream);
                        break;
                    }
                    self.handle(stream, local);
                }
                Err(e) => {
                    warn!(protocol = %self.protocol, error = %e, "Accept failed");
                    thread::sleep(ACCEPT_ERROR_BACKOFF);
                }
            }
        }
        info!(addr = ?local, protocol = %self.protocol, "Accept loop stopped");
    }

    fn handle(&self, stream: TcpStream, local: Option<SocketAddr>) {
        let info = ConnectionInfo {
            peer: stream.peer_addr().ok(),
            local,
            protocol: self.protocol,
        };
        if let Some(filter) = self.filters.iter().find(|f| !f.accept(&info)) {
            debug!(
                peer = ?info.peer,
                protocol = %self.protocol,
                filter = %filter.name(),
                "Connection rejected by filter"
            );
            close(&stream);
            return;
        }

        let worker = Arc::clone(&self.worker);
        let tls = self.tls.clone();
        let submitted = self.pool.submit(move || {
            worker.prepare(&stream);
            let transport: Box<dyn Transport> = match tls {
                None => Box::new(stream),
                Some(config) => match rustls::ServerConnection::new(config) {
                    Ok(conn) => Box::new(rustls::StreamOwned::new(conn, stream)),
                    Err(e) => {
                        warn!(peer = ?info.peer, error = %e, "Failed to start TLS session");
                        return;
                    }
                },
            };
            worker.serve(transport, info);
        });
        if !submitted {
            debug!(peer = ?info.peer, "Worker pool shutting down, connection dropped");
        }
    }
}

fn close(stream: &TcpStream) {
    if let Err(e) = stream.shutdown(Shutdown::Both) {
        debug!(error = %e, "Socket shutdown failed");
    }
}

/// Unblock an accept loop parked in `accept` by connecting to it
pub(crate) fn wake(addr: SocketAddr) {
    let mut target = addr;
    if target.ip().is_unspecified() {
        target.set_ip(match target {
            SocketAddr::V4(_) => std::net::Ipv4Addr::LOCALHOST.into(),
            SocketAddr::V6(_) => std::net::Ipv6Addr::LOCALHOST.into(),
        });
    }
    match TcpStream::connect_timeout(&target, Duration::from_millis(250)) {
        Ok(stream) => close(&stream),
        Err(e) => debug!(addr = %target, error = %e, "Wake-up connect failed"),
    }
}
