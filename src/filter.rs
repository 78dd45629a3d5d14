//! Connection filters.
//!
//! Filters run on the accept thread, in order, before a connection is handed
//! to the worker pool. The first filter returning `false` causes the socket
//! to be shut down immediately; a rejected connection never consumes a
//! worker slot.

use crate::request::Protocol;
use dashmap::DashMap;
use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, Instant};
use tracing::debug;

/// Entries kept before expired throttle windows are pruned
const THROTTLE_PRUNE_THRESHOLD: usize = 4096;

/// What a filter may inspect about an accepted socket
#[derive(Debug, Clone, Copy)]
pub struct ConnectionInfo {
    /// Peer address; `None` if the socket was already closed by the peer
    pub peer: Option<SocketAddr>,
    pub local: Option<SocketAddr>,
    pub protocol: Protocol,
}

/// Accept/reject predicate evaluated once per accepted connection
pub trait ConnectionFilter: Send + Sync {
    fn name(&self) -> &str;

    fn accept(&self, conn: &ConnectionInfo) -> bool;
}

/// Rejects sockets whose peer is already gone
#[derive(Debug, Default, Clone, Copy)]
pub struct ActiveConnectionFilter;

impl ConnectionFilter for ActiveConnectionFilter {
    fn name(&self) -> &str {
        "active-connection"
    }

    fn accept(&self, conn: &ConnectionInfo) -> bool {
        conn.peer.is_some()
    }
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    attempts: u32,
}

/// Limits connection attempts per peer IP within a fixed time window
///
/// A `limit` of zero disables throttling.
#[derive(Debug)]
pub struct ConnectionThrottle {
    limit: u32,
    window: Duration,
    attempts: DashMap<IpAddr, Window>,
}

impl ConnectionThrottle {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            attempts: DashMap::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.limit > 0
    }

    /// Number of peers currently tracked
    pub fn tracked_peers(&self) -> usize {
        self.attempts.len()
    }

    fn prune(&self, now: Instant) {
        self.attempts
            .retain(|_, w| now.duration_since(w.started) < self.window);
    }

    fn record(&self, ip: IpAddr, now: Instant) -> u32 {
        let mut entry = self.attempts.entry(ip).or_insert(Window {
            started: now,
            attempts: 0,
        });
        if now.duration_since(entry.started) >= self.window {
            entry.started = now;
            entry.attempts = 0;
        }
        entry.attempts = entry.attempts.saturating_add(1);
        entry.attempts
    }
}

impl ConnectionFilter for ConnectionThrottle {
    fn name(&self) -> &str {
        "throttle"
    }

    fn accept(&self, conn: &ConnectionInfo) -> bool {
        if !self.is_enabled() {
            return true;
        }
        let Some(peer) = conn.peer else {
            return true;
        };
        let now = Instant::now();
        if self.attempts.len() > THROTTLE_PRUNE_THRESHOLD {
            self.prune(now);
        }
        let attempts = self.record(peer.ip(), now);
        if attempts > self.limit {
            debug!(
                peer = %peer,
                attempts,
                limit = self.limit,
                "Connection throttled"
            );
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(peer: Option<&str>) -> ConnectionInfo {
        ConnectionInfo {
            peer: peer.map(|p| p.parse().unwrap()),
            local: None,
            protocol: Protocol::Plain,
        }
    }

    #[test]
    fn test_active_filter_rejects_closed_peer() {
        let filter = ActiveConnectionFilter;
        assert!(filter.accept(&info(Some("127.0.0.1:5000"))));
        assert!(!filter.accept(&info(None)));
    }

    #[test]
    fn test_throttle_limits_per_ip() {
        let throttle = ConnectionThrottle::new(2, Duration::from_secs(60));
        let a = info(Some("10.0.0.1:1000"));
        let a_other_port = info(Some("10.0.0.1:1001"));
        let b = info(Some("10.0.0.2:1000"));
        assert!(throttle.accept(&a));
        assert!(throttle.accept(&a_other_port));
        assert!(!throttle.accept(&a));
        assert!(throttle.accept(&b));
        assert_eq!(throttle.tracked_peers(), 2);
    }

    #[test]
    fn test_throttle_window_resets() {
        let throttle = ConnectionThrottle::new(1, Duration::from_millis(20));
        let a = info(Some("10.0.0.1:1000"));
        assert!(throttle.accept(&a));
        assert!(!throttle.accept(&a));
        std::thread::sleep(Duration::from_millis(30));
        assert!(throttle.accept(&a));
    }

    #[test]
    fn test_throttle_disabled_with_zero_limit() {
        let throttle = ConnectionThrottle::new(0, Duration::from_secs(1));
        let a = info(Some("10.0.0.1:1000"));
        for _ in 0..100 {
            assert!(throttle.accept(&a));
        }
        assert_eq!(throttle.tracked_peers(), 0);
    }
}
