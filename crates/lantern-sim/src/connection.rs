//! Simulated connection pool.
//!
//! Models browser connection limits: a global cap on parallel requests, a
//! per-origin cap for HTTP/1.1, and effectively unlimited multiplexing for
//! H2 origins. The first connection to an origin is "cold" and pays the
//! handshake cost; later grants to the same origin are warm.

use std::collections::HashMap;

#[derive(Debug, Default)]
struct OriginState {
    warmed: bool,
    in_use: usize,
}

/// A granted simulated connection.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionGrant {
    /// Whether this connection pays DNS/TCP/TLS setup.
    pub cold: bool,
}

/// Pool of simulated connections, keyed by origin.
#[derive(Debug)]
pub struct ConnectionPool {
    max_connections: usize,
    max_per_origin: usize,
    active: usize,
    origins: HashMap<String, OriginState>,
}

impl ConnectionPool {
    pub fn new(max_connections: usize, max_per_origin: usize) -> Self {
        Self {
            max_connections,
            max_per_origin,
            active: 0,
            origins: HashMap::new(),
        }
    }

    /// Try to take a connection for `origin`. Returns `None` when the global
    /// cap, or the per-origin cap for non-H2 origins, is exhausted.
    pub fn try_acquire(&mut self, origin: &str, h2: bool) -> Option<ConnectionGrant> {
        if self.active >= self.max_connections {
            return None;
        }
        let state = self.origins.entry(origin.to_string()).or_default();
        if !h2 && state.in_use >= self.max_per_origin {
            return None;
        }
        self.active += 1;
        state.in_use += 1;
        let cold = !state.warmed;
        state.warmed = true;
        Some(ConnectionGrant { cold })
    }

    pub fn release(&mut self, origin: &str) {
        self.active = self.active.saturating_sub(1);
        if let Some(state) = self.origins.get_mut(origin) {
            state.in_use = state.in_use.saturating_sub(1);
        }
    }

    pub fn active(&self) -> usize {
        self.active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_grant_is_cold_then_warm() {
        let mut pool = ConnectionPool::new(10, 6);
        let first = pool.try_acquire("https://example.com", false).unwrap();
        assert!(first.cold);
        let second = pool.try_acquire("https://example.com", false).unwrap();
        assert!(!second.cold);
    }

    #[test]
    fn test_per_origin_cap_applies_to_http1_only() {
        let mut pool = ConnectionPool::new(10, 2);
        assert!(pool.try_acquire("https://a.com", false).is_some());
        assert!(pool.try_acquire("https://a.com", false).is_some());
        assert!(pool.try_acquire("https://a.com", false).is_none());
        // H2 multiplexes past the per-origin cap.
        assert!(pool.try_acquire("https://b.com", true).is_some());
        assert!(pool.try_acquire("https://b.com", true).is_some());
        assert!(pool.try_acquire("https://b.com", true).is_some());
    }

    #[test]
    fn test_global_cap_and_release() {
        let mut pool = ConnectionPool::new(2, 6);
        assert!(pool.try_acquire("https://a.com", false).is_some());
        assert!(pool.try_acquire("https://b.com", false).is_some());
        assert!(pool.try_acquire("https://c.com", false).is_none());
        pool.release("https://a.com");
        assert_eq!(pool.active(), 1);
        assert!(pool.try_acquire("https://c.com", false).is_some());
    }
}
