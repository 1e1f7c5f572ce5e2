//! Connection metadata shared by the proxy's handler framework

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::net::SocketAddr;
use std::time::Instant;

/// Metadata describing one proxied connection
#[derive(Debug, Clone)]
pub struct ConnectionMeta {
    /// When the downstream connection was accepted
    pub opened_at: Instant,
    /// The downstream (client) address
    pub client_addr: SocketAddr,
    /// The upstream (protected service) address
    pub upstream_addr: SocketAddr,
}

impl ConnectionMeta {
    /// Record a new connection's metadata, stamping the open time as now
    ///
    /// # Arguments
    ///
    /// * `client_addr` - The downstream peer address
    /// * `upstream_addr` - The address dialed upstream
    #[must_use]
    pub fn new(client_addr: SocketAddr, upstream_addr: SocketAddr) -> Self {
        ConnectionMeta {
            opened_at: Instant::now(),
            client_addr,
            upstream_addr,
        }
    }

    /// A non-cryptographic hash identifying this connection, useful as a log/metric key
    #[must_use]
    pub fn hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.client_addr.hash(&mut hasher);
        self.upstream_addr.hash(&mut hasher);
        hasher.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_stable_for_identical_addresses() {
        let client: SocketAddr = "127.0.0.1:1000".parse().unwrap();
        let upstream: SocketAddr = "127.0.0.1:2000".parse().unwrap();
        let a = ConnectionMeta::new(client, upstream);
        let b = ConnectionMeta::new(client, upstream);
        assert_eq!(a.hash(), b.hash());
    }
}
