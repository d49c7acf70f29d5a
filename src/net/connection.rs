//! Client connection tracking for graceful shutdown.
//!
//! # Responsibilities
//! - Count connected clients
//! - Let shutdown wait, with a deadline, until every client has left

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

/// Tracks connected clients.
#[derive(Debug, Clone)]
pub struct ClientTracker {
    count: Arc<watch::Sender<usize>>,
}

impl ClientTracker {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(0);
        Self {
            count: Arc::new(tx),
        }
    }

    /// Record a connected client. The guard unregisters it on drop.
    pub fn track(&self, peer: SocketAddr) -> ClientGuard {
        self.count.send_modify(|n| *n += 1);
        ClientGuard {
            count: Arc::clone(&self.count),
            peer,
        }
    }

    pub fn active_count(&self) -> usize {
        *self.count.borrow()
    }

    /// Wait until no clients remain. Returns false if `timeout` passed first.
    pub async fn wait_until_empty(&self, timeout: Duration) -> bool {
        let mut rx = self.count.subscribe();
        let emptied = tokio::time::timeout(timeout, rx.wait_for(|n| *n == 0))
            .await
            .is_ok();
        emptied
    }
}

impl Default for ClientTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Registration of one connected client.
#[derive(Debug)]
pub struct ClientGuard {
    count: Arc<watch::Sender<usize>>,
    peer: SocketAddr,
}

impl ClientGuard {
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }
}

impl Drop for ClientGuard {
    fn drop(&mut self) {
        self.count.send_modify(|n| *n = n.saturating_sub(1));
        tracing::trace!(peer_addr = %self.peer, "Client connection closed");
    }
}
