//! Accept loop for client connections.

use std::sync::Arc;
use std::time::Duration;

use crate::coordinator::Coordinator;
use crate::lifecycle::Shutdown;
use crate::net::{ClientTracker, Listener, ListenerError};
use crate::proxy::client::serve_client;

/// Pause after a failed accept (e.g. out of file descriptors).
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Accepts clients and runs one session task per connection.
pub struct ProxyServer {
    coordinator: Arc<Coordinator>,
    shutdown: Shutdown,
    tracker: ClientTracker,
    max_frame_bytes: usize,
}

impl ProxyServer {
    pub fn new(coordinator: Arc<Coordinator>, shutdown: Shutdown, max_frame_bytes: usize) -> Self {
        Self {
            coordinator,
            shutdown,
            tracker: ClientTracker::new(),
            max_frame_bytes,
        }
    }

    pub fn tracker(&self) -> &ClientTracker {
        &self.tracker
    }

    /// Accept until shutdown is triggered.
    pub async fn run(&self, listener: Listener) -> Result<(), ListenerError> {
        let mut shutdown_rx = self.shutdown.subscribe();
        if let Ok(addr) = listener.local_addr() {
            tracing::info!(address = %addr, "Accepting client connections");
        }

        while !self.shutdown.is_triggered() {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer, permit)) => {
                        let guard = self.tracker.track(peer);
                        let coordinator = Arc::clone(&self.coordinator);
                        let shutdown = self.shutdown.clone();
                        let max_frame_bytes = self.max_frame_bytes;
                        tokio::spawn(async move {
                            serve_client(stream, Some(peer), coordinator, shutdown, max_frame_bytes).await;
                            drop(guard);
                            drop(permit);
                        });
                    }
                    Err(ListenerError::Accept(e)) => {
                        tracing::warn!(error = %e, "Accept failed");
                        tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    }
                    Err(e) => return Err(e),
                },
                _ = shutdown_rx.recv() => break,
            }
        }

        tracing::info!(active_clients = self.tracker.active_count(), "Stopped accepting client connections");
        Ok(())
    }
}
