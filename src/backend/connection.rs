//! A single physical backend connection.
//!
//! # Responsibilities
//! - Hold the transport and its lifecycle state
//! - Run one request/response exchange at a time
//! - Answer health probes
//!
//! The owning pool is referenced by name only; connections never hold a
//! pointer back to their pool.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::time::Instant;

use crate::backend::transport::Transport;
use crate::error::{PoolerError, PoolerResult};
use crate::protocol::{BoundaryDetector, Frame, ResponseMarker};

/// Global atomic counter for connection IDs.
/// Using relaxed ordering is sufficient since we only need uniqueness, not synchronization.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a backend connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn next() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "backend-{}", self.0)
    }
}

/// Lifecycle state of a backend connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// In the pool, available for lease.
    Idle,
    /// Leased to a session, no transaction open.
    Leased,
    /// Leased to a session with a transaction open; must not be reused.
    InTransaction,
    /// I/O error, desync or failed probes; will be closed.
    Broken,
}

/// Everything the backend sent for one request, up to its ready frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Response {
    pub frames: Vec<Frame>,
    /// The backend reported an error for this request.
    pub failed: bool,
}

/// A physical connection owned by exactly one pool.
#[derive(Debug)]
pub struct BackendConnection {
    id: ConnectionId,
    pool: String,
    address: String,
    generation: u64,
    pub(crate) state: ConnectionState,
    created_at: Instant,
    pub(crate) last_activity: Instant,
    pub(crate) probe_failures: u32,
    /// Set while an exchange is between send and ready. Still set when
    /// an exchange starts means the previous one was abandoned.
    in_flight: bool,
    transport: Box<dyn Transport>,
}

impl BackendConnection {
    pub(crate) fn new(
        pool: &str,
        address: &str,
        generation: u64,
        transport: Box<dyn Transport>,
    ) -> Self {
        let now = Instant::now();
        Self {
            id: ConnectionId::next(),
            pool: pool.to_string(),
            address: address.to_string(),
            generation,
            state: ConnectionState::Idle,
            created_at: now,
            last_activity: now,
            probe_failures: 0,
            in_flight: false,
            transport,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Name of the owning pool.
    pub fn pool(&self) -> &str {
        &self.pool
    }

    /// Address this connection was opened against.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Target generation at open time; bumped by failover.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    pub fn idle_for(&self) -> Duration {
        self.last_activity.elapsed()
    }

    pub fn is_broken(&self) -> bool {
        self.state == ConnectionState::Broken
    }

    pub(crate) fn mark_broken(&mut self) {
        self.state = ConnectionState::Broken;
    }

    /// Send one request and collect the response up to the ready frame.
    ///
    /// Any transport failure, or an earlier exchange abandoned before its
    /// ready frame, leaves the connection `Broken`.
    pub async fn exchange(
        &mut self,
        request: &Frame,
        detector: &dyn BoundaryDetector,
    ) -> PoolerResult<Response> {
        if self.is_broken() {
            return Err(PoolerError::BackendBroken(format!(
                "{} is already broken",
                self.id
            )));
        }
        if self.in_flight {
            self.mark_broken();
            return Err(PoolerError::BackendBroken(format!(
                "{} has an unfinished response pending",
                self.id
            )));
        }
        self.last_activity = Instant::now();
        self.in_flight = true;

        if let Err(e) = self.transport.send(request).await {
            self.mark_broken();
            return Err(PoolerError::BackendBroken(format!("send to {}: {}", self.address, e)));
        }

        let mut response = Response::default();
        loop {
            let frame = match self.transport.recv().await {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    self.mark_broken();
                    return Err(PoolerError::BackendBroken(format!(
                        "{} closed the connection mid-response",
                        self.address
                    )));
                }
                Err(e) => {
                    self.mark_broken();
                    return Err(PoolerError::BackendBroken(format!(
                        "receive from {}: {}",
                        self.address, e
                    )));
                }
            };

            match detector.classify_response(&frame) {
                ResponseMarker::Error => response.failed = true,
                ResponseMarker::Ready => {
                    self.in_flight = false;
                    response.frames.push(frame);
                    break;
                }
                ResponseMarker::Other => {}
            }
            response.frames.push(frame);
        }

        self.last_activity = Instant::now();
        Ok(response)
    }

    /// Round-trip the detector's no-op frame within `timeout`.
    ///
    /// Probes do not count as activity for idle reaping. A probe that
    /// times out may have been cut mid-frame, so the connection is marked
    /// broken.
    pub async fn probe(
        &mut self,
        detector: &dyn BoundaryDetector,
        timeout: Duration,
    ) -> PoolerResult<()> {
        let probe = detector.probe_frame();
        let last_activity = self.last_activity;
        let result = crate::resilience::timeouts::with_timeout(
            timeout,
            self.exchange(&probe, detector),
        )
        .await;
        self.last_activity = last_activity;

        let reason = match result {
            Ok(Ok(response)) if !response.failed => return Ok(()),
            Ok(Ok(_)) => "backend answered the probe with an error".to_string(),
            Ok(Err(e)) => e.to_string(),
            Err(elapsed) => {
                self.mark_broken();
                elapsed.to_string()
            }
        };
        Err(PoolerError::HealthProbeFailed {
            address: self.address.clone(),
            reason,
        })
    }

    /// Close the transport and consume the connection.
    pub(crate) fn close(mut self) {
        self.state = ConnectionState::Broken;
        self.transport.close();
        tracing::trace!(connection_id = %self.id, pool = %self.pool, "Backend connection closed");
    }
}
