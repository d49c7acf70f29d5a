//! One accepted client connection's pooling state.

use std::net::SocketAddr;

use serde::Serialize;
use tokio::time::Instant;
use uuid::Uuid;

use crate::backend::connection::ConnectionId;
use crate::backend::pool::Lease;
use crate::coordinator::PairingPolicy;
use crate::session::state::TxnState;

/// Unique identifier for a client session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A client session.
///
/// Owned by the task serving the client; the coordinator keeps a
/// [`SessionSummary`] of it for the admin surface.
#[derive(Debug)]
pub struct ClientSession {
    pub(crate) id: SessionId,
    pub(crate) target: String,
    pub(crate) policy: PairingPolicy,
    pub(crate) txn: TxnState,
    pub(crate) binding: Option<Lease>,
    pub(crate) peer: Option<SocketAddr>,
    pub(crate) requests: u64,
    started: Instant,
}

impl ClientSession {
    pub(crate) fn new(target: &str, policy: PairingPolicy, peer: Option<SocketAddr>) -> Self {
        Self {
            id: SessionId::new(),
            target: target.to_string(),
            policy,
            txn: TxnState::None,
            binding: None,
            peer,
            requests: 0,
            started: Instant::now(),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Name of the pool this session routes to.
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn policy(&self) -> PairingPolicy {
        self.policy
    }

    pub fn txn(&self) -> TxnState {
        self.txn
    }

    pub fn bound_connection(&self) -> Option<ConnectionId> {
        self.binding.as_ref().map(|lease| lease.id())
    }

    /// At a request boundary with no transaction open.
    pub fn is_idle(&self) -> bool {
        !self.txn.is_open()
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            id: self.id,
            target: self.target.clone(),
            policy: self.policy,
            transaction: self.txn,
            bound_connection: self.bound_connection(),
            peer: self.peer.map(|p| p.to_string()),
            requests: self.requests,
            age_secs: self.started.elapsed().as_secs(),
        }
    }
}

/// Admin-facing snapshot of a session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub id: SessionId,
    pub target: String,
    pub policy: PairingPolicy,
    pub transaction: TxnState,
    pub bound_connection: Option<ConnectionId>,
    pub peer: Option<String>,
    pub requests: u64,
    pub age_secs: u64,
}
