//! Error taxonomy shared by the pool, session and coordinator layers.

use std::time::Duration;
use thiserror::Error;

/// Result alias used throughout the pooler.
pub type PoolerResult<T> = Result<T, PoolerError>;

/// Errors surfaced by pool, session and routing operations.
#[derive(Debug, Error)]
pub enum PoolerError {
    /// No connection became available within the acquire timeout.
    #[error("pool '{pool}' exhausted: no connection available within {timeout:?}")]
    PoolExhausted { pool: String, timeout: Duration },

    /// The requested pairing policy cannot be honored in the current state.
    #[error("pairing policy violation: {0}")]
    PolicyViolation(String),

    /// I/O failure or protocol desync on a leased backend connection.
    #[error("backend connection broken: {0}")]
    BackendBroken(String),

    /// A health probe against a backend target did not succeed.
    #[error("health probe against {address} failed: {reason}")]
    HealthProbeFailed { address: String, reason: String },

    /// Drain deadline expired with connections still leased.
    #[error("drain deadline expired, {force_closed} connection(s) force-closed")]
    DrainTimeout { force_closed: usize },

    /// The pool no longer issues leases.
    #[error("pool '{0}' is draining")]
    Draining(String),

    /// Startup named a database with no configured pool.
    #[error("unknown target database '{0}'")]
    UnknownTarget(String),

    /// Opening a new backend connection failed.
    #[error("connect to {address} failed: {reason}")]
    Connect { address: String, reason: String },

    /// The waiting session went away before a connection was granted.
    #[error("acquire cancelled")]
    Cancelled,

    /// Malformed or unexpected client frame.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl PoolerError {
    /// Stable code carried in error frames sent to clients.
    pub fn code(&self) -> &'static str {
        match self {
            PoolerError::PoolExhausted { .. } => "pool_exhausted",
            PoolerError::PolicyViolation(_) => "policy_violation",
            PoolerError::BackendBroken(_) => "backend_broken",
            PoolerError::HealthProbeFailed { .. } => "health_probe_failed",
            PoolerError::DrainTimeout { .. } => "drain_timeout",
            PoolerError::Draining(_) => "draining",
            PoolerError::UnknownTarget(_) => "unknown_target",
            PoolerError::Connect { .. } => "connect_failed",
            PoolerError::Cancelled => "cancelled",
            PoolerError::Protocol(_) => "protocol_error",
        }
    }

    /// Whether the client may retry the same request unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PoolerError::PoolExhausted { .. } | PoolerError::Connect { .. }
        )
    }

    /// Connection-level failures are the only ones eligible for a
    /// transparent retry outside a transaction.
    pub fn is_connection_level(&self) -> bool {
        matches!(
            self,
            PoolerError::BackendBroken(_) | PoolerError::Connect { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhausted_is_retryable() {
        let err = PoolerError::PoolExhausted {
            pool: "app".into(),
            timeout: Duration::from_millis(50),
        };
        assert!(err.is_retryable());
        assert_eq!(err.code(), "pool_exhausted");
        assert!(err.to_string().contains("app"));
    }

    #[test]
    fn policy_violation_is_terminal() {
        let err = PoolerError::PolicyViolation("transaction open".into());
        assert!(!err.is_retryable());
        assert!(!err.is_connection_level());
    }

    #[test]
    fn broken_is_connection_level() {
        assert!(PoolerError::BackendBroken("reset".into()).is_connection_level());
        assert!(!PoolerError::Cancelled.is_connection_level());
    }
}
