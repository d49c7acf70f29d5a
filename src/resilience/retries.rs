//! Retry policy for forwarded requests.
//!
//! # Rules
//! - Only connection-level failures (broken backend, failed connect) qualify
//! - Never while a transaction is open: earlier statements would be lost
//! - At most one retry, on a fresh connection
//! - `PoolExhausted` is returned to the client, never retried here

use crate::config::RetryConfig;
use crate::error::PoolerError;

/// Retries allowed per request.
pub const MAX_REQUEST_RETRIES: u32 = 1;

/// Whether `err` on attempt `attempt` (0-based) may be retried transparently.
pub fn should_retry(
    config: &RetryConfig,
    err: &PoolerError,
    in_transaction: bool,
    attempt: u32,
) -> bool {
    config.enabled && !in_transaction && attempt < MAX_REQUEST_RETRIES && err.is_connection_level()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn broken() -> PoolerError {
        PoolerError::BackendBroken("reset".into())
    }

    #[test]
    fn retries_connection_errors_once_outside_transactions() {
        let config = RetryConfig::default();
        assert!(should_retry(&config, &broken(), false, 0));
        assert!(!should_retry(&config, &broken(), false, 1));
        assert!(!should_retry(&config, &broken(), true, 0));
    }

    #[test]
    fn never_retries_exhaustion_or_policy_errors() {
        let config = RetryConfig::default();
        let exhausted = PoolerError::PoolExhausted {
            pool: "app".into(),
            timeout: Duration::from_secs(1),
        };
        assert!(!should_retry(&config, &exhausted, false, 0));
        assert!(!should_retry(&config, &PoolerError::PolicyViolation("x".into()), false, 0));
    }

    #[test]
    fn disabled_config_never_retries() {
        let config = RetryConfig {
            enabled: false,
            ..RetryConfig::default()
        };
        assert!(!should_retry(&config, &broken(), false, 0));
    }
}
