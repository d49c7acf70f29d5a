//! Timeout enforcement.
//!
//! Connects and health probes run under a deadline; a timed-out probe
//! counts as a failed probe, a timed-out connect as a connect error.

use std::future::Future;
use std::time::Duration;

pub use tokio::time::error::Elapsed;

/// Run `fut` with a deadline.
pub async fn with_timeout<F, T>(duration: Duration, fut: F) -> Result<T, Elapsed>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(duration, fut).await
}
