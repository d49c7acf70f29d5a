//! Delays between attempts to open replacement connections.

use rand::Rng;
use std::time::Duration;

use crate::config::RetryConfig;

/// Delay before replacement attempt `attempt`; the first attempt is immediate.
///
/// Doubles from `base_delay_ms` up to `max_delay_ms`, plus up to 10% jitter
/// so pools refilling after the same outage do not reconnect in lockstep.
pub fn replacement_delay(config: &RetryConfig, attempt: u32) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    let factor = 1u64.checked_shl(attempt - 1).unwrap_or(u64::MAX);
    let delay = config.base_delay_ms.saturating_mul(factor).min(config.max_delay_ms);

    let jitter = match delay / 10 {
        0 => 0,
        spread => rand::thread_rng().gen_range(0..spread),
    };
    Duration::from_millis(delay + jitter)
}
