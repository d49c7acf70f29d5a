//! Per-target health state.
//!
//! # State Transitions
//! ```text
//! Healthy → Degraded: consecutive failures >= degraded_threshold
//! Degraded → Healthy: any successful probe or connect
//! ```
//!
//! A failover clears the failure streak but not the degraded flag; the
//! flag drops once the new address answers.
//!
//! Failures are probe failures and failed connects against the pool's
//! current address. Counters are atomics so probes and connects can
//! report without the pool lock.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

#[derive(Debug, Default)]
pub struct TargetHealth {
    consecutive_failures: AtomicU32,
    degraded: AtomicBool,
}

impl TargetHealth {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report a successful probe or connect.
    pub fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::Relaxed);
        if self.degraded.swap(false, Ordering::Relaxed) {
            tracing::info!("Target recovered from degraded state");
        }
    }

    /// Report a failure; returns the consecutive failure count.
    pub fn record_failure(&self) -> u32 {
        self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Flag the target degraded. Returns true on the transition only.
    pub fn mark_degraded(&self) -> bool {
        !self.degraded.swap(true, Ordering::Relaxed)
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Relaxed)
    }

    pub fn failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Relaxed)
    }

    /// Restart the failure streak, e.g. after switching to a different
    /// address. The degraded flag is kept until a success is recorded.
    pub fn clear_failures(&self) {
        self.consecutive_failures.store(0, Ordering::Relaxed);
    }
}
