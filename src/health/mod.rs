//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! monitor.rs (one task per pool, fixed interval):
//!     → BackendPool::probe_idle (no-op round trip per idle connection)
//!     → BackendPool::top_up / reap_idle
//!     → state.rs (consecutive target failures)
//!     → past degraded_threshold: BackendPool::fail_over to the standby
//! ```
//!
//! # Design Decisions
//! - Probes run on a timer, never triggered by traffic
//! - Connection health (probe streak) and target health (failure streak) are tracked separately
//! - Failover is one-way; returning to the primary needs a restart

pub mod monitor;
pub mod state;

pub use monitor::HealthMonitor;
pub use state::TargetHealth;
