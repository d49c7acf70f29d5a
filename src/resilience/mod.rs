//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Backend connect or probe:
//!     → timeouts.rs (every external call has a deadline)
//!     → on failure: retries.rs (is a transparent retry allowed?)
//!     → backoff.rs (jittered delay between replacement connects)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; connects and probes always carry one
//! - Requests are retried at most once, never inside a transaction
//! - Jittered backoff keeps replacements from stampeding a recovering target

pub mod backoff;
pub mod retries;
pub mod timeouts;
