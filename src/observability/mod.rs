//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! pool / session / monitor events
//!     → logging.rs (tracing events with pool, session and connection fields)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout (tracing-subscriber fmt layer)
//!     → Prometheus scrape endpoint
//! ```
//!
//! # Design Decisions
//! - Metric updates are fire-and-forget; no recorder means no cost beyond a call
//! - Log fields use stable keys (`pool`, `session_id`, `connection_id`)

pub mod logging;
pub mod metrics;
