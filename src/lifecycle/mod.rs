//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Metrics → Pools + warm-up → Monitors → Admin → Config watcher → Listener
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → Close idle sessions
//!     → Drain pools (force-close at deadline) → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//!     Second signal → Exit immediately
//! ```
//!
//! # Design Decisions
//! - Listener binds last, so clients only arrive once pools are warm
//! - Open transactions are allowed to finish until the drain deadline

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
