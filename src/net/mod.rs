//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept, connection limit)
//!     → connection.rs (client tracking for shutdown)
//!     → proxy::client (one session per connection)
//! ```
//!
//! # Design Decisions
//! - Bounded accepts prevent resource exhaustion
//! - Each client is tracked so shutdown can wait for sessions to finish

pub mod connection;
pub mod listener;

pub use connection::{ClientGuard, ClientTracker};
pub use listener::{ConnectionPermit, Listener, ListenerError};
