//! Tidepool: a transaction-aware connection pooler.
//!
//! Many client sessions share a small set of backend connections per
//! logical database. A session holds a backend connection only while it
//! needs one: for one request under statement pairing, for a whole
//! transaction under transaction pairing, or for its whole life under
//! session pairing.
//!
//! # Architecture Overview
//!
//! ```text
//!   client ──▶ net::Listener ──▶ proxy::serve_client ──▶ coordinator::Coordinator
//!                                                              │
//!                                                              ▼
//!                       health::HealthMonitor ──▶ backend::BackendPool ──▶ database
//!
//!   admin (axum) ─▶ Coordinator     config::watcher ─▶ Coordinator::apply_config
//! ```

pub mod admin;
pub mod backend;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod health;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod protocol;
pub mod proxy;
pub mod resilience;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

pub use config::PoolerConfig;
pub use coordinator::Coordinator;
pub use error::{PoolerError, PoolerResult};
pub use lifecycle::Shutdown;
