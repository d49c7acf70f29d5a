//! Backend subsystem.
//!
//! # Data Flow
//! ```text
//! Coordinator
//!     → pool.rs (acquire: idle | open below max | FIFO wait)
//!     → Lease (exclusive use of one connection)
//!     → connection.rs (request → frames up to ready)
//!     → transport.rs (TCP, or in-memory in tests)
//!     → database server
//!
//! Lease::release
//!     → clean: idle again, or straight to the next waiter
//!     → broken / mid-transaction / stale target: closed, slot reused
//! ```
//!
//! # Design Decisions
//! - Connections know their pool by name only; leases hold a `Weak` pool handle
//! - Connection I/O goes through traits so pools are testable without sockets

pub mod connection;
pub mod pool;
pub mod transport;

pub use connection::{BackendConnection, ConnectionId, ConnectionState, Response};
pub use pool::{BackendPool, DrainReport, Lease, PoolSettings, PoolStatus, ReleaseOutcome};
pub use transport::{Connector, TcpConnector, Transport};
