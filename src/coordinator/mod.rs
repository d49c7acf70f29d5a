//! Pooling coordinator.
//!
//! # Data Flow
//! ```text
//! client request (Frame)
//!     → engine.rs: BoundaryDetector marks begin / commit / rollback
//!     → policy.rs decides whether a binding is needed and for how long
//!     → BackendPool::acquire (FIFO, cancellable, bounded)
//!     → Lease::exchange
//!     → TxnState advanced from the response, binding kept or released
//! ```
//!
//! # Design Decisions
//! - Routing uses only the target named at startup, never request content
//! - The pool map is fixed after startup; the session map is a `DashMap`
//! - No lock spans more than one pool

pub mod engine;
pub mod policy;

pub use engine::Coordinator;
pub use policy::PairingPolicy;
