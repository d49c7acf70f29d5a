//! Client session subsystem.
//!
//! # Data Flow
//! ```text
//! startup frame
//!     → Coordinator::open_session (target + pairing policy)
//!     → ClientSession (client.rs)
//!
//! each request:
//!     → BoundaryDetector marks begin / commit / rollback
//!     → state.rs advances None / Active / Failed from the response
//!     → binding kept or released per pairing policy
//! ```
//!
//! # Design Decisions
//! - A session never inspects payloads itself; markers come from the detector
//! - The session owns its lease; the coordinator only sees summaries

pub mod client;
pub mod state;

pub use client::{ClientSession, SessionId, SessionSummary};
pub use state::TxnState;
