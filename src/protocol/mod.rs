//! Wire framing subsystem.
//!
//! # Data Flow
//! ```text
//! byte stream (client or backend)
//!     → codec.rs (tag + length + payload)
//!     → frame.rs (Frame, startup parameters, error frames)
//!     → detector.rs (begin / commit / rollback / error / ready markers)
//! ```
//!
//! # Design Decisions
//! - Payloads stay opaque; only markers are interpreted
//! - Detection is a trait so the coordinator stays dialect-agnostic

pub mod codec;
pub mod detector;
pub mod frame;

pub use detector::{
    BoundaryDetector, DetectorKind, KeywordDetector, RequestMarker, ResponseMarker, TaggedDetector,
};
pub use frame::{tag, Frame};
