//! Client-facing proxy.
//!
//! # Data Flow
//! ```text
//! net::Listener::accept
//!     → server.rs (tracking, one task per client)
//!     → client.rs (startup, request loop)
//!         reader task → bounded request queue → Coordinator::handle_request
//!     → response frames written back in request order
//! ```
//!
//! # Design Decisions
//! - Reading runs ahead on its own task so disconnects cancel pending acquires
//! - A session never interleaves responses; requests are served strictly in order

pub mod client;
pub mod server;

pub use client::serve_client;
pub use server::ProxyServer;
