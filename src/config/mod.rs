//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → PoolerConfig (validated, immutable)
//!     → one BackendPool per [[targets]] entry
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → Coordinator::apply_config swaps per-pool settings
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Reload changes sizing and timeouts live; the target set is fixed at startup

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use schema::PoolerConfig;
pub use schema::ListenerConfig;
pub use schema::TargetConfig;
pub use schema::HealthCheckConfig;
pub use schema::RetryConfig;
