//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the pooler.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::coordinator::PairingPolicy;
use crate::protocol::DetectorKind;

/// Root configuration for the pooler.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct PoolerConfig {
    /// Client listener configuration.
    pub listener: ListenerConfig,

    /// Logical database targets, one pool each.
    pub targets: Vec<TargetConfig>,

    /// Health check and failover settings.
    pub health_check: HealthCheckConfig,

    /// Retry configuration for connection-level failures.
    pub retries: RetryConfig,

    /// Shutdown behavior.
    pub shutdown: ShutdownConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    pub admin: AdminConfig,
}

impl PoolerConfig {
    /// Look up a target by name.
    pub fn target(&self, name: &str) -> Option<&TargetConfig> {
        self.targets.iter().find(|t| t.name == name)
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:6432").
    pub bind_address: String,

    /// Maximum concurrent client connections (backpressure).
    pub max_connections: usize,

    /// Largest frame payload accepted from clients or backends.
    pub max_frame_bytes: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:6432".to_string(),
            max_connections: 10_000,
            max_frame_bytes: 16 * 1024 * 1024,
        }
    }
}

/// A logical database target and its pool sizing.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TargetConfig {
    /// Database name clients send in their startup frame.
    pub name: String,

    /// Primary backend address (e.g., "10.0.0.5:5432").
    pub address: String,

    /// Promoted-standby address used on failover.
    #[serde(default)]
    pub standby_address: Option<String>,

    /// Connections kept open while the pool is running.
    #[serde(default = "default_min_size")]
    pub min_size: usize,

    /// Hard cap on connections to this target.
    #[serde(default = "default_max_size")]
    pub max_size: usize,

    /// Default pairing policy for sessions on this target.
    #[serde(default)]
    pub pairing: PairingPolicy,

    /// How long a session may wait for a connection.
    #[serde(default = "default_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,

    /// Timeout for establishing a backend connection.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Per-target probe interval; falls back to `[health_check]`.
    #[serde(default)]
    pub health_check_interval_secs: Option<u64>,

    /// Idle connections older than this are closed (never below min_size).
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    /// Transaction-boundary dialect.
    #[serde(default)]
    pub detector: DetectorKind,
}

fn default_min_size() -> usize {
    1
}

fn default_max_size() -> usize {
    20
}

fn default_acquire_timeout_ms() -> u64 {
    5_000
}

fn default_connect_timeout_ms() -> u64 {
    3_000
}

fn default_idle_timeout_secs() -> u64 {
    600
}

impl TargetConfig {
    /// Minimal target with defaults for everything but name and address.
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            standby_address: None,
            min_size: default_min_size(),
            max_size: default_max_size(),
            pairing: PairingPolicy::default(),
            acquire_timeout_ms: default_acquire_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            health_check_interval_secs: None,
            idle_timeout_secs: default_idle_timeout_secs(),
            detector: DetectorKind::default(),
        }
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

/// Health check configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Enable background probing.
    pub enabled: bool,

    /// Default probe interval in seconds.
    pub interval_secs: u64,

    /// Probe timeout in seconds.
    pub timeout_secs: u64,

    /// Consecutive probe failures before a connection is marked broken.
    pub unhealthy_threshold: u32,

    /// Consecutive failures against a target before the pool is degraded.
    pub degraded_threshold: u32,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 10,
            timeout_secs: 2,
            unhealthy_threshold: 3,
            degraded_threshold: 5,
        }
    }
}

impl HealthCheckConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Retry configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retry connection-level failures once when no transaction is open.
    pub enabled: bool,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,

    /// Attempts made when opening a replacement connection in the background.
    pub replacement_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_delay_ms: 50,
            max_delay_ms: 2000,
            replacement_attempts: 3,
        }
    }
}

/// Shutdown configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Deadline for draining leased connections in seconds.
    pub drain_timeout_secs: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            drain_timeout_secs: 30,
        }
    }
}

impl ShutdownConfig {
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9187".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:6433".to_string(),
        }
    }
}
