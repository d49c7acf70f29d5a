//! Metrics collection and exposition.
//!
//! # Metrics
//! - `tidepool_acquire_total` (counter): acquisitions by pool, outcome
//! - `tidepool_acquire_wait_seconds` (histogram): time spent acquiring
//! - `tidepool_connections_opened_total` / `_closed_total` (counter)
//! - `tidepool_probe_failures_total` (counter): failed health probes
//! - `tidepool_failovers_total` (counter): switches to a standby
//! - `tidepool_policy_violations_total` (counter)
//! - `tidepool_pool_idle` / `_leased` / `_waiting` (gauge): per pool
//! - `tidepool_active_sessions` (gauge)
//!
//! Without an installed recorder every call is a no-op.

use std::net::SocketAddr;
use std::time::Duration;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_acquire(pool: &str, outcome: &'static str, wait: Duration) {
    metrics::counter!("tidepool_acquire_total", "pool" => pool.to_string(), "outcome" => outcome)
        .increment(1);
    metrics::histogram!("tidepool_acquire_wait_seconds", "pool" => pool.to_string())
        .record(wait.as_secs_f64());
}

pub fn record_connection_opened(pool: &str) {
    metrics::counter!("tidepool_connections_opened_total", "pool" => pool.to_string()).increment(1);
}

pub fn record_connection_closed(pool: &str, reason: &'static str) {
    metrics::counter!("tidepool_connections_closed_total", "pool" => pool.to_string(), "reason" => reason)
        .increment(1);
}

pub fn record_probe_failure(pool: &str) {
    metrics::counter!("tidepool_probe_failures_total", "pool" => pool.to_string()).increment(1);
}

pub fn record_failover(pool: &str) {
    metrics::counter!("tidepool_failovers_total", "pool" => pool.to_string()).increment(1);
}

pub fn record_policy_violation(pool: &str) {
    metrics::counter!("tidepool_policy_violations_total", "pool" => pool.to_string()).increment(1);
}

pub fn set_pool_gauges(pool: &str, idle: usize, leased: usize, waiting: usize) {
    metrics::gauge!("tidepool_pool_idle", "pool" => pool.to_string()).set(idle as f64);
    metrics::gauge!("tidepool_pool_leased", "pool" => pool.to_string()).set(leased as f64);
    metrics::gauge!("tidepool_pool_waiting", "pool" => pool.to_string()).set(waiting as f64);
}

pub fn set_active_sessions(count: usize) {
    metrics::gauge!("tidepool_active_sessions").set(count as f64);
}
