//! Periodic health checking and failover.
//!
//! # Responsibilities
//! - Probe idle connections on a fixed interval, independent of traffic
//! - Top pools back up to `min_size` and reap long-idle connections
//! - Mark a target degraded past the failure threshold and switch it to
//!   its standby when one is configured

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time;

use crate::backend::pool::{BackendPool, ProbeReport};
use crate::config::{HealthCheckConfig, PoolerConfig};
use crate::lifecycle::Shutdown;

/// What one monitor tick did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CheckReport {
    pub probe: ProbeReport,
    pub opened: usize,
    pub reaped: usize,
    pub failed_over_to: Option<String>,
}

/// Health monitor for a single pool.
pub struct HealthMonitor {
    pool: Arc<BackendPool>,
    config: HealthCheckConfig,
    interval: Duration,
}

impl HealthMonitor {
    pub fn new(pool: Arc<BackendPool>, config: HealthCheckConfig, interval: Duration) -> Self {
        Self {
            pool,
            config,
            interval,
        }
    }

    /// Start one monitor task per pool.
    pub fn spawn_all<'a>(
        pools: impl IntoIterator<Item = &'a Arc<BackendPool>>,
        config: &PoolerConfig,
        shutdown: &Shutdown,
    ) -> Vec<JoinHandle<()>> {
        pools
            .into_iter()
            .map(|pool| {
                let interval = config
                    .target(pool.name())
                    .and_then(|t| t.health_check_interval_secs)
                    .unwrap_or(config.health_check.interval_secs);
                let monitor = HealthMonitor::new(
                    Arc::clone(pool),
                    config.health_check.clone(),
                    Duration::from_secs(interval),
                );
                tokio::spawn(monitor.run(shutdown.subscribe()))
            })
            .collect()
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        if !self.config.enabled {
            tracing::info!(pool = %self.pool.name(), "Health probes disabled; only sizing is maintained");
        }
        tracing::info!(
            pool = %self.pool.name(),
            interval_secs = self.interval.as_secs(),
            "Health monitor starting"
        );

        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.check().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!(pool = %self.pool.name(), "Health monitor received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Run one tick: probe, top up, reap, then escalate.
    pub async fn check(&self) -> CheckReport {
        let mut report = CheckReport::default();

        if self.config.enabled {
            report.probe = self
                .pool
                .probe_idle(self.config.probe_timeout(), self.config.unhealthy_threshold)
                .await;
        }
        report.opened = self.pool.top_up().await;
        report.reaped = self.pool.reap_idle();

        let health = self.pool.health();
        let failures = health.failures();
        if failures >= self.config.degraded_threshold {
            if health.mark_degraded() {
                tracing::warn!(
                    pool = %self.pool.name(),
                    address = %self.pool.address(),
                    failures,
                    "Target degraded"
                );
            }
            if self.pool.has_standby() && !self.pool.on_standby() {
                report.failed_over_to = self.pool.fail_over();
                if report.failed_over_to.is_some() {
                    report.opened += self.pool.top_up().await;
                }
            }
        }
        report
    }
}
