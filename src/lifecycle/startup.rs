//! Startup orchestration.
//!
//! # Responsibilities
//! - Initialize subsystems in dependency order
//! - Start background tasks (health monitors, metrics, config reload)
//! - Bind the client listener and serve until shutdown
//! - Drain pools and wait for sessions on the way out

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures_util::future::join_all;
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::admin::{serve_admin, AdminState};
use crate::backend::TcpConnector;
use crate::config::watcher::ConfigWatcher;
use crate::config::PoolerConfig;
use crate::coordinator::Coordinator;
use crate::health::HealthMonitor;
use crate::lifecycle::signals::spawn_signal_handler;
use crate::lifecycle::Shutdown;
use crate::net::{Listener, ListenerError};
use crate::proxy::ProxyServer;

/// Fatal errors while bringing the pooler up.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("client listener: {0}")]
    Listener(#[from] ListenerError),
    #[error("invalid metrics address '{0}'")]
    MetricsAddress(String),
}

/// Run the pooler until shutdown completes.
///
/// `config_path`, when given, is watched for changes and reloaded live.
pub async fn run(config: PoolerConfig, config_path: Option<PathBuf>) -> Result<(), StartupError> {
    if config.observability.metrics_enabled {
        let addr = config
            .observability
            .metrics_address
            .parse()
            .map_err(|_| StartupError::MetricsAddress(config.observability.metrics_address.clone()))?;
        crate::observability::metrics::init_metrics(addr);
    }

    let connector = Arc::new(TcpConnector::new(config.listener.max_frame_bytes));
    let coordinator = Coordinator::new(&config, connector);
    coordinator.warm_up().await;

    let shutdown = Shutdown::new();
    spawn_signal_handler(shutdown.clone());

    let monitors = HealthMonitor::spawn_all(coordinator.pools(), &config, &shutdown);

    let admin = config.admin.enabled.then(|| {
        let state = AdminState {
            coordinator: Arc::clone(&coordinator),
            shutdown: shutdown.clone(),
        };
        let bind_address = config.admin.bind_address.clone();
        tokio::spawn(async move {
            if let Err(e) = serve_admin(state, &bind_address).await {
                tracing::error!(error = %e, "Admin API stopped");
            }
        })
    });

    let _watcher = config_path
        .as_deref()
        .and_then(|path| spawn_config_reload(path, Arc::clone(&coordinator)));

    let listener = Listener::bind(&config.listener).await?;
    let server = ProxyServer::new(
        Arc::clone(&coordinator),
        shutdown.clone(),
        config.listener.max_frame_bytes,
    );
    server.run(listener).await?;

    tracing::info!(
        sessions = server.tracker().active_count(),
        "Listener closed, draining pools"
    );
    for (pool, report) in coordinator.drain().await {
        tracing::info!(
            pool = %pool,
            closed_idle = report.closed_idle,
            force_closed = report.force_closed,
            "Pool drained"
        );
    }

    let deadline = coordinator.config().shutdown.drain_timeout();
    if !server.tracker().wait_until_empty(deadline).await {
        tracing::warn!(
            sessions = server.tracker().active_count(),
            "Sessions still open after drain"
        );
    }

    join_all(monitors).await;
    if let Some(admin) = admin {
        let _ = admin.await;
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Watch `path` and apply every valid config it produces.
///
/// Returns the watcher, which must stay alive for events to flow.
fn spawn_config_reload(
    path: &Path,
    coordinator: Arc<Coordinator>,
) -> Option<(notify::RecommendedWatcher, JoinHandle<()>)> {
    let (watcher, mut updates) = ConfigWatcher::new(path);
    let watcher = match watcher.run() {
        Ok(watcher) => watcher,
        Err(e) => {
            tracing::warn!(error = %e, path = ?path, "Config reload disabled");
            return None;
        }
    };

    let task = tokio::spawn(async move {
        while let Some(config) = updates.recv().await {
            coordinator.apply_config(config);
        }
    });
    Some((watcher, task))
}
