//! OS signal handling.
//!
//! SIGINT and SIGTERM begin a graceful shutdown. A second signal while
//! draining exits immediately.

use crate::lifecycle::Shutdown;

/// Wait for the first shutdown signal.
pub async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => tracing::info!("SIGINT received"),
                    _ = term.recv() => tracing::info!("SIGTERM received"),
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Cannot listen for SIGTERM, falling back to SIGINT only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("Ctrl-C received");
    }
}

/// Trigger `shutdown` on the first signal; exit the process on the second.
pub fn spawn_signal_handler(shutdown: Shutdown) {
    tokio::spawn(async move {
        wait_for_signal().await;
        tracing::info!("Graceful shutdown started");
        shutdown.trigger();

        wait_for_signal().await;
        tracing::warn!("Second signal received, exiting without draining");
        std::process::exit(130);
    });
}
