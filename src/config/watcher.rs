//! Configuration file watcher for live reload.
//!
//! Watches the directory holding the file so editors that save by
//! rename-and-replace keep triggering reloads. Only configurations that
//! load and validate are forwarded; anything else is logged and the
//! running configuration stays in place.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::PoolerConfig;

/// Watches one configuration file.
pub struct ConfigWatcher {
    path: PathBuf,
    update_tx: mpsc::UnboundedSender<PoolerConfig>,
}

impl ConfigWatcher {
    /// Returns the watcher and a receiver for validated configurations.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<PoolerConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        (
            Self {
                path: path.to_path_buf(),
                update_tx,
            },
            update_rx,
        )
    }

    /// Start watching. The returned watcher must be kept alive for
    /// events to flow.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let tx = self.update_tx;
        let path = self.path.clone();
        let file_name = path.file_name().map(OsString::from);
        let directory = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if !(event.kind.is_modify() || event.kind.is_create()) {
                        return;
                    }
                    let ours = event
                        .paths
                        .iter()
                        .any(|p| p.file_name().map(OsString::from) == file_name);
                    if !ours {
                        return;
                    }
                    match load_config(&path) {
                        Ok(config) => {
                            tracing::info!(path = ?path, "Config file changed, applying");
                            let _ = tx.send(config);
                        }
                        Err(e) => {
                            tracing::error!(path = ?path, error = %e, "Rejected config change, keeping current configuration");
                        }
                    }
                }
                Err(e) => tracing::error!(error = ?e, "Config watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&directory, RecursiveMode::NonRecursive)?;
        tracing::info!(path = ?self.path, "Config watcher started");
        Ok(watcher)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"
[[targets]]
name = "app"
address = "127.0.0.1:5432"
max_size = 7
"#;

    #[tokio::test]
    async fn forwards_valid_changes_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tidepool.toml");
        std::fs::write(&path, VALID).unwrap();

        let (watcher, mut updates) = ConfigWatcher::new(&path);
        let _watcher = watcher.run().unwrap();

        std::fs::write(&path, "[[targets]\nbroken").unwrap();
        std::fs::write(&path, VALID.replace("max_size = 7", "max_size = 9")).unwrap();

        let config = tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                let config = updates.recv().await.unwrap();
                if config.targets.first().map(|t| t.max_size) == Some(9) {
                    return config;
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(config.targets[0].name, "app");
    }
}
