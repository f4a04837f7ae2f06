//! Configuration hot reload.
//!
//! [`ConfigWatcher`] watches the directory holding the config file (editors
//! often replace a file instead of writing it in place) and forwards
//! create/modify events for that file as a coalescing signal.
//! [`ConfigWatcher::run`] turns those signals into reloads:
//!
//! - attempts closer together than [`MIN_TIME_BETWEEN_RELOADS`] are dropped,
//! - each attempt waits [`RELOAD_SETTLE_DELAY`] so the writer can finish,
//! - a file that fails to load keeps the previous configuration in place,
//! - a file that loads but did not change is not republished.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};

use crate::infrastructure::storage::config::{load_config_from, AppConfig, ConfigError};

/// Minimum time between two reload attempts.
pub const MIN_TIME_BETWEEN_RELOADS: Duration = Duration::from_millis(500);

/// Delay between a change notification and reading the file.
pub const RELOAD_SETTLE_DELAY: Duration = Duration::from_millis(50);

/// Reads the config file on demand, rate limited.
pub struct ConfigReloader {
    path: PathBuf,
    min_interval: Duration,
    settle: Duration,
    last_attempt: Option<Instant>,
}

impl ConfigReloader {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            min_interval: MIN_TIME_BETWEEN_RELOADS,
            settle: RELOAD_SETTLE_DELAY,
            last_attempt: None,
        }
    }

    pub fn with_timing(mut self, min_interval: Duration, settle: Duration) -> Self {
        self.min_interval = min_interval;
        self.settle = settle;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Attempts a reload.  Returns `None` when rate limited or when the file
    /// could not be loaded.
    pub async fn reload(&mut self) -> Option<AppConfig> {
        let now = Instant::now();
        if let Some(last) = self.last_attempt {
            if now.duration_since(last) < self.min_interval {
                debug!("config change ignored, last reload attempt too recent");
                return None;
            }
        }
        self.last_attempt = Some(now);

        time::sleep(self.settle).await;

        match load_config_from(&self.path) {
            Ok(config) => Some(config),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to reload config, keeping previous one");
                None
            }
        }
    }
}

/// File system watcher for the config file.
pub struct ConfigWatcher {
    _watcher: RecommendedWatcher,
    changes: mpsc::Receiver<()>,
    reloader: ConfigReloader,
}

impl ConfigWatcher {
    /// Starts watching `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Watch`] if the OS watcher cannot be created or
    /// the parent directory cannot be watched, and [`ConfigError::Io`] if the
    /// parent directory cannot be created.
    pub fn new(path: PathBuf) -> Result<Self, ConfigError> {
        let dir = path
            .parent()
            .filter(|d| !d.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        std::fs::create_dir_all(&dir).map_err(|source| ConfigError::Io {
            path: dir.clone(),
            source,
        })?;

        // capacity 1: pending changes coalesce into one reload
        let (tx, changes) = mpsc::channel(1);
        let file_name = path.file_name().map(|n| n.to_os_string());

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            let Ok(event) = res else {
                return;
            };
            if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                return;
            }
            let touches_config = event
                .paths
                .iter()
                .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);
            if touches_config {
                // full means a reload is already pending
                let _ = tx.try_send(());
            }
        })?;

        watcher.watch(&dir, RecursiveMode::NonRecursive)?;
        info!(path = %path.display(), "watching config file for changes");

        Ok(Self {
            _watcher: watcher,
            changes,
            reloader: ConfigReloader::new(path),
        })
    }

    pub fn with_reloader(mut self, reloader: ConfigReloader) -> Self {
        self.reloader = reloader;
        self
    }

    /// Publishes every successfully reloaded, changed configuration on
    /// `configs` until shutdown.
    pub async fn run(
        mut self,
        configs: watch::Sender<Arc<AppConfig>>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                change = self.changes.recv() => {
                    if change.is_none() {
                        break;
                    }
                    let Some(config) = self.reloader.reload().await else {
                        continue;
                    };
                    if **configs.borrow() == config {
                        debug!("config file touched but unchanged");
                        continue;
                    }
                    info!(path = %self.reloader.path().display(), "config reloaded");
                    configs.send_replace(Arc::new(config));
                }
            }
        }
        debug!("config watcher stopped");
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn temp_config_path() -> PathBuf {
        std::env::temp_dir()
            .join(format!("deej_watch_{}", Uuid::new_v4()))
            .join("config.toml")
    }

    fn write(path: &Path, content: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[tokio::test]
    async fn test_reload_reads_current_file() {
        // Arrange
        let path = temp_config_path();
        write(&path, "invert_sliders = true");
        let mut reloader = ConfigReloader::new(path.clone()).with_timing(Duration::ZERO, Duration::ZERO);

        // Act
        let config = reloader.reload().await;

        // Assert
        assert!(config.expect("reloaded").invert_sliders);
        std::fs::remove_dir_all(path.parent().unwrap()).ok();
    }

    #[tokio::test]
    async fn test_reload_is_rate_limited() {
        let path = temp_config_path();
        let mut reloader =
            ConfigReloader::new(path).with_timing(Duration::from_secs(60), Duration::ZERO);

        assert!(reloader.reload().await.is_some());
        assert!(reloader.reload().await.is_none());
    }

    #[tokio::test]
    async fn test_reload_of_broken_file_returns_none() {
        // Arrange
        let path = temp_config_path();
        write(&path, "[[[ broken");
        let mut reloader = ConfigReloader::new(path.clone()).with_timing(Duration::ZERO, Duration::ZERO);

        // Act / Assert
        assert!(reloader.reload().await.is_none());
        std::fs::remove_dir_all(path.parent().unwrap()).ok();
    }

    #[tokio::test]
    async fn test_watcher_publishes_changed_config() {
        // Arrange
        let path = temp_config_path();
        write(&path, "invert_sliders = false");
        let Ok(watcher) = ConfigWatcher::new(path.clone()) else {
            // no file watching available in this environment
            return;
        };
        let watcher = watcher.with_reloader(
            ConfigReloader::new(path.clone()).with_timing(Duration::ZERO, Duration::from_millis(20)),
        );
        let (cfg_tx, mut cfg_rx) = watch::channel(Arc::new(AppConfig::default()));
        let (stop_tx, stop_rx) = broadcast::channel(1);
        let task = tokio::spawn(watcher.run(cfg_tx, stop_rx));

        // Act
        write(&path, "invert_sliders = true\nnoise_reduction = \"high\"");
        let changed = tokio::time::timeout(Duration::from_secs(5), cfg_rx.changed()).await;

        // Assert
        assert!(changed.is_ok(), "no reload published");
        assert!(cfg_rx.borrow().invert_sliders);
        stop_tx.send(()).unwrap();
        task.await.unwrap();
        std::fs::remove_dir_all(path.parent().unwrap()).ok();
    }
}
