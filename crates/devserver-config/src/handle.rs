//! Shared, reloadable configuration.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::{Duration, SystemTime};

use tracing::{info, warn};

use crate::{ConfigResult, DevserverConfig, load_config};

/// Current configuration, swapped atomically on reload.
///
/// Readers take an `Arc` snapshot; a run in progress keeps the snapshot it
/// started with even if the file changes underneath it.
#[derive(Debug, Clone)]
pub struct ConfigHandle {
    inner: Arc<RwLock<Arc<DevserverConfig>>>,
}

impl ConfigHandle {
    pub fn new(config: DevserverConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(config))),
        }
    }

    /// Load the initial configuration from a file.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        load_config(path).map(Self::new)
    }

    pub fn current(&self) -> Arc<DevserverConfig> {
        match self.inner.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn replace(&self, config: DevserverConfig) {
        let config = Arc::new(config);
        match self.inner.write() {
            Ok(mut guard) => *guard = config,
            Err(poisoned) => *poisoned.into_inner() = config,
        }
    }

    /// Re-read the file. On failure the previous configuration stays in
    /// effect and the error is returned.
    pub fn reload_from(&self, path: impl AsRef<Path>) -> ConfigResult<()> {
        let path = path.as_ref();
        match load_config(path) {
            Ok(config) => {
                info!(path = %path.display(), projects = config.projects.len(), "Configuration reloaded");
                self.replace(config);
                Ok(())
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Configuration reload failed, keeping previous");
                Err(e)
            }
        }
    }
}

/// Reload `handle` whenever the file's modification time changes.
///
/// Runs until the task is dropped.
pub async fn watch_config(handle: ConfigHandle, path: PathBuf, interval: Duration) {
    let mut last_seen = modified(&path).await;
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let current = modified(&path).await;
        if current.is_some() && current != last_seen {
            last_seen = current;
            // Failure is logged by reload_from
            let _ = handle.reload_from(&path);
        }
    }
}

async fn modified(path: &Path) -> Option<SystemTime> {
    tokio::fs::metadata(path).await.ok()?.modified().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reload_swaps_on_success() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.kdl");
        std::fs::write(&path, r#"project "one""#).unwrap();

        let handle = ConfigHandle::load(&path).unwrap();
        let before = handle.current();
        assert_eq!(before.git_names(), vec!["one"]);

        std::fs::write(&path, r#"project "two""#).unwrap();
        handle.reload_from(&path).unwrap();
        assert_eq!(handle.current().git_names(), vec!["two"]);

        // Earlier snapshots are unaffected
        assert_eq!(before.git_names(), vec!["one"]);
    }

    #[test]
    fn test_reload_keeps_previous_on_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.kdl");
        std::fs::write(&path, r#"project "one""#).unwrap();
        let handle = ConfigHandle::load(&path).unwrap();

        std::fs::write(&path, "project {{{ not kdl").unwrap();
        assert!(handle.reload_from(&path).is_err());
        assert_eq!(handle.current().git_names(), vec!["one"]);

        std::fs::write(&path, r#"project "three""#).unwrap();
        handle.reload_from(&path).unwrap();
        assert_eq!(handle.current().git_names(), vec!["three"]);
    }

    #[tokio::test]
    async fn test_watch_picks_up_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.kdl");
        std::fs::write(&path, r#"project "one""#).unwrap();
        let handle = ConfigHandle::load(&path).unwrap();

        let task = tokio::spawn(watch_config(
            handle.clone(),
            path.clone(),
            Duration::from_millis(20),
        ));
        tokio::time::sleep(Duration::from_millis(50)).await;

        let file = std::fs::OpenOptions::new().write(true).truncate(true).open(&path).unwrap();
        std::io::Write::write_all(&mut &file, br#"project "two""#).unwrap();
        file.set_modified(SystemTime::now() + Duration::from_secs(5)).unwrap();
        drop(file);

        let mut reloaded = false;
        for _ in 0..100 {
            if handle.current().git_names() == vec!["two"] {
                reloaded = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        task.abort();
        assert!(reloaded);
    }
}
