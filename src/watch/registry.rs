use crate::core::config::Config;
use crate::core::error::{Error, Result};
use crate::indexing::discovery::absolute_path;
use crate::watch::event::FileChangeStream;
use crate::watch::watcher::PathWatcher;
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Starts and stops watchers by path.
pub trait WatchService: Send + Sync {
    /// Begin watching `path`, replacing any watcher already registered for it.
    fn start_watching(&self, path: &Path) -> Result<FileChangeStream>;

    /// Stop the watcher for `path`, if any. Its stream ends.
    fn stop_watching(&self, path: &Path);

    /// Stop every watcher.
    fn clear(&self);
}

/// Default [`WatchService`] backed by OS notifications.
pub struct WatchRegistry {
    config: Config,
    watchers: DashMap<PathBuf, PathWatcher>,
}

impl WatchRegistry {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            watchers: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.watchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.watchers.is_empty()
    }

    pub fn is_watching(&self, path: &Path) -> bool {
        absolute_path(path)
            .map(|path| self.watchers.contains_key(&path))
            .unwrap_or(false)
    }
}

impl Default for WatchRegistry {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl WatchService for WatchRegistry {
    fn start_watching(&self, path: &Path) -> Result<FileChangeStream> {
        if !path.exists() {
            return Err(Error::InvalidArgument(format!(
                "Path does not exist: '{}'",
                path.display()
            )));
        }

        let (watcher, stream) = PathWatcher::spawn(path, &self.config)?;
        let previous = self.watchers.insert(watcher.root().to_path_buf(), watcher);
        if let Some(previous) = previous {
            debug!("Replacing watcher for {}", previous.root().display());
            previous.stop();
        }
        Ok(stream)
    }

    fn stop_watching(&self, path: &Path) {
        let Ok(path) = absolute_path(path) else {
            return;
        };
        // Stopped outside the map lock; stopping joins the OS watcher thread
        let removed = self.watchers.remove(&path);
        if let Some((_, watcher)) = removed {
            watcher.stop();
        }
    }

    fn clear(&self) {
        let paths: Vec<PathBuf> = self.watchers.iter().map(|entry| entry.key().clone()).collect();
        for path in paths {
            if let Some((_, watcher)) = self.watchers.remove(&path) {
                watcher.stop();
            }
        }
    }
}
