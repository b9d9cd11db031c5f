//! Deferred deletion of temporary artifacts.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Schedules temporary files for deletion after a delay.
///
/// Each path has at most one pending deletion. Scheduling a path again
/// replaces its timer, and [`cancel`](Self::cancel) keeps the file alive
/// when it is reused before the delay elapses.
#[derive(Debug, Clone)]
pub struct DeferredCleanup {
    delay: Duration,
    pending: Arc<Mutex<HashMap<PathBuf, JoinHandle<()>>>>,
}

impl DeferredCleanup {
    /// Creates a scheduler with the given delay.
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Configured delay.
    #[must_use]
    pub const fn delay(&self) -> Duration {
        self.delay
    }

    /// Schedules `path` for deletion, replacing any pending deletion.
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule(&self, path: impl Into<PathBuf>) {
        let path = path.into();
        let delay = self.delay;
        let pending = Arc::clone(&self.pending);
        let key = path.clone();

        let Ok(mut map) = self.pending.lock() else {
            warn!(path = %path.display(), "Cleanup registry poisoned, file not scheduled");
            return;
        };

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            match tokio::fs::remove_file(&path).await {
                Ok(()) => debug!(path = %path.display(), "Temporary file removed"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
                Err(e) => warn!(path = %path.display(), error = %e, "Temporary file cleanup failed"),
            }
            if let Ok(mut map) = pending.lock() {
                map.remove(&path);
            }
        });

        if let Some(previous) = map.insert(key, handle) {
            previous.abort();
        }
    }

    /// Cancels a pending deletion. Returns `true` if one was pending.
    pub fn cancel(&self, path: &Path) -> bool {
        let removed = self
            .pending
            .lock()
            .ok()
            .and_then(|mut map| map.remove(path));
        removed.is_some_and(|handle| {
            handle.abort();
            true
        })
    }

    /// Number of deletions still pending.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.lock().map_or(0, |map| map.len())
    }
}
