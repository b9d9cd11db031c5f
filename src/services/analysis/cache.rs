//! Bounded cache of per-task analysis results keyed by content hash.

use crate::{Error, Result};
use lru::LruCache;
use sha2::{Digest, Sha256};
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::Mutex;

/// Capacity used when a zero capacity is configured.
const MIN_CAPACITY: NonZeroUsize = NonZeroUsize::MIN;

/// Hex SHA-256 digest of an artifact's content.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentDigest(String);

impl ContentDigest {
    /// Hashes the file at `path` on the blocking pool.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub async fn of_file(path: &Path) -> Result<Self> {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || {
            let mut file = std::fs::File::open(&path)?;
            let mut hasher = Sha256::new();
            std::io::copy(&mut file, &mut hasher)?;
            Ok::<_, std::io::Error>(Self(hex::encode(hasher.finalize())))
        })
        .await
        .map_err(|e| Error::operation("content_digest", e))?
        .map_err(|e| Error::operation("content_digest", e))
    }

    /// Digest of in-memory bytes.
    #[must_use]
    pub fn of_bytes(bytes: &[u8]) -> Self {
        Self(hex::encode(Sha256::digest(bytes)))
    }

    /// The hex digest.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Fixed-capacity, least-recently-used store of successful task payloads.
///
/// Only `Ok` results are cached; errors and timeouts are always retried.
#[derive(Debug)]
pub struct AnalysisCache {
    entries: Mutex<LruCache<(ContentDigest, String), String>>,
}

impl AnalysisCache {
    /// Creates a cache holding at most `capacity` entries (minimum 1).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(MIN_CAPACITY);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Returns the cached payload for a task on this content.
    #[must_use]
    pub fn get(&self, digest: &ContentDigest, task: &str) -> Option<String> {
        let mut entries = self.entries.lock().ok()?;
        entries.get(&(digest.clone(), task.to_string())).cloned()
    }

    /// Stores a payload, evicting the least recently used entry when full.
    pub fn put(&self, digest: ContentDigest, task: &str, payload: String) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.put((digest, task.to_string()), payload);
        }
    }

    /// Number of cached entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().map_or(0, |entries| entries.len())
    }

    /// Returns true if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of entries.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.entries
            .lock()
            .map_or(0, |entries| entries.cap().get())
    }

    /// Drops every entry.
    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }
}
