//! Capacity-bounded managed storage.
//!
//! Every artifact lives under a single root, one directory per
//! [`Category`]. After each placement the tree is brought back under the
//! configured byte budget by deleting the oldest files by modification time.
//!
//! # Example
//!
//! ```rust,ignore
//! use mediaflow::storage::{StorageConfig, StorageManager};
//! use mediaflow::Category;
//!
//! let storage = StorageManager::new(StorageConfig::new("/srv/bot/downloads", 20 << 30));
//! let final_path = storage.place(&staged, Category::Video).await?;
//! println!("{} bytes in use", storage.total_usage_bytes().await?);
//! ```

mod cleanup;
mod eviction;

pub use cleanup::DeferredCleanup;
pub use eviction::{EvictionResult, ManagedFile, list_managed_files, total_usage_bytes};

use crate::config::MediaflowConfig;
use crate::models::Category;
use crate::observability::metrics::{STORAGE_EVICTION_DURATION_MS, STORAGE_USAGE_BYTES, duration_ms};
use crate::{Error, Result};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

/// Storage manager configuration.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Managed root directory.
    pub root: PathBuf,
    /// Maximum aggregate bytes retained under the root.
    pub budget_bytes: u64,
}

impl StorageConfig {
    /// Creates a storage configuration.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, budget_bytes: u64) -> Self {
        Self {
            root: root.into(),
            budget_bytes,
        }
    }

    /// Builds the storage configuration from the application config.
    #[must_use]
    pub fn from_config(config: &MediaflowConfig) -> Self {
        Self::new(config.downloads_dir(), config.storage.budget_bytes)
    }
}

/// Owns the managed directory tree.
///
/// `place` and `evict_if_over_budget` are serialized by one mutex so that
/// concurrent placements never compute usage mid-move or double-evict.
#[derive(Debug)]
pub struct StorageManager {
    config: StorageConfig,
    lock: Mutex<()>,
}

impl StorageManager {
    /// Creates a storage manager.
    #[must_use]
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            lock: Mutex::new(()),
        }
    }

    /// Managed root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.config.root
    }

    /// Configured budget in bytes.
    #[must_use]
    pub const fn budget_bytes(&self) -> u64 {
        self.config.budget_bytes
    }

    /// Directory for a category bucket.
    #[must_use]
    pub fn bucket_dir(&self, category: Category) -> PathBuf {
        self.config.root.join(category.dir_name())
    }

    /// Moves `file` into its category bucket, then evicts down to budget.
    ///
    /// The placed file is never an eviction candidate, so when it alone
    /// exceeds the budget it is the only file left.
    ///
    /// # Errors
    ///
    /// Returns `Placement` if the bucket cannot be created or the file
    /// cannot be moved; the source file is left where it was.
    pub async fn place(&self, file: &Path, category: Category) -> Result<PathBuf> {
        self.place_protecting(file, category, &[]).await
    }

    /// Like [`place`](Self::place), but the eviction pass also skips every
    /// path in `protected`.
    ///
    /// Used for artifacts derived from an already placed file, which must
    /// survive the placement of its derivatives.
    ///
    /// # Errors
    ///
    /// Returns `Placement` if the bucket cannot be created or the file
    /// cannot be moved; the source file is left where it was.
    #[instrument(skip(self, protected), fields(file = %file.display(), category = %category, protected = protected.len()))]
    pub async fn place_protecting(
        &self,
        file: &Path,
        category: Category,
        protected: &[PathBuf],
    ) -> Result<PathBuf> {
        let _guard = self.lock.lock().await;

        let file_name = file.file_name().ok_or_else(|| Error::Placement {
            path: file.to_path_buf(),
            cause: "path has no file name".to_string(),
        })?;
        let bucket = self.bucket_dir(category);
        tokio::fs::create_dir_all(&bucket)
            .await
            .map_err(|e| placement_error(file, &e))?;
        let target = bucket.join(file_name);

        move_file(file, &target).await?;
        debug!(target = %target.display(), "File placed");

        let mut keep = Vec::with_capacity(protected.len() + 1);
        keep.push(target.clone());
        keep.extend_from_slice(protected);
        let result = self.evict_locked(keep).await?;
        if result.has_evictions() {
            info!(summary = %result.summary(), "Eviction after placement");
        }

        Ok(target)
    }

    /// Recursive size of all files under the managed root.
    ///
    /// # Errors
    ///
    /// Returns an error if the background walk task fails.
    pub async fn total_usage_bytes(&self) -> Result<u64> {
        let root = self.config.root.clone();
        tokio::task::spawn_blocking(move || total_usage_bytes(&root))
            .await
            .map_err(|e| Error::operation("storage_usage", e))
    }

    /// Evicts oldest files until usage is within budget.
    ///
    /// Per-file deletion failures are logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns an error only if the background eviction task fails.
    #[instrument(skip(self))]
    pub async fn evict_if_over_budget(&self) -> Result<EvictionResult> {
        let _guard = self.lock.lock().await;
        self.evict_locked(Vec::new()).await
    }

    /// Lists managed files, oldest first, optionally limited to one bucket.
    ///
    /// # Errors
    ///
    /// Returns an error if the background walk task fails.
    pub async fn list_files(&self, category: Option<Category>) -> Result<Vec<ManagedFile>> {
        let root = self.config.root.clone();
        let files = tokio::task::spawn_blocking(move || list_managed_files(&root))
            .await
            .map_err(|e| Error::operation("storage_list", e))?;
        Ok(files
            .into_iter()
            .filter(|file| category.is_none_or(|c| file.category == c))
            .collect())
    }

    async fn evict_locked(&self, protected: Vec<PathBuf>) -> Result<EvictionResult> {
        let root = self.config.root.clone();
        let budget = self.config.budget_bytes;
        let start = Instant::now();

        let result = tokio::task::spawn_blocking(move || {
            eviction::evict_oldest(&root, budget, &protected)
        })
        .await
        .map_err(|e| Error::operation("storage_evict", e))?;

        #[allow(clippy::cast_precision_loss)]
        metrics::gauge!(STORAGE_USAGE_BYTES).set(result.usage_after as f64);
        metrics::histogram!(STORAGE_EVICTION_DURATION_MS).record(duration_ms(start.elapsed()));
        if result.usage_after > budget {
            warn!(
                usage = result.usage_after,
                budget, "Storage still over budget after eviction"
            );
        }
        Ok(result)
    }
}

/// Moves a file, falling back to copy and delete across devices.
async fn move_file(from: &Path, to: &Path) -> Result<()> {
    if tokio::fs::rename(from, to).await.is_ok() {
        return Ok(());
    }
    tokio::fs::copy(from, to)
        .await
        .map_err(|e| placement_error(from, &e))?;
    if let Err(e) = tokio::fs::remove_file(from).await {
        warn!(path = %from.display(), error = %e, "Copied file but could not remove source");
    }
    Ok(())
}

fn placement_error(path: &Path, e: &std::io::Error) -> Error {
    Error::Placement {
        path: path.to_path_buf(),
        cause: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use filetime::FileTime;
    use std::fs;

    fn write_file(path: &Path, size: usize, mtime: i64) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, vec![0u8; size]).unwrap();
        filetime::set_file_mtime(path, FileTime::from_unix_time(mtime, 0)).unwrap();
    }

    #[tokio::test]
    async fn test_place_moves_into_bucket() {
        let dir = tempfile::tempdir().unwrap();
        let staging = dir.path().join("staging");
        let storage = StorageManager::new(StorageConfig::new(dir.path().join("root"), 1000));
        let staged = staging.join("clip.mp4");
        write_file(&staged, 10, 1_000);

        let placed = storage.place(&staged, Category::Video).await.unwrap();

        assert_eq!(placed, dir.path().join("root").join("videos").join("clip.mp4"));
        assert!(placed.exists());
        assert!(!staged.exists());
        assert_eq!(storage.total_usage_bytes().await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_place_evicts_oldest_first() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("root");
        write_file(&root.join("photos").join("old.jpg"), 40, 1_000);
        write_file(&root.join("audio").join("mid.mp3"), 40, 2_000);
        let storage = StorageManager::new(StorageConfig::new(&root, 100));

        let staged = dir.path().join("new.mp4");
        write_file(&staged, 40, 3_000);
        let placed = storage.place(&staged, Category::Video).await.unwrap();

        assert!(placed.exists());
        assert!(!root.join("photos").join("old.jpg").exists());
        assert!(root.join("audio").join("mid.mp3").exists());
        assert_eq!(storage.total_usage_bytes().await.unwrap(), 80);
    }

    #[tokio::test]
    async fn test_place_protecting_keeps_source_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("root");
        let primary = root.join("videos").join("clip.mp4");
        write_file(&primary, 20, 1_000);
        let storage = StorageManager::new(StorageConfig::new(&root, 10));

        let staged = dir.path().join("clip.mp3");
        write_file(&staged, 5, 2_000);
        let placed = storage
            .place_protecting(&staged, Category::Audio, std::slice::from_ref(&primary))
            .await
            .unwrap();

        assert!(primary.exists());
        assert!(placed.exists());
        assert_eq!(storage.total_usage_bytes().await.unwrap(), 25);
    }

    #[tokio::test]
    async fn test_place_missing_source_is_placement_error() {
        let dir = tempfile::tempdir().unwrap();
        let storage = StorageManager::new(StorageConfig::new(dir.path().join("root"), 100));
        let err = storage
            .place(&dir.path().join("missing.bin"), Category::Other)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Placement { .. }));
    }

    #[tokio::test]
    async fn test_list_files_filters_by_category() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("root");
        write_file(&root.join("videos").join("a.mp4"), 1, 2_000);
        write_file(&root.join("photos").join("b.png"), 1, 1_000);
        let storage = StorageManager::new(StorageConfig::new(&root, 100));

        let all = storage.list_files(None).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].category, Category::Photo);

        let videos = storage.list_files(Some(Category::Video)).await.unwrap();
        assert_eq!(videos.len(), 1);
        assert!(videos[0].path.ends_with("a.mp4"));
    }

    #[tokio::test]
    async fn test_usage_of_missing_root_is_zero() {
        let dir = tempfile::tempdir().unwrap();
        let storage = StorageManager::new(StorageConfig::new(dir.path().join("nope"), 100));
        assert_eq!(storage.total_usage_bytes().await.unwrap(), 0);
        assert!(storage.list_files(None).await.unwrap().is_empty());
    }
}
