//! Usage accounting and oldest-first eviction.
//!
//! These are blocking filesystem walks; async callers run them on the
//! blocking pool.

use crate::models::Category;
use crate::observability::metrics::{STORAGE_EVICTION_FAILURES_TOTAL, STORAGE_EVICTIONS_TOTAL};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// A file under the managed root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedFile {
    /// Absolute path.
    pub path: PathBuf,
    /// Bucket the file lives in.
    pub category: Category,
    /// Size in bytes.
    pub size: u64,
    /// Last modification time.
    pub modified: SystemTime,
}

/// Result of an eviction pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvictionResult {
    /// Files deleted, oldest first.
    pub evicted: Vec<PathBuf>,
    /// Bytes reclaimed.
    pub bytes_freed: u64,
    /// Candidates that could not be deleted.
    pub failures: usize,
    /// Usage before the pass.
    pub usage_before: u64,
    /// Usage after the pass.
    pub usage_after: u64,
}

impl EvictionResult {
    /// Returns `true` if any file was deleted.
    #[must_use]
    pub fn has_evictions(&self) -> bool {
        !self.evicted.is_empty()
    }

    /// Returns a human-readable summary.
    #[must_use]
    pub fn summary(&self) -> String {
        if self.evicted.is_empty() && self.failures == 0 {
            return format!("Within budget ({} bytes used)", self.usage_after);
        }
        format!(
            "Evicted {} file(s), freed {} bytes ({} -> {} bytes, {} failure(s))",
            self.evicted.len(),
            self.bytes_freed,
            self.usage_before,
            self.usage_after,
            self.failures
        )
    }
}

/// Lists regular files under `root`, oldest modification time first.
///
/// Unreadable entries are skipped. Ties are broken by path so the order
/// is stable.
#[must_use]
pub fn list_managed_files(root: &Path) -> Vec<ManagedFile> {
    let mut files: Vec<ManagedFile> = WalkDir::new(root)
        .into_iter()
        .filter_map(std::result::Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| {
            let metadata = entry.metadata().ok()?;
            let modified = metadata.modified().ok()?;
            Some(ManagedFile {
                category: bucket_of(root, entry.path()),
                path: entry.into_path(),
                size: metadata.len(),
                modified,
            })
        })
        .collect();

    files.sort_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.path.cmp(&b.path)));
    files
}

/// Recursive sum of file sizes under `root`. A missing root is empty.
#[must_use]
pub fn total_usage_bytes(root: &Path) -> u64 {
    WalkDir::new(root)
        .into_iter()
        .filter_map(std::result::Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| entry.metadata().ok())
        .map(|metadata| metadata.len())
        .sum()
}

/// Deletes the oldest files until usage is at most `budget`.
///
/// Paths in `protected` are never deleted.
pub(super) fn evict_oldest(root: &Path, budget: u64, protected: &[PathBuf]) -> EvictionResult {
    evict_candidates(list_managed_files(root), budget, protected, |path| {
        std::fs::remove_file(path)
    })
}

/// Eviction over an already listed set of files, oldest first.
///
/// A file that vanished since the listing counts as reclaimed. Any other
/// deletion failure is logged and counted, then the next candidate is tried.
fn evict_candidates(
    files: Vec<ManagedFile>,
    budget: u64,
    protected: &[PathBuf],
    mut remove: impl FnMut(&Path) -> std::io::Result<()>,
) -> EvictionResult {
    let usage_before: u64 = files.iter().map(|f| f.size).sum();
    let mut result = EvictionResult {
        usage_before,
        usage_after: usage_before,
        ..EvictionResult::default()
    };

    if usage_before <= budget {
        return result;
    }

    for file in files {
        if result.usage_after <= budget {
            break;
        }
        if protected.contains(&file.path) {
            continue;
        }

        match remove(&file.path) {
            Ok(()) => {
                debug!(path = %file.path.display(), size = file.size, "Evicted file");
                metrics::counter!(STORAGE_EVICTIONS_TOTAL).increment(1);
                result.usage_after = result.usage_after.saturating_sub(file.size);
                result.bytes_freed += file.size;
                result.evicted.push(file.path);
            },
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %file.path.display(), "Eviction candidate already gone");
                result.usage_after = result.usage_after.saturating_sub(file.size);
            },
            Err(e) => {
                let error = crate::Error::Eviction {
                    path: file.path.clone(),
                    cause: e.to_string(),
                };
                warn!(error = %error, "Skipping eviction candidate");
                metrics::counter!(STORAGE_EVICTION_FAILURES_TOTAL).increment(1);
                result.failures += 1;
            },
        }
    }

    result
}

/// Bucket from the first path component below `root`.
fn bucket_of(root: &Path, path: &Path) -> Category {
    path.strip_prefix(root)
        .ok()
        .and_then(|relative| relative.components().next())
        .and_then(|component| component.as_os_str().to_str())
        .and_then(Category::from_dir_name)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use filetime::FileTime;
    use std::fs;

    fn write_file(path: &Path, size: usize, mtime: i64) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, vec![1u8; size]).unwrap();
        filetime::set_file_mtime(path, FileTime::from_unix_time(mtime, 0)).unwrap();
    }

    #[test]
    fn test_within_budget_evicts_nothing() {
        let dir = tempfile::tempdir().unwrap();
        write_file(&dir.path().join("videos").join("a.mp4"), 50, 1_000);

        let result = evict_oldest(dir.path(), 100, &[]);

        assert!(!result.has_evictions());
        assert_eq!(result.usage_after, 50);
        assert!(result.summary().starts_with("Within budget"));
    }

    #[test]
    fn test_evicts_oldest_until_within_budget() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write_file(&root.join("videos").join("newest.mp4"), 30, 3_000);
        write_file(&root.join("photos").join("oldest.jpg"), 30, 1_000);
        write_file(&root.join("other").join("middle.bin"), 30, 2_000);

        let result = evict_oldest(root, 60, &[]);

        assert_eq!(result.evicted, vec![root.join("photos").join("oldest.jpg")]);
        assert_eq!(result.bytes_freed, 30);
        assert_eq!(result.usage_after, 60);
        assert_eq!(total_usage_bytes(root), 60);
    }

    #[test]
    fn test_excluded_file_survives_even_when_over_budget() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let placed = root.join("videos").join("big.mp4");
        write_file(&root.join("audio").join("a.mp3"), 10, 1_000);
        write_file(&root.join("audio").join("b.mp3"), 10, 2_000);
        write_file(&placed, 150, 500);

        let result = evict_oldest(root, 100, std::slice::from_ref(&placed));

        assert_eq!(result.evicted.len(), 2);
        assert!(placed.exists());
        assert_eq!(list_managed_files(root).len(), 1);
        assert_eq!(result.usage_after, 150);
    }

    #[test]
    fn test_failed_deletion_is_skipped_and_next_candidate_tried() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let stuck = root.join("photos").join("stuck.jpg");
        write_file(&stuck, 30, 1_000);
        write_file(&root.join("audio").join("a.mp3"), 30, 2_000);
        write_file(&root.join("videos").join("b.mp4"), 30, 3_000);

        let result = evict_candidates(list_managed_files(root), 40, &[], |path| {
            if path == stuck {
                Err(std::io::Error::new(ErrorKind::PermissionDenied, "read-only"))
            } else {
                fs::remove_file(path)
            }
        });

        assert_eq!(result.failures, 1);
        assert!(stuck.exists());
        assert_eq!(result.evicted.len(), 2);
        assert_eq!(result.usage_after, 30);
        assert!(result.summary().contains("1 failure(s)"));
    }

    #[test]
    fn test_vanished_candidate_counts_as_reclaimed() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let gone = root.join("photos").join("gone.jpg");
        write_file(&gone, 50, 1_000);
        write_file(&root.join("audio").join("keep.mp3"), 50, 2_000);

        let listed = list_managed_files(root);
        fs::remove_file(&gone).unwrap();
        let result = evict_candidates(listed, 60, &[], |path| fs::remove_file(path));

        assert_eq!(result.failures, 0);
        assert!(result.evicted.is_empty());
        assert_eq!(result.usage_after, 50);
        assert!(root.join("audio").join("keep.mp3").exists());
    }

    #[test]
    fn test_bucket_of() {
        let root = Path::new("/data");
        assert_eq!(bucket_of(root, Path::new("/data/videos/a.mp4")), Category::Video);
        assert_eq!(bucket_of(root, Path::new("/data/photos/x/y.png")), Category::Photo);
        assert_eq!(bucket_of(root, Path::new("/data/loose.bin")), Category::Other);
    }
}
