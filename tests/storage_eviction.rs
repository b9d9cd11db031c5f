//! Integration tests for capacity-bounded storage.
//!
//! Modification times are pinned with `filetime` so eviction order is
//! deterministic.

// Integration tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(clippy::expect_used, clippy::unwrap_used)]

use filetime::FileTime;
use mediaflow::Category;
use mediaflow::storage::{StorageConfig, StorageManager};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

fn write_with_mtime(path: &Path, size: usize, mtime: i64) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, vec![0u8; size]).unwrap();
    filetime::set_file_mtime(path, FileTime::from_unix_time(mtime, 0)).unwrap();
}

fn staged(dir: &Path, name: &str, size: usize) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, vec![7u8; size]).unwrap();
    path
}

#[tokio::test]
async fn oversized_placement_leaves_only_the_new_file() {
    let root = tempfile::tempdir().unwrap();
    let staging = tempfile::tempdir().unwrap();
    let storage = StorageManager::new(StorageConfig::new(root.path(), 1_000));

    write_with_mtime(&root.path().join("videos/a.mp4"), 300, 1_000);
    write_with_mtime(&root.path().join("photos/b.jpg"), 300, 2_000);
    write_with_mtime(&root.path().join("audio/c.mp3"), 300, 3_000);

    let placed = storage
        .place(&staged(staging.path(), "big.mp4", 1_500), Category::Video)
        .await
        .unwrap();

    assert_eq!(placed, root.path().join("videos/big.mp4"));
    assert_eq!(storage.total_usage_bytes().await.unwrap(), 1_500);
    let remaining = storage.list_files(None).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].path, placed);
}

#[tokio::test]
async fn eviction_removes_globally_oldest_first() {
    let root = tempfile::tempdir().unwrap();
    let staging = tempfile::tempdir().unwrap();
    let storage = StorageManager::new(StorageConfig::new(root.path(), 1_000));

    // Oldest file sits in a different bucket than the newest.
    write_with_mtime(&root.path().join("photos/oldest.jpg"), 400, 1_000);
    write_with_mtime(&root.path().join("videos/middle.mp4"), 400, 2_000);
    write_with_mtime(&root.path().join("audio/newest.mp3"), 100, 3_000);

    storage
        .place(&staged(staging.path(), "new.mp4", 300), Category::Video)
        .await
        .unwrap();

    assert!(!root.path().join("photos/oldest.jpg").exists());
    assert!(root.path().join("videos/middle.mp4").exists());
    assert!(root.path().join("audio/newest.mp3").exists());
    assert_eq!(storage.total_usage_bytes().await.unwrap(), 800);
}

#[tokio::test]
async fn placement_under_budget_evicts_nothing() {
    let root = tempfile::tempdir().unwrap();
    let staging = tempfile::tempdir().unwrap();
    let storage = StorageManager::new(StorageConfig::new(root.path(), 10_000));
    write_with_mtime(&root.path().join("other/a.bin"), 100, 1_000);

    let placed = storage
        .place(&staged(staging.path(), "b.bin", 100), Category::Other)
        .await
        .unwrap();

    assert!(placed.exists());
    assert!(!staging.path().join("b.bin").exists());
    assert_eq!(storage.list_files(None).await.unwrap().len(), 2);
}

#[tokio::test]
async fn concurrent_placements_respect_budget() {
    let root = tempfile::tempdir().unwrap();
    let staging = tempfile::tempdir().unwrap();
    let storage = Arc::new(StorageManager::new(StorageConfig::new(root.path(), 1_000)));

    let mut handles = Vec::new();
    for i in 0..8 {
        let storage = Arc::clone(&storage);
        let file = staged(staging.path(), &format!("f{i}.bin"), 300);
        handles.push(tokio::spawn(async move {
            storage.place(&file, Category::Other).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let usage = storage.total_usage_bytes().await.unwrap();
    assert!(usage <= 1_000, "usage {usage} over budget");
    assert_eq!(storage.list_files(None).await.unwrap().len(), 3);
}

#[tokio::test]
async fn list_files_filters_by_category_oldest_first() {
    let root = tempfile::tempdir().unwrap();
    let storage = StorageManager::new(StorageConfig::new(root.path(), 10_000));
    write_with_mtime(&root.path().join("videos/new.mp4"), 10, 3_000);
    write_with_mtime(&root.path().join("videos/old.mp4"), 10, 1_000);
    write_with_mtime(&root.path().join("photos/p.jpg"), 10, 2_000);

    let videos = storage.list_files(Some(Category::Video)).await.unwrap();
    let names: Vec<_> = videos
        .iter()
        .map(|f| f.path.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["old.mp4", "new.mp4"]);
    assert!(videos.iter().all(|f| f.category == Category::Video));
}

#[tokio::test]
async fn manual_eviction_reports_summary() {
    let root = tempfile::tempdir().unwrap();
    let storage = StorageManager::new(StorageConfig::new(root.path(), 150));
    write_with_mtime(&root.path().join("audio/a.mp3"), 100, 1_000);
    write_with_mtime(&root.path().join("audio/b.mp3"), 100, 2_000);

    let result = storage.evict_if_over_budget().await.unwrap();

    assert_eq!(result.evicted, vec![root.path().join("audio/a.mp3")]);
    assert_eq!(result.bytes_freed, 100);
    assert_eq!(result.usage_before, 200);
    assert_eq!(result.usage_after, 100);
    assert_eq!(result.failures, 0);
}
