//! Integration tests for concurrent artifact analysis.

// Integration tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(clippy::expect_used, clippy::unwrap_used)]

use mediaflow::services::analysis::{
    AnalysisCache, AnalysisDispatcher, AnalysisTask, CommandCapability, DispatcherConfig,
    MetadataCapability,
};
use mediaflow::{AnalysisStatus, HistoryStore, MemoryHistoryStore, OwnerId, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

const PNG_HEADER: &[u8] = b"\x89PNG\r\n\x1A\n\0\0\0\rIHDR";

fn artifact(dir: &Path) -> PathBuf {
    let path = dir.join("photo.png");
    std::fs::write(&path, PNG_HEADER).unwrap();
    path
}

fn constant(payload: &'static str) -> AnalysisTask {
    AnalysisTask::new(
        format!("const-{payload}"),
        Arc::new(move |_: &Path, _: OwnerId| -> Result<String> { Ok(payload.to_string()) }),
    )
}

fn sleeping(name: &str, delay: Duration) -> AnalysisTask {
    AnalysisTask::new(
        name,
        Arc::new(move |_: &Path, _: OwnerId| -> Result<String> {
            std::thread::sleep(delay);
            Ok("late".to_string())
        }),
    )
}

#[tokio::test]
async fn metadata_capability_sniffs_real_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = artifact(dir.path());
    let dispatcher = AnalysisDispatcher::new(DispatcherConfig::default())
        .with_task(AnalysisTask::new("metadata", Arc::new(MetadataCapability)));

    let summary = dispatcher.analyze(&path, OwnerId::new(1)).await;

    let outcome = &summary.outcomes()[0];
    assert_eq!(outcome.status, AnalysisStatus::Ok);
    let payload = outcome.payload.as_deref().unwrap();
    assert!(payload.starts_with("image/png, 16 B, .png (photo)"), "{payload}");
}

#[tokio::test]
async fn overall_deadline_returns_every_task() {
    let dir = tempfile::tempdir().unwrap();
    let path = artifact(dir.path());
    let config = DispatcherConfig::default()
        .with_task_timeout(Duration::from_secs(10))
        .with_overall_timeout(Duration::from_millis(200))
        .with_workers(4);
    let dispatcher = AnalysisDispatcher::new(config)
        .with_task(constant("fast"))
        .with_task(sleeping("slow", Duration::from_secs(2)))
        .with_task(AnalysisTask::new("metadata", Arc::new(MetadataCapability)));

    let summary = dispatcher.analyze(&path, OwnerId::new(1)).await;

    let statuses: Vec<(&str, AnalysisStatus)> = summary
        .outcomes()
        .iter()
        .map(|o| (o.task.as_str(), o.status))
        .collect();
    assert_eq!(
        statuses,
        vec![
            ("const-fast", AnalysisStatus::Ok),
            ("slow", AnalysisStatus::Timeout),
            ("metadata", AnalysisStatus::Ok),
        ]
    );
    assert!(summary.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn missing_tool_is_an_isolated_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = artifact(dir.path());
    let dispatcher = AnalysisDispatcher::new(DispatcherConfig::default())
        .with_task(AnalysisTask::new(
            "qr",
            Arc::new(CommandCapability::new(
                "mediaflow-test-no-such-tool",
                vec!["{path}".to_string()],
            )),
        ))
        .with_task(constant("fine"));

    let summary = dispatcher.analyze(&path, OwnerId::new(1)).await;

    assert_eq!(summary.count(AnalysisStatus::Error), 1);
    assert_eq!(summary.count(AnalysisStatus::Ok), 1);
    assert!(summary.render().contains("const-fine: fine"));
}

#[cfg(unix)]
#[tokio::test]
async fn unsafe_label_is_surfaced_first() {
    let dir = tempfile::tempdir().unwrap();
    let path = artifact(dir.path());
    let dispatcher = AnalysisDispatcher::new(DispatcherConfig::default())
        .with_task(constant("a"))
        .with_task(constant("b"))
        .with_task(constant("c"))
        .with_task(AnalysisTask::new(
            "safety",
            Arc::new(CommandCapability::safety("echo nsfw").unwrap()),
        ));

    let summary = dispatcher.analyze(&path, OwnerId::new(1)).await;

    assert!(summary.has_warnings());
    let inline = summary.inline();
    assert_eq!(inline.len(), 3);
    assert_eq!(inline[0].task, "safety");
    assert!(inline[0].flagged);
    assert_eq!(summary.secondary_count(), 1);
    assert!(summary.render().starts_with("[!] safety: nsfw"));
}

#[tokio::test]
async fn full_report_is_written_with_every_outcome() {
    let dir = tempfile::tempdir().unwrap();
    let path = artifact(dir.path());
    let dispatcher = AnalysisDispatcher::new(DispatcherConfig::default())
        .with_task(constant("a"))
        .with_task(constant("b"))
        .with_task(constant("c"))
        .with_task(constant("d"))
        .with_task(constant(""));

    let summary = dispatcher.analyze(&path, OwnerId::new(1)).await;
    assert_eq!(summary.secondary_count(), 2);

    let report_path = summary.write_report(&dir.path().join("reports")).await.unwrap();
    let report = std::fs::read_to_string(report_path).unwrap();
    assert!(report.starts_with("Analysis report (5 tasks,"));
    assert!(report.contains("ok: 5, error: 0, timeout: 0"));
    for task in ["const-a", "const-b", "const-c", "const-d", "const-"] {
        assert!(report.contains(task), "missing {task}");
    }
}

#[tokio::test]
async fn cached_results_are_still_logged() {
    let dir = tempfile::tempdir().unwrap();
    let path = artifact(dir.path());
    let history = Arc::new(MemoryHistoryStore::new());
    let cache = Arc::new(AnalysisCache::new(16));
    let dispatcher = AnalysisDispatcher::new(DispatcherConfig::default())
        .with_task(AnalysisTask::new("metadata", Arc::new(MetadataCapability)).with_history(true))
        .with_cache(Arc::clone(&cache))
        .with_history(history.clone());

    let owner = OwnerId::new(11);
    let first = dispatcher.analyze(&path, owner).await;
    let second = dispatcher.analyze(&path, owner).await;

    assert_eq!(first.outcomes(), second.outcomes());
    assert_eq!(cache.len(), 1);
    assert_eq!(history.query(owner, Some("metadata"), None).unwrap().len(), 2);
}
