//! Conversation flows through the router with fake network and analysis.

// Integration tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(clippy::expect_used, clippy::unwrap_used)]

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream;
use mediaflow::models::ResourceMetadata;
use mediaflow::router::CallbackAction;
use mediaflow::services::analysis::{AnalysisDispatcher, AnalysisTask, DispatcherConfig};
use mediaflow::services::download::{DownloadConfig, DownloadService};
use mediaflow::storage::{DeferredCleanup, StorageConfig, StorageManager};
use mediaflow::transfer::{ResourceBody, ResourceFetcher, TransferEngine, TransferEngineConfig};
use mediaflow::{
    HistoryStore, InboundEvent, MemoryHistoryStore, OwnerId, Reply, ResourceProbe,
    ResourceThresholds, Result, Router,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

const OWNER: OwnerId = OwnerId::new(77);

struct IdleHost;

#[async_trait]
impl ResourceProbe for IdleHost {
    async fn available(&self, _thresholds: &ResourceThresholds) -> bool {
        true
    }
}

struct StaticFetcher;

#[async_trait]
impl ResourceFetcher for StaticFetcher {
    async fn resolve(&self, _locator: &str) -> Result<ResourceMetadata> {
        Ok(ResourceMetadata {
            title: "Sunset".to_string(),
            extension: Some("mp4".to_string()),
            estimated_size: Some(6),
            duration_secs: Some(42.0),
            media_type: Some("video/mp4".to_string()),
        })
    }

    async fn open(&self, _locator: &str) -> Result<ResourceBody> {
        Ok(ResourceBody {
            status: 200,
            content_length: Some(6),
            stream: Box::pin(stream::iter(vec![Ok(Bytes::from_static(b"frames"))])),
        })
    }
}

struct Fixture {
    router: Router,
    history: Arc<MemoryHistoryStore>,
    root: tempfile::TempDir,
    _staging: tempfile::TempDir,
    reports: tempfile::TempDir,
}

fn fixture(analysis_tasks: usize) -> Fixture {
    let root = tempfile::tempdir().unwrap();
    let staging = tempfile::tempdir().unwrap();
    let reports = tempfile::tempdir().unwrap();
    let history = Arc::new(MemoryHistoryStore::new());
    let storage = Arc::new(StorageManager::new(StorageConfig::new(root.path(), 1 << 20)));

    let downloads = DownloadService::new(
        Arc::new(StaticFetcher),
        TransferEngine::new(Arc::new(IdleHost), TransferEngineConfig::default()),
        storage,
        history.clone(),
        DownloadConfig {
            chunked_threshold: 1 << 20,
            max_file_size: 1 << 20,
            max_parallel: 2,
            staging_dir: staging.path().to_path_buf(),
            strategy_fallback: false,
            secondary_derivations: false,
        },
    );

    let mut analysis = AnalysisDispatcher::new(DispatcherConfig::default())
        .with_history(history.clone());
    for i in 0..analysis_tasks {
        analysis = analysis.with_task(
            AnalysisTask::new(
                format!("task{i}"),
                Arc::new(move |_: &Path, _: OwnerId| -> Result<String> {
                    Ok(format!("finding {i}"))
                }),
            )
            .with_history(true),
        );
    }

    let router = Router::new(
        Arc::new(downloads),
        Arc::new(analysis),
        history.clone(),
        DeferredCleanup::new(Duration::from_secs(3600)),
        reports.path(),
    );
    Fixture {
        router,
        history,
        root,
        _staging: staging,
        reports,
    }
}

fn text(body: &str) -> InboundEvent {
    InboundEvent::Text {
        owner: OWNER,
        message_id: 1,
        text: body.to_string(),
    }
}

fn callback(action: &CallbackAction) -> InboundEvent {
    InboundEvent::Callback {
        owner: OWNER,
        message_id: 2,
        data: action.to_data(),
    }
}

async fn single(router: &Router, event: InboundEvent) -> Reply {
    let mut replies = router.handle(event).await;
    assert_eq!(replies.len(), 1, "{replies:?}");
    replies.remove(0)
}

#[tokio::test]
async fn start_and_help_reply_with_text() {
    let f = fixture(0);
    assert!(single(&f.router, text("/start")).await.text.starts_with("Welcome!"));
    let help = single(&f.router, text("/help@media_bot")).await;
    assert!(help.text.contains("/history [kind]"));
    assert!(help.buttons.is_empty());
}

#[tokio::test]
async fn empty_history_has_no_buttons() {
    let f = fixture(0);
    let reply = single(&f.router, text("/history")).await;
    assert_eq!(reply.text, "No history recorded yet.");
    assert!(reply.buttons.is_empty());
}

#[tokio::test]
async fn link_is_downloaded_then_listed() {
    let f = fixture(0);

    let reply = single(&f.router, text("look at https://cdn.example/clips/sunset.mp4 !")).await;
    assert_eq!(reply.text, "Video downloaded: Sunset");
    assert_eq!(
        reply.attachment.unwrap(),
        f.root.path().join("videos").join("sunset.mp4")
    );

    let history = single(&f.router, text("/history video")).await;
    assert!(history.text.contains("1. Video: Sunset"));
    assert!(history.text.contains("Duration: 0:42"));
    let actions: Vec<&CallbackAction> = history.buttons.iter().map(|b| &b.action).collect();
    assert_eq!(
        actions,
        vec![&CallbackAction::ClearHistory, &CallbackAction::HistoryStats]
    );

    let stats = single(&f.router, callback(&CallbackAction::HistoryStats)).await;
    assert!(stats.text.starts_with("Total: 1"));

    let cleared = single(&f.router, callback(&CallbackAction::ClearHistory)).await;
    assert_eq!(cleared.text, "History cleared (1 records removed).");
    assert!(f.history.query(OWNER, None, None).unwrap().is_empty());
}

#[tokio::test]
async fn several_links_reply_in_order() {
    let f = fixture(0);
    let replies = f
        .router
        .handle(text("https://a.example/one.mp4 and https://b.example/two.mp4"))
        .await;
    let names: Vec<String> = replies
        .iter()
        .map(|r| {
            r.attachment
                .as_ref()
                .unwrap()
                .file_name()
                .unwrap()
                .to_string_lossy()
                .into_owned()
        })
        .collect();
    assert_eq!(names, vec!["one.mp4", "two.mp4"]);
}

#[tokio::test]
async fn small_talk_and_unknown_commands() {
    let f = fixture(0);
    assert!(single(&f.router, text("Hello!")).await.text.starts_with("Hello!"));
    assert!(
        single(&f.router, text("what is this"))
            .await
            .text
            .starts_with("I didn't understand")
    );
    assert!(
        single(&f.router, text("/dance"))
            .await
            .text
            .starts_with("Unknown command /dance")
    );
}

#[tokio::test]
async fn media_with_few_results_has_no_report_button() {
    let f = fixture(2);
    let photo = f.root.path().join("incoming.jpg");
    std::fs::write(&photo, b"jpeg").unwrap();

    let reply = single(
        &f.router,
        InboundEvent::Media {
            owner: OWNER,
            message_id: 3,
            path: photo,
        },
    )
    .await;

    assert_eq!(reply.text, "[ok] task0: finding 0\n[ok] task1: finding 1");
    assert!(reply.buttons.is_empty());
    assert_eq!(f.history.query(OWNER, None, None).unwrap().len(), 2);
}

#[tokio::test]
async fn media_with_many_results_offers_full_report() {
    let f = fixture(5);
    let photo = f.root.path().join("incoming.jpg");
    std::fs::write(&photo, b"jpeg").unwrap();

    let reply = single(
        &f.router,
        InboundEvent::Media {
            owner: OWNER,
            message_id: 3,
            path: photo,
        },
    )
    .await;

    assert!(reply.text.ends_with("+2 more results"), "{}", reply.text);
    assert_eq!(reply.buttons.len(), 1);
    let action = reply.buttons[0].action.clone();
    assert!(matches!(action, CallbackAction::FullReport(_)));

    let report = single(&f.router, callback(&action)).await;
    let path = report.attachment.unwrap();
    assert!(path.starts_with(f.reports.path()));
    let body = std::fs::read_to_string(path).unwrap();
    assert!(body.contains("task4: finding 4"));
}

#[tokio::test]
async fn full_report_is_only_served_to_its_owner() {
    let f = fixture(5);
    let photo = f.root.path().join("incoming.jpg");
    std::fs::write(&photo, b"jpeg").unwrap();
    let reply = single(
        &f.router,
        InboundEvent::Media {
            owner: OWNER,
            message_id: 3,
            path: photo,
        },
    )
    .await;
    let action = reply.buttons[0].action.clone();

    let foreign = single(
        &f.router,
        InboundEvent::Callback {
            owner: OwnerId::new(78),
            message_id: 2,
            data: action.to_data(),
        },
    )
    .await;
    assert!(foreign.attachment.is_none());
    assert!(foreign.text.contains("expired"));

    let own = single(&f.router, callback(&action)).await;
    assert!(own.attachment.is_some());
}

#[tokio::test]
async fn stale_buttons_are_answered() {
    let f = fixture(0);
    let expired = single(
        &f.router,
        callback(&CallbackAction::FullReport("missing".to_string())),
    )
    .await;
    assert!(expired.text.contains("expired"));

    let unknown = single(
        &f.router,
        InboundEvent::Callback {
            owner: OWNER,
            message_id: 4,
            data: "manga_page:2".to_string(),
        },
    )
    .await;
    assert_eq!(unknown.text, "That button is no longer available.");
}
