//! End-to-end download tests against a mock HTTP server.

// Integration tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(clippy::expect_used, clippy::unwrap_used)]

use async_trait::async_trait;
use httpmock::Method::HEAD;
use httpmock::prelude::*;
use mediaflow::config::TransferSettings;
use mediaflow::services::download::{DownloadConfig, DownloadService};
use mediaflow::storage::{StorageConfig, StorageManager};
use mediaflow::transfer::{HttpFetcher, ResourceFetcher, TransferEngine, TransferEngineConfig};
use mediaflow::{
    Category, Error, HistoryStore, MemoryHistoryStore, OwnerId, ResourceProbe, ResourceThresholds,
    TransferRequest, TransferStrategy,
};
use std::path::Path;
use std::sync::Arc;

struct IdleHost;

#[async_trait]
impl ResourceProbe for IdleHost {
    async fn available(&self, _thresholds: &ResourceThresholds) -> bool {
        true
    }
}

struct Harness {
    service: DownloadService,
    history: Arc<MemoryHistoryStore>,
    root: tempfile::TempDir,
    staging: tempfile::TempDir,
}

fn harness(strategy_fallback: bool) -> Harness {
    let root = tempfile::tempdir().unwrap();
    let staging = tempfile::tempdir().unwrap();
    let history = Arc::new(MemoryHistoryStore::new());
    let storage = Arc::new(StorageManager::new(StorageConfig::new(root.path(), 1 << 30)));
    let fetcher = Arc::new(HttpFetcher::new(&TransferSettings::default()).unwrap());
    let engine = TransferEngine::new(
        Arc::new(IdleHost),
        TransferEngineConfig::default().with_chunk_size(512),
    );
    let config = DownloadConfig {
        chunked_threshold: 50 << 20,
        max_file_size: 2_000 << 20,
        max_parallel: 3,
        staging_dir: staging.path().to_path_buf(),
        strategy_fallback,
        secondary_derivations: false,
    };
    let service = DownloadService::new(fetcher, engine, storage, history.clone(), config);
    Harness {
        service,
        history,
        root,
        staging,
    }
}

fn staging_is_empty(dir: &Path) -> bool {
    std::fs::read_dir(dir).unwrap().next().is_none()
}

#[tokio::test]
async fn resolve_reads_headers() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(HEAD).path("/get");
            then.status(200)
                .header("content-type", "image/png")
                .header("content-disposition", "attachment; filename=\"Holiday Photo.png\"");
        })
        .await;

    let fetcher = HttpFetcher::new(&TransferSettings::default()).unwrap();
    let metadata = fetcher.resolve(&server.url("/get")).await.unwrap();

    assert_eq!(metadata.title, "Holiday Photo");
    assert_eq!(metadata.extension.as_deref(), Some("png"));
    assert_eq!(metadata.media_type.as_deref(), Some("image/png"));
}

#[tokio::test]
async fn resolve_rejects_non_http_locators() {
    let fetcher = HttpFetcher::new(&TransferSettings::default()).unwrap();
    let err = fetcher.resolve("ftp://example.com/a.mp4").await.unwrap_err();
    assert!(matches!(err, Error::Extraction { .. }));
}

#[tokio::test]
async fn download_places_file_and_logs_history() {
    let server = MockServer::start_async().await;
    let body: Vec<u8> = (0..2048u32).map(|i| (i % 251) as u8).collect();
    server
        .mock_async(|when, then| {
            when.method(HEAD).path("/clips/video.mp4");
            then.status(405);
        })
        .await;
    let get = server
        .mock_async(|when, then| {
            when.method(GET).path("/clips/video.mp4");
            then.status(200).header("content-type", "video/mp4").body(&body);
        })
        .await;

    let h = harness(true);
    let locator = server.url("/clips/video.mp4?x=1");
    let outcome = h
        .service
        .fetch(&TransferRequest::new(&locator, OwnerId::new(42)))
        .await;

    get.assert_async().await;
    assert!(outcome.is_success(), "{}", outcome.message);
    assert_eq!(outcome.category, Category::Video);
    assert_eq!(outcome.strategy, Some(TransferStrategy::Direct));
    assert_eq!(outcome.bytes, 2048);

    let path = outcome.local_path.unwrap();
    assert_eq!(path, h.root.path().join("videos").join("video.mp4"));
    assert_eq!(std::fs::read(&path).unwrap(), body);
    assert!(staging_is_empty(h.staging.path()));

    let records = h.history.query(OwnerId::new(42), None, None).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].kind, "video");
    assert_eq!(records[0].locator, locator);
}

#[tokio::test]
async fn failed_body_fetch_reports_short_message() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(HEAD).path("/gone.mp4");
            then.status(405);
        })
        .await;
    let get = server
        .mock_async(|when, then| {
            when.method(GET).path("/gone.mp4");
            then.status(404);
        })
        .await;

    let h = harness(false);
    let outcome = h
        .service
        .fetch(&TransferRequest::new(server.url("/gone.mp4"), OwnerId::new(1)))
        .await;

    get.assert_async().await;
    assert!(!outcome.is_success());
    assert!(outcome.local_path.is_none());
    let transfer_message = Error::Transfer {
        locator: String::new(),
        cause: String::new(),
    }
    .user_message();
    assert_eq!(outcome.message, transfer_message);
    assert!(!outcome.message.contains("404"));
    assert!(staging_is_empty(h.staging.path()));
    assert!(h.history.query(OwnerId::new(1), None, None).unwrap().is_empty());
}

#[tokio::test]
async fn metadata_failure_skips_body_fetch() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(HEAD).path("/private.mp4");
            then.status(403);
        })
        .await;

    let h = harness(true);
    let outcome = h
        .service
        .fetch(&TransferRequest::new(server.url("/private.mp4"), OwnerId::new(1)))
        .await;

    assert!(!outcome.is_success());
    assert!(outcome.strategy.is_none());
    let extraction_message = Error::Extraction {
        locator: String::new(),
        cause: String::new(),
    }
    .user_message();
    assert_eq!(outcome.message, extraction_message);
}
