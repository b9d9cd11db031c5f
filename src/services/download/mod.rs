//! Download strategy selection and orchestration.
//!
//! A request flows through normalization, metadata resolution, strategy
//! selection, transfer into a private staging directory, classification,
//! placement into managed storage and a history append. Videos may then
//! get secondary artifacts.
//!
//! Every public entry point returns a [`TransferOutcome`]; terminal errors
//! are logged with full detail and reported with a short user message.

mod derive;
mod normalize;

pub use derive::{DerivationKind, FfmpegDeriver, MediaDeriver};
pub use normalize::{extract_locators, normalize_locator};

use crate::config::MediaflowConfig;
use crate::history::{FilesystemHistoryStore, HistoryStore, append_blocking, capitalize};
use crate::models::{
    Category, HistoryRecord, OwnerId, ResourceMetadata, TransferOutcome, TransferRequest,
    TransferStatus, TransferStrategy,
};
use crate::observability::metrics::{TRANSFER_DURATION_MS, TRANSFER_OUTCOMES_TOTAL, duration_ms};
use crate::resources::SystemResourceMonitor;
use crate::storage::{StorageConfig, StorageManager};
use crate::transfer::{
    FALLBACK_NAME, HttpFetcher, ResourceFetcher, TransferEngine, TransferEngineConfig,
    filename_from_locator, sanitize, with_default_extension,
};
use crate::{Error, Result};
use futures_util::StreamExt;
use futures_util::stream;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, instrument, warn};

/// Download service configuration.
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    /// Estimated size above which the chunked strategy is selected.
    pub chunked_threshold: u64,
    /// Resources declaring more than this are rejected.
    pub max_file_size: u64,
    /// Concurrency bound for [`DownloadService::fetch_many`].
    pub max_parallel: usize,
    /// Directory for in-flight transfers, outside the managed root.
    pub staging_dir: PathBuf,
    /// Retry once with the alternate strategy after a transfer error.
    pub strategy_fallback: bool,
    /// Derive audio and a still frame from videos.
    pub secondary_derivations: bool,
}

impl DownloadConfig {
    /// Builds the download configuration from the application config.
    #[must_use]
    pub fn from_config(config: &MediaflowConfig) -> Self {
        Self {
            chunked_threshold: config.transfer.chunked_threshold,
            max_file_size: config.transfer.max_file_size,
            max_parallel: config.transfer.max_parallel,
            staging_dir: config.staging_dir(),
            strategy_fallback: config.features.strategy_fallback,
            secondary_derivations: config.features.secondary_derivations,
        }
    }
}

/// Chooses the transfer strategy for a resource.
///
/// Unknown sizes are fetched directly.
#[must_use]
pub fn select_strategy(estimated_size: Option<u64>, chunked_threshold: u64) -> TransferStrategy {
    match estimated_size {
        Some(size) if size > chunked_threshold => TransferStrategy::Chunked,
        _ => TransferStrategy::Direct,
    }
}

/// Strategy selector and download orchestrator.
pub struct DownloadService {
    fetcher: Arc<dyn ResourceFetcher>,
    engine: TransferEngine,
    storage: Arc<StorageManager>,
    history: Arc<dyn HistoryStore>,
    deriver: Option<Arc<dyn MediaDeriver>>,
    config: DownloadConfig,
}

impl std::fmt::Debug for DownloadService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadService")
            .field("engine", &self.engine)
            .field("storage", &self.storage)
            .field("config", &self.config)
            .field("deriver", &self.deriver.is_some())
            .finish_non_exhaustive()
    }
}

impl DownloadService {
    /// Creates a service from its collaborators.
    #[must_use]
    pub fn new(
        fetcher: Arc<dyn ResourceFetcher>,
        engine: TransferEngine,
        storage: Arc<StorageManager>,
        history: Arc<dyn HistoryStore>,
        config: DownloadConfig,
    ) -> Self {
        Self {
            fetcher,
            engine,
            storage,
            history,
            deriver: None,
            config,
        }
    }

    /// Sets the deriver used for secondary artifacts.
    #[must_use]
    pub fn with_deriver(mut self, deriver: Arc<dyn MediaDeriver>) -> Self {
        self.deriver = Some(deriver);
        self
    }

    /// Builds a service with the default HTTP, system and filesystem
    /// collaborators.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client or the history directory cannot
    /// be created.
    pub fn from_config(config: &MediaflowConfig) -> Result<Self> {
        let storage = Arc::new(StorageManager::new(StorageConfig::from_config(config)));
        let history: Arc<dyn HistoryStore> =
            Arc::new(FilesystemHistoryStore::new(config.history_dir())?);
        Self::from_parts(config, storage, history)
    }

    /// Builds a service sharing existing storage and history.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_parts(
        config: &MediaflowConfig,
        storage: Arc<StorageManager>,
        history: Arc<dyn HistoryStore>,
    ) -> Result<Self> {
        let fetcher = Arc::new(HttpFetcher::new(&config.transfer)?);
        let probe = Arc::new(SystemResourceMonitor::new(config.downloads_dir()));
        let engine = TransferEngine::new(
            probe,
            TransferEngineConfig::from_settings(&config.transfer, config.resources),
        );
        let service = Self::new(
            fetcher,
            engine,
            storage,
            history,
            DownloadConfig::from_config(config),
        );
        Ok(if config.features.secondary_derivations {
            service.with_deriver(Arc::new(FfmpegDeriver::default()))
        } else {
            service
        })
    }

    /// Service configuration.
    #[must_use]
    pub const fn config(&self) -> &DownloadConfig {
        &self.config
    }

    /// Fetches one resource. Never fails; errors become `Error` outcomes.
    #[instrument(skip(self, request), fields(owner = %request.owner, locator = %request.locator))]
    pub async fn fetch(&self, request: &TransferRequest) -> TransferOutcome {
        let start = Instant::now();
        let locator = normalize_locator(&request.locator);

        let outcome = match self.try_fetch(request, &locator, start).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(error = %e, "Download failed");
                TransferOutcome::failure(&locator, e.user_message(), start.elapsed())
            },
        };

        let strategy = outcome.strategy.map_or("none", |s| s.as_str());
        let status = if outcome.is_success() { "success" } else { "error" };
        metrics::counter!(TRANSFER_OUTCOMES_TOTAL, "strategy" => strategy, "status" => status)
            .increment(1);
        metrics::histogram!(TRANSFER_DURATION_MS, "strategy" => strategy)
            .record(duration_ms(outcome.elapsed));
        outcome
    }

    /// Fetches several resources concurrently, at most `max_parallel` at a
    /// time. Outcomes are returned in input order.
    pub async fn fetch_many(&self, locators: &[String], owner: OwnerId) -> Vec<TransferOutcome> {
        let requests: Vec<TransferRequest> = locators
            .iter()
            .map(|locator| TransferRequest::new(locator.clone(), owner))
            .collect();
        stream::iter(requests.iter().map(|request| self.fetch(request)))
            .buffered(self.config.max_parallel.max(1))
            .collect()
            .await
    }

    async fn try_fetch(
        &self,
        request: &TransferRequest,
        locator: &str,
        start: Instant,
    ) -> Result<TransferOutcome> {
        let metadata = self.fetcher.resolve(locator).await?;
        if let Some(size) = metadata.estimated_size.filter(|&s| s > self.config.max_file_size) {
            return Err(Error::Extraction {
                locator: locator.to_string(),
                cause: format!(
                    "resource size {size} exceeds limit {}",
                    self.config.max_file_size
                ),
            });
        }

        let file_name = local_file_name(locator, &metadata);
        let category = classify(&file_name, request.category_hint);
        let staging = self.config.staging_dir.join(uuid::Uuid::new_v4().to_string());
        let staged = staging.join(&file_name);

        let selected = select_strategy(metadata.estimated_size, self.config.chunked_threshold);
        let result = self.transfer_with_fallback(locator, &staged, selected).await;
        let (bytes, strategy) = match result {
            Ok(done) => done,
            Err(e) => {
                remove_staging_dir(&staging).await;
                return Err(e);
            },
        };

        // On placement failure the file stays in staging for recovery.
        let final_path = self.storage.place(&staged, category).await?;
        remove_staging_dir(&staging).await;

        let title = if metadata.title.is_empty() {
            file_name.clone()
        } else {
            metadata.title.clone()
        };
        self.record_history(
            HistoryRecord::new(request.owner, &title, category.as_str())
                .with_locator(locator)
                .with_duration(metadata.duration_secs),
        )
        .await;

        let secondary = if category == Category::Video && self.config.secondary_derivations {
            self.derive_secondary(&final_path, request.owner, locator).await
        } else {
            Vec::new()
        };

        info!(
            path = %final_path.display(),
            bytes,
            category = %category,
            strategy = %strategy,
            "Download placed"
        );

        Ok(TransferOutcome {
            status: TransferStatus::Success,
            locator: locator.to_string(),
            local_path: Some(final_path),
            bytes,
            category,
            strategy: Some(strategy),
            message: format!("{} downloaded: {title}", capitalize(category.as_str())),
            title: Some(title),
            duration_secs: metadata.duration_secs,
            elapsed: start.elapsed(),
            secondary,
        })
    }

    /// Runs the selected strategy, then the alternate one once on a
    /// transfer error.
    async fn transfer_with_fallback(
        &self,
        locator: &str,
        staged: &Path,
        selected: TransferStrategy,
    ) -> Result<(u64, TransferStrategy)> {
        let fetcher = self.fetcher.as_ref();
        match self.engine.transfer(fetcher, locator, staged, selected).await {
            Ok(bytes) => Ok((bytes, selected)),
            Err(e @ Error::Transfer { .. }) if self.config.strategy_fallback => {
                let alternate = selected.alternate();
                warn!(error = %e, from = %selected, to = %alternate, "Retrying with alternate strategy");
                let bytes = self.engine.transfer(fetcher, locator, staged, alternate).await?;
                Ok((bytes, alternate))
            },
            Err(e) => Err(e),
        }
    }

    /// Derives, places and logs secondary artifacts. Failures are logged only.
    async fn derive_secondary(&self, primary: &Path, owner: OwnerId, locator: &str) -> Vec<PathBuf> {
        let Some(deriver) = &self.deriver else {
            return Vec::new();
        };
        let stem = primary
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(FALLBACK_NAME);

        // Artifacts of this outcome are never evicted to make room for its
        // own secondaries.
        let mut protected = vec![primary.to_path_buf()];
        let mut placed = Vec::new();
        for &kind in DerivationKind::all() {
            let staging = self.config.staging_dir.join(uuid::Uuid::new_v4().to_string());
            let dest = staging.join(format!("{stem}.{}", kind.extension()));
            let result = async {
                tokio::fs::create_dir_all(&staging)
                    .await
                    .map_err(|e| Error::operation("create_staging_dir", e))?;
                deriver.derive(primary, kind, &dest).await?;
                self.storage
                    .place_protecting(&dest, kind.category(), &protected)
                    .await
            }
            .await;
            remove_staging_dir(&staging).await;

            match result {
                Ok(path) => {
                    let name = path
                        .file_name()
                        .map_or_else(String::new, |n| n.to_string_lossy().into_owned());
                    self.record_history(
                        HistoryRecord::new(owner, name, kind.category().as_str())
                            .with_locator(locator),
                    )
                    .await;
                    protected.push(path.clone());
                    placed.push(path);
                },
                Err(e) => warn!(error = %e, ?kind, "Secondary derivation failed"),
            }
        }
        placed
    }

    async fn record_history(&self, record: HistoryRecord) {
        if let Err(e) = append_blocking(Arc::clone(&self.history), record).await {
            warn!(error = %e, "Failed to append history record");
        }
    }
}

/// Local file name from the locator, or from the title when the locator
/// has no usable path segment.
fn local_file_name(locator: &str, metadata: &ResourceMetadata) -> String {
    let from_locator = filename_from_locator(locator);
    let base = if from_locator == FALLBACK_NAME && !metadata.title.trim().is_empty() {
        sanitize(metadata.title.trim())
    } else {
        from_locator
    };
    with_default_extension(&base, metadata.extension.as_deref())
}

/// Extension table first; the caller's hint only refines `Other`.
fn classify(file_name: &str, hint: Option<Category>) -> Category {
    match Category::from_path(Path::new(file_name)) {
        Category::Other => hint.unwrap_or(Category::Other),
        category => category,
    }
}

async fn remove_staging_dir(dir: &Path) {
    if let Err(e) = tokio::fs::remove_dir_all(dir).await
        && e.kind() != std::io::ErrorKind::NotFound
    {
        warn!(dir = %dir.display(), error = %e, "Could not remove staging directory");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(None, TransferStrategy::Direct; "unknown size")]
    #[test_case(Some(10), TransferStrategy::Direct; "small")]
    #[test_case(Some(50), TransferStrategy::Direct; "at threshold")]
    #[test_case(Some(51), TransferStrategy::Chunked; "above threshold")]
    fn test_select_strategy(size: Option<u64>, expected: TransferStrategy) {
        assert_eq!(select_strategy(size, 50), expected);
    }

    #[test]
    fn test_local_file_name() {
        let metadata = ResourceMetadata {
            title: "My Clip".to_string(),
            extension: Some("mp4".to_string()),
            ..ResourceMetadata::default()
        };
        assert_eq!(
            local_file_name("https://example.com/video.mp4?x=1", &metadata),
            "video.mp4"
        );
        assert_eq!(local_file_name("https://example.com/", &metadata), "My_Clip.mp4");
        assert_eq!(local_file_name("https://example.com/watch", &metadata), "watch.mp4");
    }

    #[test]
    fn test_classify_prefers_extension() {
        assert_eq!(classify("a.mp4", Some(Category::Audio)), Category::Video);
        assert_eq!(classify("a.bin", Some(Category::Audio)), Category::Audio);
        assert_eq!(classify("a.bin", None), Category::Other);
    }
}
