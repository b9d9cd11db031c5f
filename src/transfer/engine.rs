//! Direct and chunked transfers to a local file.

use super::chunk::ChunkAssembler;
use super::fetcher::{ResourceBody, ResourceFetcher};
use super::progress::{ProgressObserver, TransferProgress};
use crate::config::TransferSettings;
use crate::models::TransferStrategy;
use crate::observability::metrics::{RESOURCE_THROTTLE_PAUSES_TOTAL, TRANSFER_BYTES_TOTAL};
use crate::resources::{ResourceProbe, ResourceThresholds};
use crate::{Error, Result};
use futures_util::StreamExt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, instrument, warn};

/// Transfer engine configuration.
#[derive(Debug, Clone)]
pub struct TransferEngineConfig {
    /// Chunk size for chunked transfers.
    pub chunk_size: usize,
    /// Sleep between resource re-checks while throttled.
    pub throttle_backoff: Duration,
    /// Headroom required before starting (direct) or before each chunk.
    pub thresholds: ResourceThresholds,
}

impl Default for TransferEngineConfig {
    fn default() -> Self {
        Self::from_settings(&TransferSettings::default(), ResourceThresholds::default())
    }
}

impl TransferEngineConfig {
    /// Builds the engine configuration from settings.
    #[must_use]
    pub const fn from_settings(settings: &TransferSettings, thresholds: ResourceThresholds) -> Self {
        Self {
            chunk_size: settings.chunk_size,
            throttle_backoff: settings.throttle_backoff,
            thresholds,
        }
    }

    /// Sets the chunk size.
    #[must_use]
    pub const fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Sets the throttle backoff.
    #[must_use]
    pub const fn with_throttle_backoff(mut self, backoff: Duration) -> Self {
        self.throttle_backoff = backoff;
        self
    }
}

/// Fetches resource bodies into local files.
///
/// The engine owns a transfer until it returns; on failure the partial
/// file is removed.
#[derive(Clone)]
pub struct TransferEngine {
    probe: Arc<dyn ResourceProbe>,
    config: TransferEngineConfig,
    observer: Option<ProgressObserver>,
}

impl std::fmt::Debug for TransferEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferEngine")
            .field("config", &self.config)
            .field("observer", &self.observer.is_some())
            .finish_non_exhaustive()
    }
}

impl TransferEngine {
    /// Creates an engine consulting `probe` for throttling.
    #[must_use]
    pub fn new(probe: Arc<dyn ResourceProbe>, config: TransferEngineConfig) -> Self {
        Self {
            probe,
            config,
            observer: None,
        }
    }

    /// Registers a progress observer.
    #[must_use]
    pub fn with_progress_observer(mut self, observer: ProgressObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Engine configuration.
    #[must_use]
    pub const fn config(&self) -> &TransferEngineConfig {
        &self.config
    }

    /// Transfers `locator` into `dest` with the given strategy.
    ///
    /// Returns the number of bytes written.
    ///
    /// # Errors
    ///
    /// Returns `Transfer` on a non-2xx status, a stream error or a write
    /// error. No partial file is left at `dest`.
    #[instrument(skip(self, fetcher), fields(dest = %dest.display()))]
    pub async fn transfer(
        &self,
        fetcher: &dyn ResourceFetcher,
        locator: &str,
        dest: &Path,
        strategy: TransferStrategy,
    ) -> Result<u64> {
        let result = match strategy {
            TransferStrategy::Direct => self.direct(fetcher, locator, dest).await,
            TransferStrategy::Chunked => self.chunked(fetcher, locator, dest).await,
        };

        match result {
            Ok(bytes) => {
                metrics::counter!(TRANSFER_BYTES_TOTAL).increment(bytes);
                info!(bytes, strategy = %strategy, "Transfer complete");
                Ok(bytes)
            },
            Err(e) => {
                if let Err(remove) = tokio::fs::remove_file(dest).await
                    && remove.kind() != std::io::ErrorKind::NotFound
                {
                    warn!(error = %remove, "Could not remove partial file");
                }
                Err(e)
            },
        }
    }

    /// One request, streamed to disk; resources checked only before starting.
    async fn direct(&self, fetcher: &dyn ResourceFetcher, locator: &str, dest: &Path) -> Result<u64> {
        self.wait_for_resources().await;
        let body = open_checked(fetcher, locator).await?;
        let total = body.content_length;
        let mut writer = create_writer(locator, dest).await?;

        let mut stream = body.stream;
        let mut written = 0u64;
        while let Some(piece) = stream.next().await {
            let piece = piece?;
            write_all(&mut writer, locator, &piece).await?;
            written += piece.len() as u64;
        }
        finish(&mut writer, locator).await?;
        self.report(TransferProgress {
            bytes_written: written,
            total,
        });
        Ok(written)
    }

    /// One request, read in fixed-size chunks with a resource check before each.
    async fn chunked(&self, fetcher: &dyn ResourceFetcher, locator: &str, dest: &Path) -> Result<u64> {
        let body = open_checked(fetcher, locator).await?;
        let total = body.content_length;
        let mut writer = create_writer(locator, dest).await?;
        let mut chunks = ChunkAssembler::new(body.stream, self.config.chunk_size);

        let mut written = 0u64;
        loop {
            self.wait_for_resources().await;
            let Some(chunk) = chunks.next_chunk().await else {
                break;
            };
            let chunk = chunk?;
            write_all(&mut writer, locator, &chunk).await?;
            written += chunk.len() as u64;

            let progress = TransferProgress {
                bytes_written: written,
                total,
            };
            debug!(progress = %progress, "Chunk written");
            self.report(progress);
        }
        finish(&mut writer, locator).await?;
        Ok(written)
    }

    /// Cooperative throttle: sleeps the backoff until the probe reports
    /// headroom. Never gives up.
    async fn wait_for_resources(&self) {
        while !self.probe.available(&self.config.thresholds).await {
            let error = Error::ResourceExhausted {
                reason: "host below resource thresholds".to_string(),
            };
            debug!(error = %error, backoff = ?self.config.throttle_backoff, "Throttling transfer");
            metrics::counter!(RESOURCE_THROTTLE_PAUSES_TOTAL).increment(1);
            tokio::time::sleep(self.config.throttle_backoff).await;
        }
    }

    fn report(&self, progress: TransferProgress) {
        if let Some(observer) = &self.observer {
            observer(progress);
        }
    }
}

async fn open_checked(fetcher: &dyn ResourceFetcher, locator: &str) -> Result<ResourceBody> {
    let body = fetcher.open(locator).await?;
    if !body.is_success() {
        return Err(Error::Transfer {
            locator: locator.to_string(),
            cause: format!("server returned status {}", body.status),
        });
    }
    Ok(body)
}

async fn create_writer(locator: &str, dest: &Path) -> Result<BufWriter<File>> {
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| io_error(locator, &e))?;
    }
    let file = File::create(dest).await.map_err(|e| io_error(locator, &e))?;
    Ok(BufWriter::new(file))
}

async fn write_all(writer: &mut BufWriter<File>, locator: &str, data: &[u8]) -> Result<()> {
    writer.write_all(data).await.map_err(|e| io_error(locator, &e))
}

async fn finish(writer: &mut BufWriter<File>, locator: &str) -> Result<()> {
    writer.flush().await.map_err(|e| io_error(locator, &e))?;
    writer.get_mut().sync_all().await.map_err(|e| io_error(locator, &e))
}

fn io_error(locator: &str, e: &std::io::Error) -> Error {
    Error::Transfer {
        locator: locator.to_string(),
        cause: e.to_string(),
    }
}
