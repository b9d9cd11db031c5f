//! # Mediaflow
//!
//! Resource-aware media download, analysis and storage core for chat bots.
//!
//! Mediaflow sits between a chat transport and the filesystem: URLs are
//! resolved and fetched with a size-dependent strategy, received media is
//! fanned out to independent analysis capabilities, and every stored
//! artifact lives under a byte budget enforced by oldest-first eviction.
//!
//! ## Features
//!
//! - Direct or chunked transfers, throttled by host CPU/memory/disk headroom
//! - Bounded, timeout-guarded concurrent analysis with partial results
//! - Capacity-bounded storage with modification-time eviction
//! - Append-only per-owner history log
//! - Transport-agnostic router producing structured replies
//!
//! ## Example
//!
//! ```rust,ignore
//! use mediaflow::{DownloadService, MediaflowConfig, OwnerId, TransferRequest};
//!
//! let config = MediaflowConfig::load_default()?;
//! let service = DownloadService::from_config(&config)?;
//! let request = TransferRequest::new("https://example.com/video.mp4", OwnerId::new(42));
//! let outcome = service.fetch(&request).await;
//! println!("{} -> {:?}", outcome.category, outcome.local_path);
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]

use std::path::PathBuf;
use thiserror::Error as ThisError;

pub mod config;
pub mod history;
pub mod models;
pub mod observability;
pub mod resources;
pub mod router;
pub mod services;
pub mod storage;
pub mod transfer;

pub use config::{FeatureFlags, MediaflowConfig};
pub use history::{FilesystemHistoryStore, HistoryStore, MemoryHistoryStore};
pub use models::{
    AnalysisOutcome, AnalysisStatus, Category, HistoryRecord, OwnerId, TransferOutcome,
    TransferRequest, TransferStatus, TransferStrategy,
};
pub use resources::{ResourceProbe, ResourceThresholds, SystemResourceMonitor};
pub use router::{InboundEvent, Reply, Router};
pub use services::{AnalysisDispatcher, DownloadService};
pub use storage::StorageManager;
pub use transfer::{HttpFetcher, ResourceFetcher, TransferEngine};

/// Error type for mediaflow operations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `InvalidInput` | Malformed URLs, invalid configuration values |
/// | `ResourceExhausted` | Host headroom below thresholds (retried, never terminal) |
/// | `Extraction` | Metadata resolution for a locator failed |
/// | `Transfer` | Body fetch failed (status, stream or write error) |
/// | `Placement` | Moving a finished file into managed storage failed |
/// | `AnalysisTimeout` | A single analysis task exceeded its timeout |
/// | `Analysis` | A single analysis capability returned an error |
/// | `Eviction` | Deleting an eviction candidate failed (logged, not propagated) |
/// | `OperationFailed` | I/O, serialization or initialization failures |
#[derive(Debug, ThisError)]
pub enum Error {
    /// Invalid input was provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Host resources are below the configured thresholds.
    #[error("resources exhausted: {reason}")]
    ResourceExhausted {
        /// Which threshold was not met.
        reason: String,
    },

    /// Resolving metadata for a locator failed.
    #[error("extraction failed for '{locator}': {cause}")]
    Extraction {
        /// The source locator.
        locator: String,
        /// The underlying cause.
        cause: String,
    },

    /// Fetching the body of a resource failed.
    #[error("transfer failed for '{locator}': {cause}")]
    Transfer {
        /// The source locator.
        locator: String,
        /// The underlying cause.
        cause: String,
    },

    /// Moving a finished file into managed storage failed.
    ///
    /// The file may remain at `path` for manual recovery.
    #[error("placement of '{}' failed: {cause}", path.display())]
    Placement {
        /// Where the unplaced file currently lives.
        path: PathBuf,
        /// The underlying cause.
        cause: String,
    },

    /// An analysis task exceeded its timeout.
    #[error("analysis task '{task}' timed out")]
    AnalysisTimeout {
        /// The task name.
        task: String,
    },

    /// An analysis capability failed.
    #[error("analysis task '{task}' failed: {cause}")]
    Analysis {
        /// The task name.
        task: String,
        /// The underlying cause.
        cause: String,
    },

    /// Deleting an eviction candidate failed.
    #[error("eviction of '{}' failed: {cause}", path.display())]
    Eviction {
        /// The candidate that could not be deleted.
        path: PathBuf,
        /// The underlying cause.
        cause: String,
    },

    /// An operation failed.
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },
}

impl Error {
    /// Returns the short, non-technical message shown to a chat user.
    ///
    /// Technical detail stays in `Display`, which is only logged.
    #[must_use]
    pub const fn user_message(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "That request doesn't look right. Check it and try again.",
            Self::ResourceExhausted { .. } => "The server is busy right now. Try again shortly.",
            Self::Extraction { .. } => "Couldn't read that link. It may be private or unsupported.",
            Self::Transfer { .. } => "The download failed. Try again later.",
            Self::Placement { .. } => "The file was downloaded but couldn't be stored.",
            Self::AnalysisTimeout { .. } => "The analysis took too long.",
            Self::Analysis { .. } => "The analysis failed.",
            Self::Eviction { .. } | Self::OperationFailed { .. } => {
                "Something went wrong. Try again in a moment."
            },
        }
    }

    /// Builds an `OperationFailed` from any displayable cause.
    pub fn operation(operation: &str, cause: impl std::fmt::Display) -> Self {
        Self::OperationFailed {
            operation: operation.to_string(),
            cause: cause.to_string(),
        }
    }
}

/// Result type alias for mediaflow operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Returns the current Unix timestamp in seconds.
///
/// Falls back to 0 if the system clock is before the Unix epoch.
#[must_use]
pub fn current_timestamp() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidInput("test error".to_string());
        assert_eq!(err.to_string(), "invalid input: test error");

        let err = Error::Transfer {
            locator: "https://example.com/a.mp4".to_string(),
            cause: "status 404".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "transfer failed for 'https://example.com/a.mp4': status 404"
        );

        let err = Error::Placement {
            path: PathBuf::from("/tmp/a.mp4"),
            cause: "denied".to_string(),
        };
        assert_eq!(err.to_string(), "placement of '/tmp/a.mp4' failed: denied");
    }

    #[test]
    fn test_user_message_hides_detail() {
        let err = Error::Extraction {
            locator: "https://secret.internal/x".to_string(),
            cause: "dns error: secret.internal".to_string(),
        };
        assert!(!err.user_message().contains("secret"));
        assert!(!err.user_message().is_empty());
    }
}
