//! Transfer request and outcome types.

use super::{Category, OwnerId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// How a resource body is fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferStrategy {
    /// One request, streamed straight to disk; resources checked once up front.
    Direct,
    /// One request, read in fixed-size chunks with a resource check before each.
    Chunked,
}

impl TransferStrategy {
    /// Returns the strategy as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Chunked => "chunked",
        }
    }

    /// Returns the other strategy, used for a single fallback attempt.
    #[must_use]
    pub const fn alternate(&self) -> Self {
        match self {
            Self::Direct => Self::Chunked,
            Self::Chunked => Self::Direct,
        }
    }
}

impl fmt::Display for TransferStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A request to fetch a remote resource for an owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    /// Source locator (URL).
    pub locator: String,
    /// Requested category, if the caller already knows it.
    pub category_hint: Option<Category>,
    /// Owner of the request.
    pub owner: OwnerId,
}

impl TransferRequest {
    /// Creates a new request without a category hint.
    #[must_use]
    pub fn new(locator: impl Into<String>, owner: OwnerId) -> Self {
        Self {
            locator: locator.into(),
            category_hint: None,
            owner,
        }
    }

    /// Sets the category hint.
    #[must_use]
    pub const fn with_category_hint(mut self, category: Category) -> Self {
        self.category_hint = Some(category);
        self
    }
}

/// Metadata resolved for a resource without downloading its body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceMetadata {
    /// Human-readable title.
    pub title: String,
    /// File extension of the best available format, without the dot.
    pub extension: Option<String>,
    /// Declared or estimated size in bytes.
    pub estimated_size: Option<u64>,
    /// Media duration in seconds, when known.
    pub duration_secs: Option<f64>,
    /// Declared media type (e.g. `video/mp4`).
    pub media_type: Option<String>,
}

/// Terminal status of a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferStatus {
    /// The file was fetched and placed.
    Success,
    /// The transfer failed; see the outcome message.
    Error,
}

/// Result of a completed transfer, handed to storage, history and the caller.
#[derive(Debug, Clone)]
pub struct TransferOutcome {
    /// Terminal status.
    pub status: TransferStatus,
    /// Source locator after normalization.
    pub locator: String,
    /// Final path of the primary artifact (success only).
    pub local_path: Option<PathBuf>,
    /// Bytes written.
    pub bytes: u64,
    /// Category bucket of the primary artifact.
    pub category: Category,
    /// Strategy that produced the file.
    pub strategy: Option<TransferStrategy>,
    /// Resource title.
    pub title: Option<String>,
    /// Media duration in seconds, when known.
    pub duration_secs: Option<f64>,
    /// Wall-clock time spent.
    pub elapsed: Duration,
    /// Short user-facing message.
    pub message: String,
    /// Secondary artifacts derived from the primary one (audio track, still frame).
    pub secondary: Vec<PathBuf>,
}

impl TransferOutcome {
    /// Creates a failed outcome.
    #[must_use]
    pub fn failure(locator: impl Into<String>, message: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            status: TransferStatus::Error,
            locator: locator.into(),
            local_path: None,
            bytes: 0,
            category: Category::Other,
            strategy: None,
            title: None,
            duration_secs: None,
            elapsed,
            message: message.into(),
            secondary: Vec::new(),
        }
    }

    /// Returns true if the transfer succeeded.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.status, TransferStatus::Success)
    }
}
