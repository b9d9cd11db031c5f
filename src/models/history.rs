//! History record type.

use super::OwnerId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One completed operation in an owner's append-only history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    /// Owner of the record.
    pub owner: OwnerId,
    /// Artifact name (title or file name).
    pub name: String,
    /// Category or analysis kind (`video`, `photo`, `qr`, ...).
    pub kind: String,
    /// Source locator, empty for local artifacts.
    #[serde(default)]
    pub locator: String,
    /// Media duration in seconds, when known.
    #[serde(default)]
    pub duration_secs: Option<f64>,
    /// When the record was created.
    pub timestamp: DateTime<Utc>,
}

impl HistoryRecord {
    /// Creates a record stamped with the current time.
    #[must_use]
    pub fn new(owner: OwnerId, name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            owner,
            name: name.into(),
            kind: kind.into(),
            locator: String::new(),
            duration_secs: None,
            timestamp: Utc::now(),
        }
    }

    /// Sets the source locator.
    #[must_use]
    pub fn with_locator(mut self, locator: impl Into<String>) -> Self {
        self.locator = locator.into();
        self
    }

    /// Sets the media duration.
    #[must_use]
    pub const fn with_duration(mut self, duration_secs: Option<f64>) -> Self {
        self.duration_secs = duration_secs;
        self
    }
}
