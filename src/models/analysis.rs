//! Analysis outcome types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of one analysis task within a dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisStatus {
    /// The capability returned normally.
    Ok,
    /// The capability failed.
    Error,
    /// The task did not finish within its timeout (or the dispatch deadline).
    Timeout,
}

impl AnalysisStatus {
    /// Returns the status as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Error => "error",
            Self::Timeout => "timeout",
        }
    }
}

impl fmt::Display for AnalysisStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of one analysis task. Ephemeral, never persisted on its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisOutcome {
    /// Task name.
    pub task: String,
    /// Status.
    pub status: AnalysisStatus,
    /// Bounded-length payload: result text for `Ok`, error message for `Error`.
    pub payload: Option<String>,
    /// Whether the task's results are warnings that should always surface.
    pub flagged: bool,
}

impl AnalysisOutcome {
    /// Creates an `Ok` outcome.
    #[must_use]
    pub fn ok(task: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            status: AnalysisStatus::Ok,
            payload: Some(payload.into()),
            flagged: false,
        }
    }

    /// Creates an `Error` outcome carrying the failure message.
    #[must_use]
    pub fn error(task: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            status: AnalysisStatus::Error,
            payload: Some(message.into()),
            flagged: false,
        }
    }

    /// Creates a `Timeout` outcome with no payload.
    #[must_use]
    pub fn timeout(task: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            status: AnalysisStatus::Timeout,
            payload: None,
            flagged: false,
        }
    }

    /// Marks the outcome as a warning.
    #[must_use]
    pub const fn flagged(mut self, flagged: bool) -> Self {
        self.flagged = flagged;
        self
    }

    /// Returns true for outcomes that belong in the inline summary.
    ///
    /// Notable means `Ok` with a non-empty payload, or a flagged `Ok`.
    #[must_use]
    pub fn is_notable(&self) -> bool {
        self.status == AnalysisStatus::Ok
            && (self.flagged
                || self
                    .payload
                    .as_deref()
                    .is_some_and(|payload| !payload.trim().is_empty()))
    }
}

impl fmt::Display for AnalysisOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let marker = match (self.status, self.flagged) {
            (AnalysisStatus::Ok, true) => "[!]",
            (AnalysisStatus::Ok, false) => "[ok]",
            (AnalysisStatus::Error, _) => "[error]",
            (AnalysisStatus::Timeout, _) => "[timeout]",
        };
        match &self.payload {
            Some(payload) if !payload.is_empty() => {
                write!(f, "{marker} {}: {payload}", self.task)
            },
            _ => write!(f, "{marker} {}", self.task),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notable_requires_ok_and_payload() {
        assert!(AnalysisOutcome::ok("qr", "https://example.com").is_notable());
        assert!(!AnalysisOutcome::ok("qr", "   ").is_notable());
        assert!(AnalysisOutcome::ok("safety", "").flagged(true).is_notable());
        assert!(!AnalysisOutcome::error("ocr", "boom").is_notable());
        assert!(!AnalysisOutcome::timeout("ocr").is_notable());
    }

    #[test]
    fn test_display() {
        assert_eq!(AnalysisOutcome::ok("qr", "hello").to_string(), "[ok] qr: hello");
        assert_eq!(AnalysisOutcome::timeout("ocr").to_string(), "[timeout] ocr");
    }
}
