//! Transfer progress reporting.

use std::fmt;
use std::sync::Arc;

/// Cumulative progress of one transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferProgress {
    /// Bytes written so far.
    pub bytes_written: u64,
    /// Advertised total, when the server sent one.
    pub total: Option<u64>,
}

impl TransferProgress {
    /// Percentage complete, if the total is known and non-zero.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn percent(&self) -> Option<f64> {
        self.total
            .filter(|&total| total > 0)
            .map(|total| (self.bytes_written as f64 / total as f64 * 100.0).min(100.0))
    }
}

impl fmt::Display for TransferProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.percent(), self.total) {
            (Some(percent), Some(total)) => {
                write!(f, "{percent:.1}% ({}/{total} bytes)", self.bytes_written)
            },
            _ => write!(f, "{} bytes", self.bytes_written),
        }
    }
}

/// Callback invoked after each chunk is written.
pub type ProgressObserver = Arc<dyn Fn(TransferProgress) + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_with_known_total() {
        let progress = TransferProgress {
            bytes_written: 25,
            total: Some(100),
        };
        assert_eq!(progress.percent(), Some(25.0));
        assert_eq!(progress.to_string(), "25.0% (25/100 bytes)");
    }

    #[test]
    fn test_unknown_total_reports_bytes() {
        let progress = TransferProgress {
            bytes_written: 42,
            total: None,
        };
        assert_eq!(progress.percent(), None);
        assert_eq!(progress.to_string(), "42 bytes");
    }
}
