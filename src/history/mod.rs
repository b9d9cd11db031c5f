//! Append-only per-owner history log.
//!
//! Records are kept in insertion order, which is also chronological order.
//! Every query returns records oldest first, so the most recent record is
//! always last.

mod filesystem;
mod memory;

pub use filesystem::FilesystemHistoryStore;
pub use memory::MemoryHistoryStore;

use crate::models::{HistoryRecord, OwnerId};
use crate::{Error, Result};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;

/// Persistent per-owner log of completed operations.
///
/// Implementations are synchronous and may block on file I/O; they
/// serialize their own writes. Async code appends through
/// [`append_blocking`].
pub trait HistoryStore: Send + Sync {
    /// Appends a record to its owner's log.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be persisted.
    fn append(&self, record: HistoryRecord) -> Result<()>;

    /// Returns the owner's records, optionally filtered by kind.
    ///
    /// With a `limit`, only the last `limit` matching records are returned,
    /// still oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be read.
    fn query(
        &self,
        owner: OwnerId,
        kind: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<HistoryRecord>>;

    /// Deletes every record of the owner. Returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be deleted.
    fn clear(&self, owner: OwnerId) -> Result<usize>;

    /// Returns the last `n` records, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be read.
    fn latest(&self, owner: OwnerId, n: usize) -> Result<Vec<HistoryRecord>> {
        self.query(owner, None, Some(n))
    }
}

/// Appends `record` on the blocking pool.
///
/// # Errors
///
/// Returns the store's error, or an error if the blocking task fails.
pub async fn append_blocking(store: Arc<dyn HistoryStore>, record: HistoryRecord) -> Result<()> {
    tokio::task::spawn_blocking(move || store.append(record))
        .await
        .map_err(|e| Error::operation("history_append", e))?
}

/// Applies kind filter and tail limit to records in insertion order.
pub(crate) fn select(
    records: impl IntoIterator<Item = HistoryRecord>,
    kind: Option<&str>,
    limit: Option<usize>,
) -> Vec<HistoryRecord> {
    let mut selected: Vec<HistoryRecord> = records
        .into_iter()
        .filter(|record| kind.is_none_or(|k| record.kind.eq_ignore_ascii_case(k)))
        .collect();
    if let Some(limit) = limit {
        let skip = selected.len().saturating_sub(limit);
        selected.drain(..skip);
    }
    selected
}

/// Renders records as chat text, numbered oldest first.
#[must_use]
pub fn render_history(records: &[HistoryRecord]) -> String {
    if records.is_empty() {
        return "No history recorded yet.".to_string();
    }

    let mut text = format!("History ({} item(s)):\n\n", records.len());
    for (i, record) in records.iter().enumerate() {
        let _ = writeln!(text, "{}. {}: {}", i + 1, capitalize(&record.kind), record.name);
        if !record.locator.is_empty() {
            let _ = writeln!(text, "   URL: {}", record.locator);
        }
        let _ = writeln!(
            text,
            "   Date: {}",
            record.timestamp.format("%Y-%m-%d %H:%M:%S")
        );
        if let Some(duration) = record.duration_secs {
            let _ = writeln!(text, "   Duration: {}", format_duration(duration));
        }
    }
    text
}

/// Counts records per kind.
#[must_use]
pub fn history_stats(records: &[HistoryRecord]) -> BTreeMap<String, usize> {
    records.iter().fold(BTreeMap::new(), |mut stats, record| {
        *stats.entry(record.kind.clone()).or_insert(0) += 1;
        stats
    })
}

/// Renders per-kind counts as chat text.
#[must_use]
pub fn render_stats(stats: &BTreeMap<String, usize>) -> String {
    if stats.is_empty() {
        return "No history recorded yet.".to_string();
    }
    let total: usize = stats.values().sum();
    let mut text = format!("Total: {total}\n");
    for (kind, count) in stats {
        let _ = writeln!(text, "  {}: {count}", capitalize(kind));
    }
    text
}

pub(crate) fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars).collect()
    })
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn format_duration(secs: f64) -> String {
    let total = secs.max(0.0).round() as u64;
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{hours}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes}:{seconds:02}")
    }
}
