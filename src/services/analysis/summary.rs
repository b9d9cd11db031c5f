//! Ranked, size-bounded presentation of analysis outcomes.

use crate::models::{AnalysisOutcome, AnalysisStatus};
use crate::{Error, Result};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Maximum notable outcomes shown inline.
pub const INLINE_LIMIT: usize = 3;

/// Outcomes of one dispatch, in registry order.
#[derive(Debug, Clone)]
pub struct AnalysisSummary {
    outcomes: Vec<AnalysisOutcome>,
    elapsed: Duration,
}

impl AnalysisSummary {
    /// Wraps the outcomes of one dispatch.
    #[must_use]
    pub const fn new(outcomes: Vec<AnalysisOutcome>, elapsed: Duration) -> Self {
        Self { outcomes, elapsed }
    }

    /// Every outcome, in registry order.
    #[must_use]
    pub fn outcomes(&self) -> &[AnalysisOutcome] {
        &self.outcomes
    }

    /// Wall-clock time of the dispatch.
    #[must_use]
    pub const fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Up to [`INLINE_LIMIT`] notable outcomes, warnings first.
    #[must_use]
    pub fn inline(&self) -> Vec<&AnalysisOutcome> {
        let mut notable: Vec<&AnalysisOutcome> =
            self.outcomes.iter().filter(|o| o.is_notable()).collect();
        notable.sort_by_key(|o| !o.flagged);
        notable.truncate(INLINE_LIMIT);
        notable
    }

    /// Count of outcomes not shown inline.
    #[must_use]
    pub fn secondary_count(&self) -> usize {
        self.outcomes.len() - self.inline().len()
    }

    /// Returns true if any outcome carries a warning.
    #[must_use]
    pub fn has_warnings(&self) -> bool {
        self.outcomes
            .iter()
            .any(|o| o.flagged && o.status == AnalysisStatus::Ok)
    }

    /// Count of outcomes with the given status.
    #[must_use]
    pub fn count(&self, status: AnalysisStatus) -> usize {
        self.outcomes.iter().filter(|o| o.status == status).count()
    }

    /// Short chat text: inline outcomes plus the count of the rest.
    #[must_use]
    pub fn render(&self) -> String {
        let inline = self.inline();
        let mut text = String::new();
        if inline.is_empty() {
            text.push_str("Nothing notable found.\n");
        } else {
            for outcome in &inline {
                let _ = writeln!(text, "{outcome}");
            }
        }
        let rest = self.secondary_count();
        if rest > 0 {
            let _ = write!(text, "\n+{rest} more result{}", if rest == 1 { "" } else { "s" });
        }
        text.trim_end().to_string()
    }

    /// Every outcome, one per line, with a status tally.
    #[must_use]
    pub fn full_report(&self) -> String {
        let mut text = format!(
            "Analysis report ({} tasks, {:.1}s)\n",
            self.outcomes.len(),
            self.elapsed.as_secs_f64()
        );
        let _ = writeln!(
            text,
            "ok: {}, error: {}, timeout: {}\n",
            self.count(AnalysisStatus::Ok),
            self.count(AnalysisStatus::Error),
            self.count(AnalysisStatus::Timeout)
        );
        for outcome in &self.outcomes {
            let _ = writeln!(text, "{outcome}");
        }
        text
    }

    /// Writes [`full_report`](Self::full_report) to a new file under `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be written.
    pub async fn write_report(&self, dir: &Path) -> Result<PathBuf> {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| Error::operation("create_report_dir", e))?;
        let path = dir.join(format!("analysis-report-{}.txt", uuid::Uuid::new_v4()));
        tokio::fs::write(&path, self.full_report())
            .await
            .map_err(|e| Error::operation("write_report", e))?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> AnalysisSummary {
        AnalysisSummary::new(
            vec![
                AnalysisOutcome::ok("qr", "https://example.com"),
                AnalysisOutcome::ok("ocr", ""),
                AnalysisOutcome::timeout("objects"),
                AnalysisOutcome::ok("metadata", "image/jpeg, 12 KB"),
                AnalysisOutcome::ok("labels", "cat"),
                AnalysisOutcome::ok("safety", "nsfw").flagged(true),
                AnalysisOutcome::error("exif", "boom"),
            ],
            Duration::from_millis(1500),
        )
    }

    #[test]
    fn test_inline_ranks_warnings_first_and_caps() {
        let summary = sample();
        let inline: Vec<&str> = summary.inline().iter().map(|o| o.task.as_str()).collect();
        assert_eq!(inline, vec!["safety", "qr", "metadata"]);
        assert_eq!(summary.secondary_count(), 4);
        assert!(summary.has_warnings());
    }

    #[test]
    fn test_render() {
        let text = sample().render();
        assert!(text.starts_with("[!] safety: nsfw"));
        assert!(text.ends_with("+4 more results"));

        let empty = AnalysisSummary::new(vec![AnalysisOutcome::timeout("qr")], Duration::ZERO);
        assert_eq!(empty.render(), "Nothing notable found.\n\n+1 more result");
    }

    #[tokio::test]
    async fn test_write_report() {
        let dir = tempfile::tempdir().unwrap();
        let summary = sample();
        let path = summary.write_report(dir.path()).await.unwrap();
        let report = std::fs::read_to_string(path).unwrap();
        assert!(report.contains("7 tasks"));
        assert!(report.contains("ok: 5, error: 1, timeout: 1"));
        assert!(report.contains("[error] exif: boom"));
    }
}
