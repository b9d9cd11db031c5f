//! Analysis capabilities and the registry entries that wrap them.

use crate::Result;
use crate::models::OwnerId;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// One independent analysis over a local artifact.
///
/// Capabilities are blocking: the dispatcher runs them on the blocking
/// worker pool. A timed-out call is abandoned, not interrupted, so an
/// implementation may keep running after its outcome was reported.
pub trait AnalysisCapability: Send + Sync {
    /// Analyzes `artifact` on behalf of `owner` and returns a textual result.
    ///
    /// An empty result means the capability found nothing to report.
    ///
    /// # Errors
    ///
    /// Returns an error if the analysis cannot be performed.
    fn analyze(&self, artifact: &Path, owner: OwnerId) -> Result<String>;

    /// Returns true if a successful result should be surfaced as a warning.
    fn is_warning(&self, _payload: &str) -> bool {
        false
    }
}

impl<F> AnalysisCapability for F
where
    F: Fn(&Path, OwnerId) -> Result<String> + Send + Sync,
{
    fn analyze(&self, artifact: &Path, owner: OwnerId) -> Result<String> {
        self(artifact, owner)
    }
}

/// A named entry in the dispatcher's registry.
#[derive(Clone)]
pub struct AnalysisTask {
    name: String,
    capability: Arc<dyn AnalysisCapability>,
    timeout: Option<Duration>,
    log_history: bool,
}

impl fmt::Debug for AnalysisTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisTask")
            .field("name", &self.name)
            .field("timeout", &self.timeout)
            .field("log_history", &self.log_history)
            .finish_non_exhaustive()
    }
}

impl AnalysisTask {
    /// Creates a task using the dispatcher's default timeout.
    #[must_use]
    pub fn new(name: impl Into<String>, capability: Arc<dyn AnalysisCapability>) -> Self {
        Self {
            name: name.into(),
            capability,
            timeout: None,
            log_history: false,
        }
    }

    /// Overrides the per-task timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Appends non-empty successful results to the owner's history.
    #[must_use]
    pub const fn with_history(mut self, log_history: bool) -> Self {
        self.log_history = log_history;
        self
    }

    /// Task name, used as the outcome name and history kind.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The wrapped capability.
    #[must_use]
    pub fn capability(&self) -> &Arc<dyn AnalysisCapability> {
        &self.capability
    }

    /// Per-task timeout override.
    #[must_use]
    pub const fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Whether successful results are logged to history.
    #[must_use]
    pub const fn logs_history(&self) -> bool {
        self.log_history
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closure_capability() {
        let task = AnalysisTask::new(
            "echo",
            Arc::new(|path: &Path, owner: OwnerId| -> Result<String> {
                Ok(format!("{owner}:{}", path.display()))
            }),
        )
        .with_timeout(Duration::from_secs(1))
        .with_history(true);

        let payload = task
            .capability()
            .analyze(Path::new("a.jpg"), OwnerId::new(7))
            .unwrap();
        assert_eq!(payload, "7:a.jpg");
        assert_eq!(task.name(), "echo");
        assert_eq!(task.timeout(), Some(Duration::from_secs(1)));
        assert!(task.logs_history());
        assert!(!task.capability().is_warning("anything"));
    }
}
