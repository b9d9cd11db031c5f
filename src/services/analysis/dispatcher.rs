//! Concurrent, timeout-guarded fan-out of analysis tasks.

use super::cache::{AnalysisCache, ContentDigest};
use super::capabilities::{CommandCapability, MetadataCapability};
use super::summary::AnalysisSummary;
use super::task::{AnalysisCapability, AnalysisTask};
use crate::config::{AnalysisSettings, MediaflowConfig};
use crate::history::{HistoryStore, append_blocking};
use crate::models::{AnalysisOutcome, HistoryRecord, OwnerId};
use crate::observability::metrics::{
    ANALYSIS_CACHE_HITS_TOTAL, ANALYSIS_DURATION_MS, ANALYSIS_OUTCOMES_TOTAL, duration_ms,
};
use crate::{Error, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

/// Dispatcher timeouts and bounds.
#[derive(Debug, Clone, Copy)]
pub struct DispatcherConfig {
    /// Default per-task timeout. Only execution counts; waiting for a
    /// worker is bounded by the overall timeout.
    pub task_timeout: Duration,
    /// Bound on the whole dispatch.
    pub overall_timeout: Duration,
    /// Blocking worker pool size, shared by all dispatches.
    pub workers: usize,
    /// Maximum payload length in characters.
    pub payload_chars: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self::from_settings(&AnalysisSettings::default())
    }
}

impl DispatcherConfig {
    /// Builds the dispatcher configuration from analysis settings.
    #[must_use]
    pub const fn from_settings(settings: &AnalysisSettings) -> Self {
        Self {
            task_timeout: settings.task_timeout,
            overall_timeout: settings.overall_timeout,
            workers: settings.workers,
            payload_chars: settings.payload_chars,
        }
    }

    /// Sets the default per-task timeout.
    #[must_use]
    pub const fn with_task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout = timeout;
        self
    }

    /// Sets the overall dispatch timeout.
    #[must_use]
    pub const fn with_overall_timeout(mut self, timeout: Duration) -> Self {
        self.overall_timeout = timeout;
        self
    }

    /// Sets the worker pool size.
    #[must_use]
    pub const fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }
}

/// How one spawned task ended, before it becomes an outcome.
enum TaskResult {
    Completed(String),
    Failed(String),
    TimedOut,
}

/// Runs every registered task against an artifact.
///
/// All tasks start together; blocking work is bounded by a shared worker
/// pool. A dispatch always yields exactly one outcome per registered task,
/// in registry order. Tasks still running when the overall timeout fires
/// are reported as `timeout` alongside the results that did complete.
pub struct AnalysisDispatcher {
    tasks: Vec<AnalysisTask>,
    config: DispatcherConfig,
    workers: Arc<Semaphore>,
    cache: Option<Arc<AnalysisCache>>,
    history: Option<Arc<dyn HistoryStore>>,
}

impl std::fmt::Debug for AnalysisDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisDispatcher")
            .field("tasks", &self.tasks)
            .field("config", &self.config)
            .field("cache", &self.cache)
            .field("history", &self.history.is_some())
            .finish_non_exhaustive()
    }
}

impl AnalysisDispatcher {
    /// Creates a dispatcher with an empty registry.
    #[must_use]
    pub fn new(config: DispatcherConfig) -> Self {
        Self {
            tasks: Vec::new(),
            workers: Arc::new(Semaphore::new(config.workers.max(1))),
            config,
            cache: None,
            history: None,
        }
    }

    /// Builds the default registry from configuration: `safety` (when a
    /// classifier command is configured), `qr`, `ocr`, `objects` (when a
    /// detector command is configured), then `metadata`.
    ///
    /// # Errors
    ///
    /// Returns an error if a configured command is invalid.
    pub fn from_config(config: &MediaflowConfig, history: Arc<dyn HistoryStore>) -> Result<Self> {
        let features = &config.features;
        let mut dispatcher = Self::new(DispatcherConfig::from_settings(&config.analysis))
            .with_cache(Arc::new(AnalysisCache::new(config.analysis.cache_capacity)))
            .with_history(history);

        if features.safety
            && let Some(command) = &config.analysis.safety_command
        {
            dispatcher = dispatcher.with_task(AnalysisTask::new(
                "safety",
                Arc::new(CommandCapability::safety(command)?),
            ));
        }
        if features.qr {
            dispatcher = dispatcher
                .with_task(AnalysisTask::new("qr", Arc::new(CommandCapability::qr())).with_history(true));
        }
        if features.ocr {
            dispatcher = dispatcher
                .with_task(AnalysisTask::new("ocr", Arc::new(CommandCapability::ocr())).with_history(true));
        }
        if features.objects
            && let Some(command) = &config.analysis.objects_command
        {
            dispatcher = dispatcher.with_task(
                AnalysisTask::new("objects", Arc::new(CommandCapability::objects(command)?))
                    .with_history(true),
            );
        }
        if features.metadata {
            dispatcher = dispatcher.with_task(AnalysisTask::new("metadata", Arc::new(MetadataCapability)));
        }
        Ok(dispatcher)
    }

    /// Appends a task to the registry.
    #[must_use]
    pub fn with_task(mut self, task: AnalysisTask) -> Self {
        self.tasks.push(task);
        self
    }

    /// Shares a result cache with this dispatcher.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<AnalysisCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Logs selected task results to history.
    #[must_use]
    pub fn with_history(mut self, history: Arc<dyn HistoryStore>) -> Self {
        self.history = Some(history);
        self
    }

    /// Registered tasks, in order.
    #[must_use]
    pub fn tasks(&self) -> &[AnalysisTask] {
        &self.tasks
    }

    /// Dispatcher configuration.
    #[must_use]
    pub const fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Dispatches and wraps the outcomes in a summary.
    pub async fn analyze(&self, artifact: &Path, owner: OwnerId) -> AnalysisSummary {
        let start = Instant::now();
        let outcomes = self.dispatch(artifact, owner).await;
        AnalysisSummary::new(outcomes, start.elapsed())
    }

    /// Runs every registered task and returns one outcome per task.
    ///
    /// Never fails: capability errors, panics and timeouts become outcomes.
    #[instrument(skip(self, artifact), fields(owner = %owner, artifact = %artifact.display(), tasks = self.tasks.len()))]
    pub async fn dispatch(&self, artifact: &Path, owner: OwnerId) -> Vec<AnalysisOutcome> {
        let start = Instant::now();
        let deadline = tokio::time::Instant::now() + self.config.overall_timeout;
        let digest = self.digest(artifact).await;

        let mut slots: Vec<Option<AnalysisOutcome>> = vec![None; self.tasks.len()];
        let mut running = JoinSet::new();

        for (index, task) in self.tasks.iter().enumerate() {
            if let Some(payload) = self.cached(digest.as_ref(), task) {
                self.record_history(task, owner, &payload).await;
                slots[index] = Some(ok_outcome(task, payload));
                continue;
            }
            let run = run_task(
                Arc::clone(task.capability()),
                artifact.to_path_buf(),
                owner,
                Arc::clone(&self.workers),
                task.timeout().unwrap_or(self.config.task_timeout),
            );
            running.spawn(async move { (index, run.await) });
        }

        loop {
            match tokio::time::timeout_at(deadline, running.join_next()).await {
                Ok(Some(Ok((index, result)))) => {
                    let task = &self.tasks[index];
                    slots[index] = Some(self.complete(task, result, digest.as_ref(), owner).await);
                },
                // Unfilled slots are reported as timeouts below.
                Ok(Some(Err(e))) => warn!(error = %e, "Analysis task aborted"),
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        pending = running.len(),
                        timeout_ms = duration_ms(self.config.overall_timeout),
                        "Overall analysis timeout reached, returning partial results"
                    );
                    running.abort_all();
                    break;
                },
            }
        }

        let outcomes: Vec<AnalysisOutcome> = slots
            .into_iter()
            .zip(&self.tasks)
            .map(|(slot, task)| slot.unwrap_or_else(|| AnalysisOutcome::timeout(task.name())))
            .collect();

        for outcome in &outcomes {
            metrics::counter!(
                ANALYSIS_OUTCOMES_TOTAL,
                "task" => outcome.task.clone(),
                "status" => outcome.status.as_str()
            )
            .increment(1);
        }
        metrics::histogram!(ANALYSIS_DURATION_MS).record(duration_ms(start.elapsed()));
        info!(
            outcomes = outcomes.len(),
            elapsed_ms = duration_ms(start.elapsed()),
            "Analysis dispatched"
        );
        outcomes
    }

    async fn digest(&self, artifact: &Path) -> Option<ContentDigest> {
        self.cache.as_ref()?;
        match ContentDigest::of_file(artifact).await {
            Ok(digest) => Some(digest),
            Err(e) => {
                debug!(error = %e, "Could not hash artifact, cache bypassed");
                None
            },
        }
    }

    fn cached(&self, digest: Option<&ContentDigest>, task: &AnalysisTask) -> Option<String> {
        let payload = self.cache.as_ref()?.get(digest?, task.name())?;
        metrics::counter!(ANALYSIS_CACHE_HITS_TOTAL).increment(1);
        debug!(task = task.name(), "Analysis cache hit");
        Some(payload)
    }

    async fn complete(
        &self,
        task: &AnalysisTask,
        result: TaskResult,
        digest: Option<&ContentDigest>,
        owner: OwnerId,
    ) -> AnalysisOutcome {
        match result {
            TaskResult::Completed(raw) => {
                let payload = truncate(raw.trim(), self.config.payload_chars);
                if let (Some(cache), Some(digest)) = (&self.cache, digest) {
                    cache.put(digest.clone(), task.name(), payload.clone());
                }
                self.record_history(task, owner, &payload).await;
                ok_outcome(task, payload)
            },
            TaskResult::Failed(cause) => {
                let payload = truncate(&cause, self.config.payload_chars);
                let error = Error::Analysis {
                    task: task.name().to_string(),
                    cause,
                };
                warn!(error = %error, "Analysis task failed");
                AnalysisOutcome::error(task.name(), payload)
            },
            TaskResult::TimedOut => {
                let error = Error::AnalysisTimeout {
                    task: task.name().to_string(),
                };
                warn!(error = %error, "Analysis task timed out");
                AnalysisOutcome::timeout(task.name())
            },
        }
    }

    async fn record_history(&self, task: &AnalysisTask, owner: OwnerId, payload: &str) {
        if !task.logs_history() || payload.is_empty() {
            return;
        }
        let Some(history) = &self.history else {
            return;
        };
        let record = HistoryRecord::new(owner, payload, task.name());
        if let Err(e) = append_blocking(Arc::clone(history), record).await {
            warn!(task = task.name(), error = %e, "Failed to append history record");
        }
    }
}

fn ok_outcome(task: &AnalysisTask, payload: String) -> AnalysisOutcome {
    let flagged = task.capability().is_warning(&payload);
    AnalysisOutcome::ok(task.name(), payload).flagged(flagged)
}

/// Waits for a worker, then runs the capability on the blocking pool.
///
/// `limit` starts once the worker is held, so queueing behind other tasks
/// never counts against it. A timed-out capability keeps its worker until
/// it returns on its own.
async fn run_task(
    capability: Arc<dyn AnalysisCapability>,
    artifact: PathBuf,
    owner: OwnerId,
    workers: Arc<Semaphore>,
    limit: Duration,
) -> TaskResult {
    let permit = match workers.acquire_owned().await {
        Ok(permit) => permit,
        Err(e) => return TaskResult::Failed(e.to_string()),
    };
    let work = tokio::task::spawn_blocking(move || {
        let _permit = permit;
        capability.analyze(&artifact, owner)
    });

    match tokio::time::timeout(limit, work).await {
        Ok(Ok(Ok(payload))) => TaskResult::Completed(payload),
        Ok(Ok(Err(e))) => TaskResult::Failed(e.to_string()),
        Ok(Err(e)) if e.is_panic() => TaskResult::Failed("capability panicked".to_string()),
        Ok(Err(e)) => TaskResult::Failed(e.to_string()),
        Err(_) => TaskResult::TimedOut,
    }
}

/// Bounds `text` to `max_chars` characters, marking a cut with `…`.
fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    if max_chars == 0 {
        return String::new();
    }
    let mut out: String = text.chars().take(max_chars - 1).collect();
    out.push('…');
    out
}
