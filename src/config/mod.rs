//! Configuration management.
//!
//! Configuration is layered: built-in defaults, then an optional TOML file,
//! then `MEDIAFLOW_*` environment variables (a `.env` file in the working
//! directory is loaded first). Every section is plain data consumed by the
//! component that owns it.

mod features;

pub use features::FeatureFlags;

use crate::observability::LogFormat;
use crate::resources::ResourceThresholds;
use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

const MB: u64 = 1024 * 1024;
const GB: u64 = 1024 * MB;

/// Main configuration for mediaflow.
#[derive(Debug, Clone)]
pub struct MediaflowConfig {
    /// Base data directory holding `downloads/`, `staging/`, `history/` and `logs/`.
    pub data_dir: PathBuf,
    /// Storage budget and temporary file handling.
    pub storage: StorageSettings,
    /// Transfer engine and strategy selection.
    pub transfer: TransferSettings,
    /// Host resource thresholds for heavy work.
    pub resources: ResourceThresholds,
    /// Analysis dispatcher.
    pub analysis: AnalysisSettings,
    /// Logging output.
    pub logging: LoggingSettings,
    /// Metrics exporter.
    pub metrics: MetricsSettings,
    /// Feature flags.
    pub features: FeatureFlags,
}

/// Storage budget settings.
#[derive(Debug, Clone)]
pub struct StorageSettings {
    /// Maximum aggregate bytes retained under the downloads root.
    pub budget_bytes: u64,
    /// Delay before temporary artifacts are deleted.
    pub temp_file_ttl: Duration,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            budget_bytes: 20 * GB,
            temp_file_ttl: Duration::from_secs(300),
        }
    }
}

/// Transfer engine settings.
#[derive(Debug, Clone)]
pub struct TransferSettings {
    /// Chunk size for chunked transfers, in bytes.
    pub chunk_size: usize,
    /// Estimated size above which the chunked strategy is selected.
    pub chunked_threshold: u64,
    /// Resources declaring more than this are rejected before fetching.
    pub max_file_size: u64,
    /// Concurrency bound for multi-URL downloads.
    pub max_parallel: usize,
    /// Sleep between resource re-checks while throttled.
    pub throttle_backoff: Duration,
    /// Timeout for metadata requests.
    pub request_timeout: Duration,
    /// TCP connect timeout.
    pub connect_timeout: Duration,
    /// User agent sent with every request.
    pub user_agent: String,
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            chunk_size: usize::try_from(10 * MB).unwrap_or(usize::MAX),
            chunked_threshold: 50 * MB,
            max_file_size: 2000 * MB,
            max_parallel: 3,
            throttle_backoff: Duration::from_secs(5),
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            user_agent: concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Analysis dispatcher settings.
#[derive(Debug, Clone)]
pub struct AnalysisSettings {
    /// Timeout for each task's execution, once it holds a worker.
    pub task_timeout: Duration,
    /// Timeout for the whole dispatch.
    pub overall_timeout: Duration,
    /// Worker pool size for blocking capabilities.
    pub workers: usize,
    /// Maximum payload length in characters.
    pub payload_chars: usize,
    /// Maximum number of cached task results.
    pub cache_capacity: usize,
    /// Optional external detector command for the `objects` task.
    pub objects_command: Option<String>,
    /// Optional external classifier command for the `safety` task.
    pub safety_command: Option<String>,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            task_timeout: Duration::from_secs(10),
            overall_timeout: Duration::from_secs(30),
            workers: 8,
            payload_chars: 200,
            cache_capacity: 1000,
            objects_command: None,
            safety_command: None,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Default)]
pub struct LoggingSettings {
    /// Output format.
    pub format: LogFormat,
    /// Optional log file (appended to) instead of stderr.
    pub file: Option<PathBuf>,
    /// Filter directive, e.g. `mediaflow=debug`.
    pub filter: Option<String>,
}

/// Metrics exporter settings.
#[derive(Debug, Clone)]
pub struct MetricsSettings {
    /// Whether the Prometheus exporter is installed.
    pub enabled: bool,
    /// Listener port.
    pub port: u16,
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 9090,
        }
    }
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct ConfigFile {
    /// Data directory.
    pub data_dir: Option<String>,
    /// Storage section.
    pub storage: ConfigFileStorage,
    /// Transfer section.
    pub transfer: ConfigFileTransfer,
    /// Resources section.
    pub resources: ConfigFileResources,
    /// Analysis section.
    pub analysis: ConfigFileAnalysis,
    /// Logging section.
    pub logging: ConfigFileLogging,
    /// Metrics section.
    pub metrics: ConfigFileMetrics,
    /// Feature flags.
    pub features: ConfigFileFeatures,
}

/// Storage section in config file.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct ConfigFileStorage {
    /// Budget in GB.
    pub limit_gb: Option<u64>,
    /// Temporary file TTL in seconds.
    pub temp_file_ttl_secs: Option<u64>,
}

/// Transfer section in config file.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct ConfigFileTransfer {
    /// Chunk size in MB.
    pub chunk_size_mb: Option<u64>,
    /// Chunked threshold in MB.
    pub chunked_threshold_mb: Option<u64>,
    /// Max file size in MB.
    pub max_file_size_mb: Option<u64>,
    /// Max parallel downloads.
    pub max_parallel_downloads: Option<usize>,
    /// Throttle backoff in seconds.
    pub throttle_backoff_secs: Option<u64>,
    /// Request timeout in seconds.
    pub request_timeout_secs: Option<u64>,
    /// Connect timeout in seconds.
    pub connect_timeout_secs: Option<u64>,
    /// User agent.
    pub user_agent: Option<String>,
}

/// Resources section in config file.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct ConfigFileResources {
    /// Minimum idle CPU percentage.
    pub min_cpu_free_percent: Option<f32>,
    /// Minimum available memory in MB.
    pub min_free_memory_mb: Option<u64>,
    /// Minimum free disk in MB.
    pub min_free_disk_mb: Option<u64>,
}

/// Analysis section in config file.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct ConfigFileAnalysis {
    /// Per-task timeout in seconds.
    pub task_timeout_secs: Option<u64>,
    /// Overall timeout in seconds.
    pub timeout_secs: Option<u64>,
    /// Worker pool size.
    pub workers: Option<usize>,
    /// Payload length limit.
    pub payload_chars: Option<usize>,
    /// Cache capacity.
    pub cache_capacity: Option<usize>,
    /// Object detector command.
    pub objects_command: Option<String>,
    /// Safety classifier command.
    pub safety_command: Option<String>,
}

/// Logging section in config file.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct ConfigFileLogging {
    /// Format name.
    pub format: Option<String>,
    /// Log file path.
    pub file: Option<String>,
    /// Filter directive.
    pub filter: Option<String>,
}

/// Metrics section in config file.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct ConfigFileMetrics {
    /// Whether metrics are enabled.
    pub enabled: Option<bool>,
    /// Listener port.
    pub port: Option<u16>,
}

/// Features section in config file.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct ConfigFileFeatures {
    /// Secondary derivations for videos.
    pub secondary_derivations: Option<bool>,
    /// QR task.
    pub qr: Option<bool>,
    /// OCR task.
    pub ocr: Option<bool>,
    /// Object detection task.
    pub objects: Option<bool>,
    /// Safety task.
    pub safety: Option<bool>,
    /// Metadata task.
    pub metadata: Option<bool>,
    /// Strategy fallback.
    pub strategy_fallback: Option<bool>,
}

impl Default for MediaflowConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("mediaflow-data"),
            storage: StorageSettings::default(),
            transfer: TransferSettings::default(),
            resources: ResourceThresholds::default(),
            analysis: AnalysisSettings::default(),
            logging: LoggingSettings::default(),
            metrics: MetricsSettings::default(),
            features: FeatureFlags::default(),
        }
    }
}

impl MediaflowConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a file path, then applies env overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if the
    /// resulting configuration is invalid.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| Error::operation("read_config_file", e))?;
        let file: ConfigFile =
            toml::from_str(&contents).map_err(|e| Error::operation("parse_config_file", e))?;

        let config = Self::from_config_file(file).with_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from the default location, then applies env overrides.
    ///
    /// Checks the platform config dir (`<config>/mediaflow/config.toml`);
    /// uses defaults if no file exists.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be parsed or the
    /// resulting configuration is invalid.
    pub fn load_default() -> Result<Self> {
        let _ = dotenvy::dotenv();

        let platform_config = directories::ProjectDirs::from("", "", "mediaflow")
            .map(|dirs| dirs.config_dir().join("config.toml"));
        if let Some(path) = platform_config.filter(|path| path.exists()) {
            return Self::load_from_file(&path);
        }

        let config = Self::default().with_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Converts a `ConfigFile` to `MediaflowConfig`.
    fn from_config_file(file: ConfigFile) -> Self {
        let mut config = Self::default();

        if let Some(data_dir) = file.data_dir {
            config.data_dir = PathBuf::from(data_dir);
        }

        let storage = file.storage;
        if let Some(gb) = storage.limit_gb {
            config.storage.budget_bytes = gb.saturating_mul(GB);
        }
        if let Some(secs) = storage.temp_file_ttl_secs {
            config.storage.temp_file_ttl = Duration::from_secs(secs);
        }

        let transfer = file.transfer;
        if let Some(mb) = transfer.chunk_size_mb {
            config.transfer.chunk_size = mb_to_usize(mb);
        }
        if let Some(mb) = transfer.chunked_threshold_mb {
            config.transfer.chunked_threshold = mb.saturating_mul(MB);
        }
        if let Some(mb) = transfer.max_file_size_mb {
            config.transfer.max_file_size = mb.saturating_mul(MB);
        }
        if let Some(n) = transfer.max_parallel_downloads {
            config.transfer.max_parallel = n;
        }
        if let Some(secs) = transfer.throttle_backoff_secs {
            config.transfer.throttle_backoff = Duration::from_secs(secs);
        }
        if let Some(secs) = transfer.request_timeout_secs {
            config.transfer.request_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = transfer.connect_timeout_secs {
            config.transfer.connect_timeout = Duration::from_secs(secs);
        }
        if let Some(agent) = transfer.user_agent {
            config.transfer.user_agent = agent;
        }

        let resources = file.resources;
        if let Some(v) = resources.min_cpu_free_percent {
            config.resources.min_cpu_free_percent = v;
        }
        if let Some(v) = resources.min_free_memory_mb {
            config.resources.min_free_memory_mb = v;
        }
        if let Some(v) = resources.min_free_disk_mb {
            config.resources.min_free_disk_mb = v;
        }

        let analysis = file.analysis;
        if let Some(secs) = analysis.task_timeout_secs {
            config.analysis.task_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = analysis.timeout_secs {
            config.analysis.overall_timeout = Duration::from_secs(secs);
        }
        if let Some(n) = analysis.workers {
            config.analysis.workers = n;
        }
        if let Some(n) = analysis.payload_chars {
            config.analysis.payload_chars = n;
        }
        if let Some(n) = analysis.cache_capacity {
            config.analysis.cache_capacity = n;
        }
        config.analysis.objects_command = analysis.objects_command;
        config.analysis.safety_command = analysis.safety_command;

        let logging = file.logging;
        if let Some(format) = logging.format {
            config.logging.format = LogFormat::parse(&format);
        }
        config.logging.file = logging.file.map(PathBuf::from);
        config.logging.filter = logging.filter;

        if let Some(enabled) = file.metrics.enabled {
            config.metrics.enabled = enabled;
        }
        if let Some(port) = file.metrics.port {
            config.metrics.port = port;
        }

        let features = file.features;
        if let Some(v) = features.secondary_derivations {
            config.features.secondary_derivations = v;
        }
        if let Some(v) = features.qr {
            config.features.qr = v;
        }
        if let Some(v) = features.ocr {
            config.features.ocr = v;
        }
        if let Some(v) = features.objects {
            config.features.objects = v;
        }
        if let Some(v) = features.safety {
            config.features.safety = v;
        }
        if let Some(v) = features.metadata {
            config.features.metadata = v;
        }
        if let Some(v) = features.strategy_fallback {
            config.features.strategy_fallback = v;
        }

        config
    }

    /// Applies `MEDIAFLOW_*` environment variable overrides.
    ///
    /// | Variable | Description | Default |
    /// |----------|-------------|---------|
    /// | `MEDIAFLOW_DATA_DIR` | Base data directory | `mediaflow-data` |
    /// | `MEDIAFLOW_STORAGE_LIMIT_GB` | Storage budget | 20 |
    /// | `MEDIAFLOW_MAX_PARALLEL_DOWNLOADS` | Multi-URL concurrency | 3 |
    /// | `MEDIAFLOW_CHUNK_SIZE_MB` | Chunk size | 10 |
    /// | `MEDIAFLOW_CHUNKED_THRESHOLD_MB` | Chunked strategy threshold | 50 |
    /// | `MEDIAFLOW_MAX_FILE_SIZE_MB` | Max resource size | 2000 |
    /// | `MEDIAFLOW_MIN_CPU_FREE_PERCENT` | Idle CPU floor | 10 |
    /// | `MEDIAFLOW_MIN_FREE_MEMORY_MB` | Available memory floor | 512 |
    /// | `MEDIAFLOW_MIN_FREE_DISK_MB` | Free disk floor | 2048 |
    /// | `MEDIAFLOW_ANALYSIS_TASK_TIMEOUT_SECS` | Per-task timeout | 10 |
    /// | `MEDIAFLOW_ANALYSIS_TIMEOUT_SECS` | Dispatch timeout | 30 |
    /// | `MEDIAFLOW_ANALYSIS_WORKERS` | Worker pool size | 8 |
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(dir) = std::env::var("MEDIAFLOW_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(gb) = env_parse::<u64>("MEDIAFLOW_STORAGE_LIMIT_GB") {
            self.storage.budget_bytes = gb.saturating_mul(GB);
        }
        if let Some(secs) = env_parse::<u64>("MEDIAFLOW_TEMP_FILE_TTL_SECS") {
            self.storage.temp_file_ttl = Duration::from_secs(secs);
        }
        if let Some(n) = env_parse::<usize>("MEDIAFLOW_MAX_PARALLEL_DOWNLOADS") {
            self.transfer.max_parallel = n;
        }
        if let Some(mb) = env_parse::<u64>("MEDIAFLOW_CHUNK_SIZE_MB") {
            self.transfer.chunk_size = mb_to_usize(mb);
        }
        if let Some(mb) = env_parse::<u64>("MEDIAFLOW_CHUNKED_THRESHOLD_MB") {
            self.transfer.chunked_threshold = mb.saturating_mul(MB);
        }
        if let Some(mb) = env_parse::<u64>("MEDIAFLOW_MAX_FILE_SIZE_MB") {
            self.transfer.max_file_size = mb.saturating_mul(MB);
        }
        if let Some(secs) = env_parse::<u64>("MEDIAFLOW_THROTTLE_BACKOFF_SECS") {
            self.transfer.throttle_backoff = Duration::from_secs(secs);
        }
        if let Some(secs) = env_parse::<u64>("MEDIAFLOW_REQUEST_TIMEOUT_SECS") {
            self.transfer.request_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = env_parse::<u64>("MEDIAFLOW_CONNECT_TIMEOUT_SECS") {
            self.transfer.connect_timeout = Duration::from_secs(secs);
        }
        if let Some(v) = env_parse::<f32>("MEDIAFLOW_MIN_CPU_FREE_PERCENT") {
            self.resources.min_cpu_free_percent = v;
        }
        if let Some(v) = env_parse::<u64>("MEDIAFLOW_MIN_FREE_MEMORY_MB") {
            self.resources.min_free_memory_mb = v;
        }
        if let Some(v) = env_parse::<u64>("MEDIAFLOW_MIN_FREE_DISK_MB") {
            self.resources.min_free_disk_mb = v;
        }
        if let Some(secs) = env_parse::<u64>("MEDIAFLOW_ANALYSIS_TASK_TIMEOUT_SECS") {
            self.analysis.task_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = env_parse::<u64>("MEDIAFLOW_ANALYSIS_TIMEOUT_SECS") {
            self.analysis.overall_timeout = Duration::from_secs(secs);
        }
        if let Some(n) = env_parse::<usize>("MEDIAFLOW_ANALYSIS_WORKERS") {
            self.analysis.workers = n;
        }
        if let Some(n) = env_parse::<usize>("MEDIAFLOW_ANALYSIS_PAYLOAD_CHARS") {
            self.analysis.payload_chars = n;
        }
        if let Some(n) = env_parse::<usize>("MEDIAFLOW_ANALYSIS_CACHE_CAPACITY") {
            self.analysis.cache_capacity = n;
        }
        if let Ok(command) = std::env::var("MEDIAFLOW_OBJECTS_COMMAND") {
            self.analysis.objects_command = Some(command).filter(|c| !c.trim().is_empty());
        }
        if let Ok(command) = std::env::var("MEDIAFLOW_SAFETY_COMMAND") {
            self.analysis.safety_command = Some(command).filter(|c| !c.trim().is_empty());
        }
        if let Ok(format) = std::env::var("MEDIAFLOW_LOG_FORMAT") {
            self.logging.format = LogFormat::parse(&format);
        }
        if let Ok(file) = std::env::var("MEDIAFLOW_LOG_FILE") {
            self.logging.file = Some(PathBuf::from(file));
        }
        if let Ok(filter) = std::env::var("MEDIAFLOW_LOG") {
            self.logging.filter = Some(filter);
        }
        if let Some(enabled) = env_bool("MEDIAFLOW_METRICS_ENABLED") {
            self.metrics.enabled = enabled;
        }
        if let Some(port) = env_parse::<u16>("MEDIAFLOW_METRICS_PORT") {
            self.metrics.port = port;
        }
        self.features = self.features.with_env_overrides();
        self
    }

    /// Validates value ranges.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` naming the first out-of-range setting.
    pub fn validate(&self) -> Result<()> {
        let budget_gb = self.storage.budget_bytes / GB;
        let checks = [
            (
                (1..=1000).contains(&budget_gb),
                "storage limit must be between 1 and 1000 GB",
            ),
            (self.transfer.max_parallel > 0, "max parallel downloads must be positive"),
            (self.transfer.chunk_size > 0, "chunk size must be positive"),
            (self.transfer.max_file_size > 0, "max file size must be positive"),
            (
                (0.0..=100.0).contains(&self.resources.min_cpu_free_percent),
                "min CPU free percent must be between 0 and 100",
            ),
            (self.analysis.workers > 0, "analysis workers must be positive"),
            (self.analysis.cache_capacity > 0, "analysis cache capacity must be positive"),
            (
                !self.analysis.overall_timeout.is_zero(),
                "analysis timeout must be positive",
            ),
        ];

        for (ok, message) in checks {
            if !ok {
                return Err(Error::InvalidInput(message.to_string()));
            }
        }
        Ok(())
    }

    /// Sets the data directory.
    #[must_use]
    pub fn with_data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.data_dir = path.into();
        self
    }

    /// Managed storage root.
    #[must_use]
    pub fn downloads_dir(&self) -> PathBuf {
        self.data_dir.join("downloads")
    }

    /// Staging directory for in-flight transfers (outside the managed root).
    #[must_use]
    pub fn staging_dir(&self) -> PathBuf {
        self.data_dir.join("staging")
    }

    /// Per-owner history directory.
    #[must_use]
    pub fn history_dir(&self) -> PathBuf {
        self.data_dir.join("history")
    }

    /// Temporary artifacts (received media, analysis reports).
    #[must_use]
    pub fn temp_dir(&self) -> PathBuf {
        self.data_dir.join("temp")
    }
}

fn mb_to_usize(mb: u64) -> usize {
    usize::try_from(mb.saturating_mul(MB)).unwrap_or(usize::MAX)
}

/// Parses an environment variable, ignoring unset or malformed values.
pub(crate) fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Parses a boolean environment variable (`true`/`1`/`yes`).
pub(crate) fn env_bool(key: &str) -> Option<bool> {
    std::env::var(key).ok().map(|v| {
        let v = v.trim().to_lowercase();
        v == "true" || v == "1" || v == "yes"
    })
}
