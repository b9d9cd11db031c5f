//! Prometheus metrics.
//!
//! Components record through the `metrics` facade; without an installed
//! recorder every call is a no-op, so library users and tests pay nothing.

use crate::config::MetricsSettings;
use crate::{Error, Result};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

/// Bytes written to disk by the transfer engine.
pub const TRANSFER_BYTES_TOTAL: &str = "mediaflow_transfer_bytes_total";
/// Completed transfers, labelled by strategy and status.
pub const TRANSFER_OUTCOMES_TOTAL: &str = "mediaflow_transfer_outcomes_total";
/// Transfer duration in milliseconds.
pub const TRANSFER_DURATION_MS: &str = "mediaflow_transfer_duration_ms";
/// Pauses taken while host resources were below thresholds.
pub const RESOURCE_THROTTLE_PAUSES_TOTAL: &str = "mediaflow_resource_throttle_pauses_total";
/// Files deleted by eviction.
pub const STORAGE_EVICTIONS_TOTAL: &str = "mediaflow_storage_evictions_total";
/// Eviction candidates that could not be deleted.
pub const STORAGE_EVICTION_FAILURES_TOTAL: &str = "mediaflow_storage_eviction_failures_total";
/// Aggregate bytes under the managed root after the last placement.
pub const STORAGE_USAGE_BYTES: &str = "mediaflow_storage_usage_bytes";
/// Eviction pass duration in milliseconds.
pub const STORAGE_EVICTION_DURATION_MS: &str = "mediaflow_storage_eviction_duration_ms";
/// Analysis task outcomes, labelled by task and status.
pub const ANALYSIS_OUTCOMES_TOTAL: &str = "mediaflow_analysis_outcomes_total";
/// Analysis results served from cache.
pub const ANALYSIS_CACHE_HITS_TOTAL: &str = "mediaflow_analysis_cache_hits_total";
/// Dispatch duration in milliseconds.
pub const ANALYSIS_DURATION_MS: &str = "mediaflow_analysis_duration_ms";

/// Metrics configuration.
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    /// Whether metrics are enabled.
    pub enabled: bool,
    /// Address to bind the metrics exporter.
    pub listen_addr: SocketAddr,
}

impl MetricsConfig {
    /// Builds metrics configuration from settings.
    #[must_use]
    pub const fn from_settings(settings: &MetricsSettings) -> Self {
        Self {
            enabled: settings.enabled,
            listen_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), settings.port),
        }
    }
}

/// Installs the Prometheus recorder with an HTTP listener.
///
/// Must be called from within a tokio runtime.
///
/// # Errors
///
/// Returns an error if the exporter cannot be built or a global recorder
/// is already installed.
pub fn install_prometheus(config: &MetricsConfig) -> Result<Option<PrometheusHandle>> {
    if !config.enabled {
        return Ok(None);
    }

    let (recorder, exporter) = PrometheusBuilder::new()
        .with_http_listener(config.listen_addr)
        .build()
        .map_err(|e| Error::operation("metrics_exporter_build", e))?;
    let handle = recorder.handle();
    metrics::set_global_recorder(recorder)
        .map_err(|e| Error::operation("metrics_recorder_install", e))?;
    tokio::spawn(exporter);

    tracing::info!(addr = %config.listen_addr, "Prometheus exporter listening");
    Ok(Some(handle))
}

/// Converts a duration to whole milliseconds for histograms.
#[allow(clippy::cast_precision_loss)]
pub(crate) fn duration_ms(duration: std::time::Duration) -> f64 {
    duration.as_millis() as f64
}
