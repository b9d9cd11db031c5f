//! System resource sampling via `sysinfo` and `fs2`.

use super::{ResourceProbe, ResourceThresholds};
use crate::{Error, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use sysinfo::System;
use tracing::{debug, warn};

const BYTES_PER_MB: u64 = 1024 * 1024;

/// Default interval between the two CPU refreshes of one sample.
pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_millis(500);

/// A point-in-time view of host resources.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ResourceSnapshot {
    /// Global CPU usage, 0..=100.
    pub cpu_usage_percent: f32,
    /// Available memory in bytes.
    pub available_memory_bytes: u64,
    /// Total memory in bytes.
    pub total_memory_bytes: u64,
    /// Free space on the storage volume in bytes.
    pub available_disk_bytes: u64,
}

impl ResourceSnapshot {
    /// Idle CPU percentage.
    #[must_use]
    pub fn cpu_free_percent(&self) -> f32 {
        (100.0 - self.cpu_usage_percent).clamp(0.0, 100.0)
    }

    /// Returns the first threshold that is not met, if any.
    #[must_use]
    pub fn shortfall(&self, thresholds: &ResourceThresholds) -> Option<String> {
        let cpu_free = self.cpu_free_percent();
        if cpu_free < thresholds.min_cpu_free_percent {
            return Some(format!(
                "cpu free {cpu_free:.1}% < {:.1}%",
                thresholds.min_cpu_free_percent
            ));
        }
        let memory_mb = self.available_memory_bytes / BYTES_PER_MB;
        if memory_mb < thresholds.min_free_memory_mb {
            return Some(format!(
                "memory free {memory_mb}MB < {}MB",
                thresholds.min_free_memory_mb
            ));
        }
        let disk_mb = self.available_disk_bytes / BYTES_PER_MB;
        if disk_mb < thresholds.min_free_disk_mb {
            return Some(format!(
                "disk free {disk_mb}MB < {}MB",
                thresholds.min_free_disk_mb
            ));
        }
        None
    }

    /// Returns true if every threshold is met.
    #[must_use]
    pub fn meets(&self, thresholds: &ResourceThresholds) -> bool {
        self.shortfall(thresholds).is_none()
    }
}

/// Samples the local host.
///
/// Disk space is measured on the volume holding `storage_root`.
#[derive(Debug, Clone)]
pub struct SystemResourceMonitor {
    storage_root: PathBuf,
    sample_interval: Duration,
}

impl SystemResourceMonitor {
    /// Creates a monitor for the volume holding `storage_root`.
    #[must_use]
    pub fn new(storage_root: impl Into<PathBuf>) -> Self {
        Self {
            storage_root: storage_root.into(),
            sample_interval: DEFAULT_SAMPLE_INTERVAL,
        }
    }

    /// Sets the CPU sampling interval.
    ///
    /// Values below `sysinfo::MINIMUM_CPU_UPDATE_INTERVAL` are raised to it.
    #[must_use]
    pub fn with_sample_interval(mut self, interval: Duration) -> Self {
        self.sample_interval = interval.max(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
        self
    }

    /// Takes a snapshot, blocking for the sample interval.
    ///
    /// # Errors
    ///
    /// Returns an error if free disk space cannot be determined.
    pub async fn snapshot(&self) -> Result<ResourceSnapshot> {
        let mut sys = System::new();
        sys.refresh_cpu_usage();
        tokio::time::sleep(self.sample_interval).await;
        sys.refresh_cpu_usage();
        sys.refresh_memory();

        let volume = existing_ancestor(&self.storage_root);
        let available_disk_bytes = fs2::available_space(&volume)
            .map_err(|e| Error::operation("sample_disk_space", format!("{}: {e}", volume.display())))?;

        Ok(ResourceSnapshot {
            cpu_usage_percent: sys.global_cpu_usage(),
            available_memory_bytes: sys.available_memory(),
            total_memory_bytes: sys.total_memory(),
            available_disk_bytes,
        })
    }
}

#[async_trait]
impl ResourceProbe for SystemResourceMonitor {
    async fn available(&self, thresholds: &ResourceThresholds) -> bool {
        match self.snapshot().await {
            Ok(snapshot) => match snapshot.shortfall(thresholds) {
                None => true,
                Some(reason) => {
                    debug!(reason = %reason, "Resources below thresholds");
                    false
                },
            },
            Err(e) => {
                warn!(error = %e, "Resource sampling failed, treating as unavailable");
                false
            },
        }
    }
}

/// The storage root may not exist yet; measure its nearest existing ancestor.
fn existing_ancestor(path: &Path) -> PathBuf {
    path.ancestors()
        .find(|p| !p.as_os_str().is_empty() && p.exists())
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
}
