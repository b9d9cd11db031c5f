//! Host resource monitoring.
//!
//! Heavy work (chunked transfers, analysis) asks a [`ResourceProbe`] whether
//! the host has enough CPU, memory and disk headroom before proceeding.

mod monitor;

pub use monitor::{ResourceSnapshot, SystemResourceMonitor};

use async_trait::async_trait;

/// Minimum headroom required for heavy work.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourceThresholds {
    /// Minimum idle CPU percentage.
    pub min_cpu_free_percent: f32,
    /// Minimum available memory in MB.
    pub min_free_memory_mb: u64,
    /// Minimum free disk space on the storage volume in MB.
    pub min_free_disk_mb: u64,
}

impl Default for ResourceThresholds {
    fn default() -> Self {
        Self {
            min_cpu_free_percent: 10.0,
            min_free_memory_mb: 512,
            min_free_disk_mb: 2048,
        }
    }
}

impl ResourceThresholds {
    /// Creates thresholds from explicit values.
    #[must_use]
    pub const fn new(min_cpu_free_percent: f32, min_free_memory_mb: u64, min_free_disk_mb: u64) -> Self {
        Self {
            min_cpu_free_percent,
            min_free_memory_mb,
            min_free_disk_mb,
        }
    }

    /// Thresholds that any host satisfies.
    #[must_use]
    pub const fn none() -> Self {
        Self::new(0.0, 0, 0)
    }
}

/// Answers whether the host can take on heavy work right now.
///
/// Implementations must fail safe: if sampling fails, report unavailable.
#[async_trait]
pub trait ResourceProbe: Send + Sync {
    /// Returns true only if every threshold is met.
    async fn available(&self, thresholds: &ResourceThresholds) -> bool;
}
