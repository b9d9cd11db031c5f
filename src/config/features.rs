//! Feature flags for optional functionality.

use super::env_bool;

/// Feature flags for controlling optional mediaflow behavior.
#[derive(Debug, Clone)]
pub struct FeatureFlags {
    /// Derive an audio track and a still frame from downloaded videos.
    pub secondary_derivations: bool,
    /// Register the QR decoding task.
    pub qr: bool,
    /// Register the OCR task.
    pub ocr: bool,
    /// Register the object detection task (needs a configured command).
    pub objects: bool,
    /// Register the safety classification task (needs a configured command).
    pub safety: bool,
    /// Register the file metadata task.
    pub metadata: bool,
    /// Retry a failed transfer once with the alternate strategy.
    pub strategy_fallback: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self::all()
    }
}

impl FeatureFlags {
    /// Creates feature flags with all features disabled.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            secondary_derivations: false,
            qr: false,
            ocr: false,
            objects: false,
            safety: false,
            metadata: false,
            strategy_fallback: false,
        }
    }

    /// Creates feature flags with all features enabled.
    #[must_use]
    pub const fn all() -> Self {
        Self {
            secondary_derivations: true,
            qr: true,
            ocr: true,
            objects: true,
            safety: true,
            metadata: true,
            strategy_fallback: true,
        }
    }

    /// Applies `MEDIAFLOW_ENABLE_*` environment overrides.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(v) = env_bool("MEDIAFLOW_ENABLE_SECONDARY_DERIVATIONS") {
            self.secondary_derivations = v;
        }
        if let Some(v) = env_bool("MEDIAFLOW_ENABLE_QR") {
            self.qr = v;
        }
        if let Some(v) = env_bool("MEDIAFLOW_ENABLE_OCR") {
            self.ocr = v;
        }
        if let Some(v) = env_bool("MEDIAFLOW_ENABLE_OBJECTS") {
            self.objects = v;
        }
        if let Some(v) = env_bool("MEDIAFLOW_ENABLE_SAFETY") {
            self.safety = v;
        }
        if let Some(v) = env_bool("MEDIAFLOW_ENABLE_METADATA") {
            self.metadata = v;
        }
        if let Some(v) = env_bool("MEDIAFLOW_ENABLE_STRATEGY_FALLBACK") {
            self.strategy_fallback = v;
        }
        self
    }
}
