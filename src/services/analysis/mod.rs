//! Analysis dispatcher.
//!
//! Received media is fanned out to a fixed, ordered registry of independent
//! capabilities (QR decoding, OCR, object detection, safety classification,
//! file metadata with EXIF).
//! Each task is isolated: its own timeout, its own error, its own outcome.
//! An overall deadline bounds the whole dispatch without discarding the
//! outcomes that already completed.
//!
//! # Example
//!
//! ```rust,ignore
//! use mediaflow::services::analysis::{
//!     AnalysisDispatcher, AnalysisTask, DispatcherConfig, MetadataCapability,
//! };
//! use std::sync::Arc;
//!
//! let dispatcher = AnalysisDispatcher::new(DispatcherConfig::default())
//!     .with_task(AnalysisTask::new("metadata", Arc::new(MetadataCapability)));
//! let summary = dispatcher.analyze(&path, owner).await;
//! println!("{}", summary.render());
//! ```

mod cache;
mod capabilities;
mod dispatcher;
mod summary;
mod task;

pub use cache::{AnalysisCache, ContentDigest};
pub use capabilities::{CommandCapability, MetadataCapability};
pub use dispatcher::{AnalysisDispatcher, DispatcherConfig};
pub use summary::{AnalysisSummary, INLINE_LIMIT};
pub use task::{AnalysisCapability, AnalysisTask};
