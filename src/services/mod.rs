//! Business logic services.
//!
//! Services orchestrate the transfer engine, storage and history and
//! provide the high-level operations the router and CLI call.

pub mod analysis;
pub mod download;

pub use analysis::AnalysisDispatcher;
pub use download::DownloadService;
