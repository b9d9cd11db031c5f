//! Data models for mediaflow.
//!
//! Shared value types passed between the transfer, storage, history and
//! analysis layers. Everything here is plain data; behavior lives in the
//! owning services.

mod analysis;
mod category;
mod history;
mod owner;
mod transfer;

pub use analysis::{AnalysisOutcome, AnalysisStatus};
pub use category::Category;
pub use history::HistoryRecord;
pub use owner::OwnerId;
pub use transfer::{
    ResourceMetadata, TransferOutcome, TransferRequest, TransferStatus, TransferStrategy,
};
