//! Transfer engine.
//!
//! Two strategies move a remote body onto local disk:
//!
//! | Strategy | Resource checks | Use |
//! |----------|-----------------|-----|
//! | Direct | once, before the request | small resources |
//! | Chunked | before every chunk, backing off while the host is busy | large resources |
//!
//! Resolution and streaming go through the [`ResourceFetcher`] seam so the
//! engine is independent of the network stack.

mod chunk;
mod engine;
mod fetcher;
mod filename;
mod progress;

pub use chunk::ChunkAssembler;
pub use engine::{TransferEngine, TransferEngineConfig};
pub use fetcher::{ByteStream, HttpFetcher, ResourceBody, ResourceFetcher};
pub use filename::{
    FALLBACK_NAME, extension_for_media_type, filename_from_locator, sanitize, with_default_extension,
};
pub use progress::{ProgressObserver, TransferProgress};
