//! Re-chunking of a body stream into fixed-size pieces.

use crate::Result;
use bytes::{Bytes, BytesMut};
use futures_util::{Stream, StreamExt};

/// Reads a byte stream in chunks of exactly `chunk_size` bytes.
///
/// Network reads arrive in arbitrary sizes; the assembler buffers them and
/// yields full chunks, then whatever remains at end of stream. Chunks are
/// yielded strictly in arrival order and no byte is lost or repeated.
pub struct ChunkAssembler<S> {
    stream: S,
    chunk_size: usize,
    buffer: BytesMut,
    finished: bool,
}

impl<S> ChunkAssembler<S>
where
    S: Stream<Item = Result<Bytes>> + Unpin,
{
    /// Wraps `stream`. A zero chunk size is treated as one byte.
    pub fn new(stream: S, chunk_size: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            stream,
            chunk_size,
            buffer: BytesMut::new(),
            finished: false,
        }
    }

    /// Configured chunk size.
    pub const fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Returns the next chunk, `None` at end of stream.
    ///
    /// # Errors
    ///
    /// Propagates the first stream error; buffered bytes are discarded.
    pub async fn next_chunk(&mut self) -> Option<Result<Bytes>> {
        while !self.finished && self.buffer.len() < self.chunk_size {
            match self.stream.next().await {
                Some(Ok(piece)) => self.buffer.extend_from_slice(&piece),
                Some(Err(e)) => {
                    self.finished = true;
                    self.buffer.clear();
                    return Some(Err(e));
                },
                None => self.finished = true,
            }
        }

        if self.buffer.is_empty() {
            return None;
        }
        let take = self.chunk_size.min(self.buffer.len());
        Some(Ok(self.buffer.split_to(take).freeze()))
    }
}
