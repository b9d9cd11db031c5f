//! Property-based tests for chunking and filename derivation.
//!
//! - Chunk assembly never loses or duplicates bytes, whatever the chunk size
//! - Sanitized names only contain filesystem-safe characters
//! - Sanitization is idempotent
//! - Locator-derived names ignore query strings

// Property tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(clippy::expect_used, clippy::unwrap_used)]

use bytes::Bytes;
use futures_util::stream;
use mediaflow::transfer::{
    ChunkAssembler, FALLBACK_NAME, filename_from_locator, sanitize,
};
use proptest::prelude::*;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap()
}

/// Splits `body` into network pieces at the given cut points.
fn pieces(body: &[u8], cuts: &[usize]) -> Vec<mediaflow::Result<Bytes>> {
    let mut cuts: Vec<usize> = cuts.iter().map(|c| c % (body.len() + 1)).collect();
    cuts.sort_unstable();
    cuts.dedup();
    let mut out = Vec::new();
    let mut start = 0;
    for cut in cuts.into_iter().chain(std::iter::once(body.len())) {
        if cut > start {
            out.push(Ok(Bytes::copy_from_slice(&body[start..cut])));
            start = cut;
        }
    }
    out
}

proptest! {
    /// Property: concatenation of chunks equals the original body.
    #[test]
    fn prop_chunks_concatenate_to_body(
        body in prop::collection::vec(any::<u8>(), 0..4096),
        cuts in prop::collection::vec(any::<usize>(), 0..16),
        chunk_size in 1usize..1024,
    ) {
        let chunks = runtime().block_on(async {
            let mut assembler = ChunkAssembler::new(stream::iter(pieces(&body, &cuts)), chunk_size);
            let mut chunks = Vec::new();
            while let Some(chunk) = assembler.next_chunk().await {
                chunks.push(chunk.unwrap());
            }
            chunks
        });

        let joined: Vec<u8> = chunks.iter().flat_map(|c| c.iter().copied()).collect();
        prop_assert_eq!(&joined, &body);
        // Every chunk but the last is exactly chunk_size.
        if let Some((_, full)) = chunks.split_last() {
            prop_assert!(full.iter().all(|c| c.len() == chunk_size));
        }
        prop_assert!(chunks.iter().all(|c| !c.is_empty()));
    }

    /// Property: sanitized names are non-empty and filesystem-safe.
    #[test]
    fn prop_sanitize_is_safe(name in "\\PC{0,64}") {
        let safe = sanitize(&name);
        prop_assert!(!safe.is_empty());
        prop_assert!(safe.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')));
        prop_assert!(safe != "." && safe != "..");
    }

    /// Property: sanitizing twice changes nothing.
    #[test]
    fn prop_sanitize_is_idempotent(name in "\\PC{0,64}") {
        let once = sanitize(&name);
        prop_assert_eq!(sanitize(&once), once);
    }

    /// Property: query string and fragment never reach the file name.
    #[test]
    fn prop_filename_ignores_query(
        stem in "[a-z0-9]{1,16}",
        ext in "(mp4|jpg|mp3|webm)",
        query in "[a-z0-9=&]{0,32}",
    ) {
        let locator = format!("https://example.com/media/{stem}.{ext}?{query}#frag");
        prop_assert_eq!(filename_from_locator(&locator), format!("{stem}.{ext}"));
    }

    /// Property: a bare host always yields the fallback name.
    #[test]
    fn prop_bare_host_falls_back(host in "[a-z]{1,12}\\.(com|org|net)") {
        prop_assert_eq!(filename_from_locator(&format!("https://{host}/")), FALLBACK_NAME);
    }
}
