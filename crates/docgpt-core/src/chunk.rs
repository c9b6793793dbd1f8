//! Separator-preferring, token-bounded text chunker with overlap.
//!
//! Splits extracted document text into [`Chunk`]s of at most
//! `chunk_size` tokens, where consecutive chunks share up to
//! `chunk_overlap` tokens of trailing context.
//!
//! # Algorithm
//!
//! 1. Cut the text into segments at every occurrence of the separator
//!    (default `"\n"`). The separator stays attached to the segment it ends,
//!    so segments tile the text with no gap.
//! 2. A segment that alone exceeds `chunk_size` is re-cut at spaces.
//! 3. Accumulate segments into a window while the token total stays within
//!    `chunk_size`. When the next segment would overflow, emit the window,
//!    then drop segments from its front until what remains is at most
//!    `chunk_overlap` tokens and the next segment fits.
//! 4. Each chunk is the byte span `start..end` covered by its window; the
//!    stored text is that span trimmed. Whitespace-only windows are skipped.
//!
//! Token counting is pluggable via [`TokenCounter`] so the application can
//! use a real BPE tokenizer while tests use [`WhitespaceTokens`].
//!
//! # Example
//!
//! ```rust
//! use docgpt_core::chunk::{chunk_text, ChunkingOptions, WhitespaceTokens};
//!
//! let opts = ChunkingOptions { chunk_size: 4, chunk_overlap: 2, separator: "\n".into() };
//! let chunks = chunk_text("doc", "a b\nc d\ne f\n", &opts, &WhitespaceTokens);
//! assert_eq!(chunks.len(), 2);
//! assert_eq!(chunks[0].text, "a b\nc d");
//! assert_eq!(chunks[1].text, "c d\ne f");
//! ```

use std::collections::VecDeque;

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::models::Chunk;

/// Approximate characters-per-token ratio used by [`CharsPerToken`].
const CHARS_PER_TOKEN: usize = 4;

/// Counts tokens in a span of text.
pub trait TokenCounter: Send + Sync {
    fn count(&self, text: &str) -> usize;
}

/// Heuristic counter: one token per 4 bytes, rounded up.
pub struct CharsPerToken;

impl TokenCounter for CharsPerToken {
    fn count(&self, text: &str) -> usize {
        text.len().div_ceil(CHARS_PER_TOKEN)
    }
}

/// Counts whitespace-separated words. Deterministic; handy for tests.
pub struct WhitespaceTokens;

impl TokenCounter for WhitespaceTokens {
    fn count(&self, text: &str) -> usize {
        text.split_whitespace().count()
    }
}

/// Chunk sizing parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkingOptions {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub separator: String,
}

impl Default for ChunkingOptions {
    fn default() -> Self {
        Self {
            chunk_size: 600,
            chunk_overlap: 100,
            separator: "\n".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Segment {
    start: usize,
    end: usize,
    tokens: usize,
}

/// Split `text` into overlapping chunks.
///
/// Returns chunks with contiguous indices starting at 0. Text that is
/// empty or whitespace-only yields no chunks.
///
/// # Guarantees
///
/// - `chunks[i + 1].start <= chunks[i].end`: no byte of the text falls
///   between two consecutive chunks.
/// - Every chunk stays within `chunk_size` tokens unless it is a single
///   word longer than that.
pub fn chunk_text(
    document_id: &str,
    text: &str,
    options: &ChunkingOptions,
    counter: &dyn TokenCounter,
) -> Vec<Chunk> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let segments = segment_text(text, options, counter);

    let mut chunks = Vec::new();
    let mut window: VecDeque<Segment> = VecDeque::new();
    let mut total = 0usize;

    for seg in segments {
        if total + seg.tokens > options.chunk_size && !window.is_empty() {
            push_window(&mut chunks, document_id, text, &window);
            while total > options.chunk_overlap
                || (total + seg.tokens > options.chunk_size && total > 0)
            {
                match window.pop_front() {
                    Some(dropped) => total -= dropped.tokens,
                    None => break,
                }
            }
        }
        window.push_back(seg);
        total += seg.tokens;
    }

    if !window.is_empty() {
        push_window(&mut chunks, document_id, text, &window);
    }

    chunks
}

/// Cut text into separator-terminated segments, re-cutting oversized ones
/// at spaces.
fn segment_text(text: &str, options: &ChunkingOptions, counter: &dyn TokenCounter) -> Vec<Segment> {
    let mut out = Vec::new();
    for (start, end) in tile(text, &options.separator) {
        let tokens = counter.count(&text[start..end]);
        if tokens > options.chunk_size && options.separator != " " {
            for (s, e) in tile(&text[start..end], " ") {
                out.push(Segment {
                    start: start + s,
                    end: start + e,
                    tokens: counter.count(&text[start + s..start + e]),
                });
            }
        } else {
            out.push(Segment { start, end, tokens });
        }
    }
    out
}

/// Byte ranges that tile `text`, each ending just after an occurrence of
/// `separator` (the last range ends at `text.len()`).
fn tile(text: &str, separator: &str) -> Vec<(usize, usize)> {
    if separator.is_empty() {
        return vec![(0, text.len())];
    }
    let mut ranges = Vec::new();
    let mut prev = 0;
    for (idx, sep) in text.match_indices(separator) {
        let end = idx + sep.len();
        ranges.push((prev, end));
        prev = end;
    }
    if prev < text.len() {
        ranges.push((prev, text.len()));
    }
    ranges
}

fn push_window(chunks: &mut Vec<Chunk>, document_id: &str, text: &str, window: &VecDeque<Segment>) {
    let (Some(first), Some(last)) = (window.front(), window.back()) else {
        return;
    };
    let span = &text[first.start..last.end];
    if span.trim().is_empty() {
        return;
    }
    let index = chunks.len() as i64;
    chunks.push(make_chunk(document_id, index, span.trim(), first.start, last.end));
}

/// Create a single [`Chunk`] with a UUID and SHA-256 content hash.
fn make_chunk(document_id: &str, index: i64, text: &str, start: usize, end: usize) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        id: Uuid::new_v4().to_string(),
        document_id: document_id.to_string(),
        chunk_index: index,
        text: text.to_string(),
        hash,
        start,
        end,
    }
}
