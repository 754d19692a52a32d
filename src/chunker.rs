//! Separator-boundary text chunker.
//!
//! Splits document text into overlapping [`TextChunk`]s bounded by
//! `chunk_size`. When a chunk boundary would fall mid-text, the cut point
//! is pulled back to the best separator (paragraph break, newline,
//! sentence end, …) found within the last 200 bytes of the window, so
//! chunks end on semantic boundaries whenever possible.
//!
//! # Algorithm
//!
//! 1. At each step the candidate end is `min(start + chunk_size, len)`.
//! 2. If the candidate end is before the end of the text, scan backward
//!    through at most the last 200 bytes of the window for the first
//!    separator in priority order and cut immediately after it; if none
//!    is found, hard-cut at the candidate end (may split mid-word — the
//!    accepted tradeoff for a bounded chunk size).
//! 3. Trim the slice and emit it if non-empty, with a strictly increasing
//!    `chunk_index`.
//! 4. Advance `start` to `max(cut - chunk_overlap, start + one char)`.
//!    The one-char floor guarantees forward progress even when the
//!    overlap is as large as the chunk size.
//!
//! All offsets are byte positions snapped to UTF-8 character boundaries.
//!
//! # Example
//!
//! ```rust
//! use foldertalk::chunker::{chunk_text, ChunkingOptions};
//!
//! let chunks = chunk_text("Hello world.\n\nSecond paragraph.", &ChunkingOptions::default());
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].chunk_index, 0);
//! ```

use crate::models::TextChunk;

/// Separators tried in priority order when searching for a cut point.
pub const DEFAULT_SEPARATORS: &[&str] = &["\n\n", "\n", ". ", "! ", "? ", "; ", ": ", ", ", " "];

/// Approximate characters-per-token ratio used by [`chunk_by_tokens`].
const CHARS_PER_TOKEN: usize = 4;

/// How far back from the candidate end to search for a separator.
const BREAK_LOOKBACK: usize = 200;

/// Tuning knobs for [`chunk_text`].
#[derive(Debug, Clone)]
pub struct ChunkingOptions {
    /// Target chunk size in bytes.
    pub chunk_size: usize,
    /// Overlap between adjacent chunks in bytes.
    pub chunk_overlap: usize,
    /// Separators to cut on, in order of preference.
    pub separators: Vec<String>,
}

impl Default for ChunkingOptions {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Split text into overlapping chunks cut on separator boundaries.
///
/// Empty or whitespace-only input yields an empty Vec. Otherwise every
/// returned chunk has non-empty trimmed content, `start_index < end_index`,
/// and `chunk_index` counting up from 0.
pub fn chunk_text(text: &str, options: &ChunkingOptions) -> Vec<TextChunk> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let chunk_size = options.chunk_size.max(1);
    let mut chunks = Vec::new();
    let mut start = 0usize;
    let mut chunk_index: i64 = 0;

    while start < text.len() {
        let end = snap_to_char_boundary(text, (start + chunk_size).min(text.len()));

        // Not at the end of the text: try to find a good break point.
        let cut = if end < text.len() {
            find_break_point(text, start, end, &options.separators)
        } else {
            end
        };

        let content = text[start..cut].trim();
        if !content.is_empty() {
            chunks.push(TextChunk {
                content: content.to_string(),
                start_index: start,
                end_index: cut,
                chunk_index,
            });
            chunk_index += 1;
        }

        // Move to the next chunk with overlap, always making progress.
        let next = snap_to_char_boundary(text, cut.saturating_sub(options.chunk_overlap));
        start = next.max(next_char_boundary(text, start));
    }

    chunks
}

/// Chunk text targeting a token budget, using the 4 chars/token heuristic.
///
/// Convenience wrapper around [`chunk_text`] with
/// `chunk_size = target_tokens × 4` and `chunk_overlap = overlap_tokens × 4`.
pub fn chunk_by_tokens(text: &str, target_tokens: usize, overlap_tokens: usize) -> Vec<TextChunk> {
    let options = ChunkingOptions {
        chunk_size: target_tokens * CHARS_PER_TOKEN,
        chunk_overlap: overlap_tokens * CHARS_PER_TOKEN,
        ..ChunkingOptions::default()
    };
    chunk_text(text, &options)
}

/// Search backward through the tail of the window for the best separator.
///
/// Separators are tried in listed priority order; the first one found wins
/// and the cut lands immediately after it. Falls back to the candidate end
/// when no separator appears in the lookback range.
fn find_break_point(text: &str, start: usize, end: usize, separators: &[String]) -> usize {
    let search_start = snap_to_char_boundary(text, end.saturating_sub(BREAK_LOOKBACK)).max(start);
    let window = &text[search_start..end];

    for separator in separators {
        if let Some(pos) = window.rfind(separator.as_str()) {
            return search_start + pos + separator.len();
        }
    }

    end
}

/// Snap a byte index back to the nearest valid UTF-8 char boundary.
fn snap_to_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

/// The first char boundary strictly after `index`.
fn next_char_boundary(s: &str, index: usize) -> usize {
    let mut i = index + 1;
    while i < s.len() && !s.is_char_boundary(i) {
        i += 1;
    }
    i.min(s.len())
}
