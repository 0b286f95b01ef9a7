//! Text cleanup and fixed-window chunking.
//!
//! Chunking policy: fixed-size character windows with a configurable overlap so
//! context survives across boundaries. When a sentence-ending punctuation mark
//! falls in the second half of a window, the window is cut there instead of at
//! the hard limit. No semantic boundary detection is attempted.

use super::types::ChunkingError;

/// A contiguous span of cleaned document text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkSpan {
    /// Chunk text with surrounding whitespace trimmed.
    pub text: String,
    /// Byte offset of the window start within the cleaned text.
    pub start: usize,
    /// Byte offset of the window end within the cleaned text.
    pub end: usize,
    /// Zero-based position of the chunk within its document.
    pub ordinal: usize,
}

/// Normalize raw extracted text before chunking.
///
/// Collapses all whitespace runs to single spaces, drops non-ASCII characters,
/// and replaces special characters while keeping sentence structure intact.
pub(crate) fn clean_text(text: &str) -> String {
    let substituted: String = text
        .chars()
        .filter(char::is_ascii)
        .map(|c| {
            if c.is_ascii_alphanumeric()
                || c.is_ascii_whitespace()
                || matches!(
                    c,
                    '.' | ',' | ';' | ':' | '!' | '?' | '(' | ')' | '[' | ']' | '-' | '_'
                )
            {
                c
            } else {
                ' '
            }
        })
        .collect();

    substituted.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Split cleaned text into overlapping windows.
///
/// The sequence is finite and restartable: chunking the same input twice yields
/// the same spans. Returns an empty vector for all-whitespace input.
pub(crate) fn chunk_text(
    text: &str,
    chunk_size: usize,
    overlap: usize,
) -> Result<Vec<ChunkSpan>, ChunkingError> {
    if chunk_size == 0 {
        return Err(ChunkingError::InvalidChunkSize);
    }
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    // An overlap as large as the window would prevent forward progress.
    let overlap = overlap.min(chunk_size - 1);
    let len = text.len();
    let mut chunks = Vec::new();
    let mut start = 0usize;

    while start < len {
        let mut end = (start + chunk_size).min(len);
        while !text.is_char_boundary(end) {
            end -= 1;
        }

        // Prefer a sentence boundary when one lies past the window midpoint.
        if end < len
            && let Some(pos) = text[start..end].rfind(['.', '!', '?'])
            && pos > chunk_size / 2
        {
            end = start + pos + 1;
        }

        let piece = text[start..end].trim();
        if !piece.is_empty() {
            chunks.push(ChunkSpan {
                text: piece.to_string(),
                start,
                end,
                ordinal: chunks.len(),
            });
        }

        if end >= len {
            break;
        }
        let mut next = if end > overlap && end - overlap > start {
            end - overlap
        } else {
            end
        };
        while !text.is_char_boundary(next) {
            next += 1;
        }
        start = next;
    }

    Ok(chunks)
}
