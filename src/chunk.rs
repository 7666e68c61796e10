//! Paragraph-boundary text chunker.
//!
//! Splits file text into [`TextChunk`]s that respect a configurable
//! `max_tokens` limit. Splitting occurs on paragraph boundaries (`\n\n`)
//! to keep each chunk coherent; oversized paragraphs are cut at the last
//! newline or space before the limit.
//!
//! Chunking is a pure function of the input, so re-scanning an unchanged
//! directory yields identical chunk indices and therefore identical ids.

/// Approximate chars-per-token ratio.
const CHARS_PER_TOKEN: usize = 4;

/// One piece of a file, ready to become a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    pub index: usize,
    pub text: String,
}

/// Split text into chunks on paragraph boundaries, respecting max_tokens.
/// Returns chunks with contiguous indices starting at 0, or none for
/// whitespace-only input.
pub fn chunk_text(text: &str, max_tokens: usize) -> Vec<TextChunk> {
    let max_chars = (max_tokens * CHARS_PER_TOKEN).max(1);

    let mut chunks = Vec::new();
    let mut current_buf = String::new();

    for para in text.split("\n\n") {
        let trimmed = para.trim();
        if trimmed.is_empty() {
            continue;
        }

        let would_be = if current_buf.is_empty() {
            trimmed.len()
        } else {
            current_buf.len() + 2 + trimmed.len()
        };

        if would_be > max_chars && !current_buf.is_empty() {
            push_chunk(&mut chunks, &current_buf);
            current_buf.clear();
        }

        if trimmed.len() > max_chars {
            let mut remaining = trimmed;
            while !remaining.is_empty() {
                let split_at = floor_char_boundary(remaining, max_chars.min(remaining.len()));
                let actual_split = if split_at < remaining.len() {
                    remaining[..split_at]
                        .rfind('\n')
                        .or_else(|| remaining[..split_at].rfind(' '))
                        .map(|pos| pos + 1)
                        .unwrap_or(split_at)
                } else {
                    split_at
                };
                // A single char wider than max_chars still has to advance.
                let actual_split = if actual_split == 0 {
                    remaining
                        .char_indices()
                        .nth(1)
                        .map(|(i, _)| i)
                        .unwrap_or(remaining.len())
                } else {
                    actual_split
                };
                push_chunk(&mut chunks, remaining[..actual_split].trim());
                remaining = &remaining[actual_split..];
            }
        } else {
            if !current_buf.is_empty() {
                current_buf.push_str("\n\n");
            }
            current_buf.push_str(trimmed);
        }
    }

    if !current_buf.is_empty() {
        push_chunk(&mut chunks, &current_buf);
    }

    chunks
}

fn push_chunk(chunks: &mut Vec<TextChunk>, text: &str) {
    if text.is_empty() {
        return;
    }
    chunks.push(TextChunk {
        index: chunks.len(),
        text: text.to_string(),
    });
}

fn floor_char_boundary(s: &str, mut idx: usize) -> usize {
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}
