//! Paragraph-boundary text chunker.
//!
//! Splits extracted document text into drafts that respect a configurable
//! character budget. Splitting occurs on paragraph boundaries (`\n\n`) to
//! keep each excerpt coherent; paragraphs larger than the budget are
//! windowed with a character overlap so no boundary loses context.
//!
//! Lengths are counted in characters, not bytes — course material is
//! largely Japanese and a byte budget would split multibyte sequences.
//!
//! Each draft carries a SHA-256 hash of its content for dedup/staleness
//! checks. Embeddings are attached later by the ingestion pipeline.

use sha2::{Digest, Sha256};

/// A chunk before it has an id or embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkDraft {
    pub chunk_index: i64,
    pub content: String,
    pub hash: String,
}

/// Split text into drafts with contiguous indices starting at 0.
/// Always returns at least one draft.
pub fn chunk_text(text: &str, max_chars: usize, overlap_chars: usize) -> Vec<ChunkDraft> {
    if text.trim().is_empty() {
        return vec![make_draft(0, text.trim())];
    }

    let mut drafts = Vec::new();
    let mut current_buf = String::new();
    let mut current_len = 0usize;
    let mut index: i64 = 0;

    for para in text.split("\n\n") {
        let trimmed = para.trim();
        if trimmed.is_empty() {
            continue;
        }
        let para_len = trimmed.chars().count();

        // Flush the buffer if this paragraph would not fit.
        let would_be = if current_buf.is_empty() {
            para_len
        } else {
            current_len + 2 + para_len
        };
        if would_be > max_chars && !current_buf.is_empty() {
            drafts.push(make_draft(index, &current_buf));
            index += 1;
            current_buf.clear();
            current_len = 0;
        }

        if para_len > max_chars {
            if !current_buf.is_empty() {
                drafts.push(make_draft(index, &current_buf));
                index += 1;
                current_buf.clear();
                current_len = 0;
            }
            // Window the oversized paragraph with overlap between windows.
            let chars: Vec<char> = trimmed.chars().collect();
            let step = max_chars.saturating_sub(overlap_chars).max(1);
            let mut start = 0usize;
            loop {
                let end = (start + max_chars).min(chars.len());
                let piece: String = chars[start..end].iter().collect();
                drafts.push(make_draft(index, piece.trim()));
                index += 1;
                if end == chars.len() {
                    break;
                }
                start += step;
            }
        } else {
            if !current_buf.is_empty() {
                current_buf.push_str("\n\n");
                current_len += 2;
            }
            current_buf.push_str(trimmed);
            current_len += para_len;
        }
    }

    if !current_buf.is_empty() {
        drafts.push(make_draft(index, &current_buf));
    }

    if drafts.is_empty() {
        drafts.push(make_draft(0, text.trim()));
    }

    drafts
}

fn make_draft(index: i64, content: &str) -> ChunkDraft {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    ChunkDraft {
        chunk_index: index,
        content: content.to_string(),
        hash,
    }
}
