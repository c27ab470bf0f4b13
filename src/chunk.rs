//! Line-window text chunker.
//!
//! Splits document text into groups of at most `max_lines` lines. Lines are
//! the pieces between `\n` separators, so joining the returned chunks with
//! `"\n"` reproduces the input exactly (`\r` and trailing newlines survive).
//!
//! Each chunk later receives a deterministic id derived from its category,
//! source path and position, so re-indexing the same file overwrites the
//! same records.

use crate::models::{Category, DocumentChunk};

/// Window used for configuration files and home-directory documents.
pub const DEFAULT_MAX_LINES: usize = 20;

/// Manual pages are denser; they get a larger window.
pub const MANPAGE_MAX_LINES: usize = 40;

/// Split `text` into contiguous groups of at most `max_lines` lines.
///
/// Empty input (or `max_lines == 0`) yields no chunks. Whitespace-only
/// chunks are kept here; [`build_chunks`] drops them.
pub fn chunk_lines(text: &str, max_lines: usize) -> Vec<String> {
    if text.is_empty() || max_lines == 0 {
        return Vec::new();
    }

    let lines: Vec<&str> = text.split('\n').collect();
    lines
        .chunks(max_lines)
        .map(|group| group.join("\n"))
        .collect()
}

/// Stable record id: `{category}_{sanitizedPath}_{chunkIndex}`.
///
/// Path separators are replaced by `_`, so `/etc/fstab` chunk 0 becomes
/// `config__etc_fstab_0`.
pub fn chunk_id(category: Category, source_path: &str, chunk_index: usize) -> String {
    format!(
        "{}_{}_{}",
        category,
        sanitize_path(source_path),
        chunk_index
    )
}

fn sanitize_path(path: &str) -> String {
    path.replace(['/', '\\'], "_")
}

/// Chunk a loaded document into [`DocumentChunk`]s.
///
/// Chunks that are empty after trimming are dropped, but the survivors keep
/// their original position as `chunk_index` so ids stay stable.
pub fn build_chunks(
    category: Category,
    source_path: &str,
    text: &str,
    content_hash: &str,
    max_lines: usize,
) -> Vec<DocumentChunk> {
    chunk_lines(text, max_lines)
        .into_iter()
        .enumerate()
        .filter(|(_, chunk)| !chunk.trim().is_empty())
        .map(|(index, chunk)| DocumentChunk {
            id: chunk_id(category, source_path, index),
            text: chunk,
            source_path: source_path.to_string(),
            chunk_index: index,
            content_hash: content_hash.to_string(),
            category,
        })
        .collect()
}
