use crate::extractor::PageText;
use crate::models::{ChunkingOptions, DocumentChunk};
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::collections::VecDeque;

pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace('\u{a0}', " ")
}

/// Splits `text` into windows of at most `chunk_size` characters.
///
/// Separators are tried in order: the first one present in the text is used to
/// cut it into pieces, neighbouring pieces are merged back up to `chunk_size`,
/// and any piece that is still too long is split again with the separators that
/// follow. The empty separator cuts between characters, so with the default
/// separator list every output respects the size limit. Consecutive windows
/// share up to `chunk_overlap` characters.
pub fn split_text(text: &str, options: &ChunkingOptions) -> Vec<String> {
    split_recursive(text, &options.separators, options)
}

fn split_recursive(text: &str, separators: &[String], options: &ChunkingOptions) -> Vec<String> {
    let (separator, remaining) = pick_separator(text, separators);

    let pieces: Vec<&str> = if separator.is_empty() {
        text.char_indices()
            .map(|(index, ch)| &text[index..index + ch.len_utf8()])
            .collect()
    } else {
        text.split(separator)
            .filter(|piece| !piece.is_empty())
            .collect()
    };

    let mut chunks = Vec::new();
    let mut pending: Vec<&str> = Vec::new();

    for piece in pieces {
        if char_len(piece) < options.chunk_size {
            pending.push(piece);
            continue;
        }

        if !pending.is_empty() {
            chunks.extend(merge_pieces(&pending, separator, options));
            pending.clear();
        }

        if remaining.is_empty() {
            let trimmed = piece.trim();
            if !trimmed.is_empty() {
                chunks.push(trimmed.to_string());
            }
        } else {
            chunks.extend(split_recursive(piece, remaining, options));
        }
    }

    if !pending.is_empty() {
        chunks.extend(merge_pieces(&pending, separator, options));
    }

    chunks
}

fn pick_separator<'a>(text: &str, separators: &'a [String]) -> (&'a str, &'a [String]) {
    for (index, separator) in separators.iter().enumerate() {
        if separator.is_empty() || text.contains(separator.as_str()) {
            return (separator.as_str(), &separators[index + 1..]);
        }
    }

    (separators.last().map(String::as_str).unwrap_or(""), &[])
}

fn merge_pieces(pieces: &[&str], separator: &str, options: &ChunkingOptions) -> Vec<String> {
    let separator_len = char_len(separator);
    let mut merged = Vec::new();
    let mut window: VecDeque<&str> = VecDeque::new();
    let mut total = 0usize;

    for &piece in pieces {
        let len = char_len(piece);
        let joiner = |window: &VecDeque<&str>| if window.is_empty() { 0 } else { separator_len };

        if total + len + joiner(&window) > options.chunk_size && !window.is_empty() {
            push_joined(&mut merged, &window, separator);

            while total > options.chunk_overlap
                || (total > 0 && total + len + joiner(&window) > options.chunk_size)
            {
                let Some(front) = window.pop_front() else {
                    break;
                };
                total = total.saturating_sub(char_len(front) + joiner(&window));
            }
        }

        window.push_back(piece);
        total += len + if window.len() > 1 { separator_len } else { 0 };
    }

    push_joined(&mut merged, &window, separator);
    merged
}

fn push_joined(target: &mut Vec<String>, window: &VecDeque<&str>, separator: &str) {
    let joined = window.iter().copied().collect::<Vec<_>>().join(separator);
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        target.push(trimmed.to_string());
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Chunks every page of one document, numbering chunks across the whole file.
pub fn chunk_pages(source: &str, pages: &[PageText], options: &ChunkingOptions) -> Vec<DocumentChunk> {
    let ingested_at = Utc::now();
    let mut chunks = Vec::new();
    let mut cursor = 0u64;

    for page in pages {
        for text in split_text(&page.text, options) {
            chunks.push(DocumentChunk {
                chunk_id: make_chunk_id(source, page.number, cursor, &text),
                source: source.to_string(),
                page: page.number,
                chunk_index: cursor,
                text,
                ingested_at,
            });
            cursor = cursor.saturating_add(1);
        }
    }

    chunks
}

fn make_chunk_id(source: &str, page: u32, index: u64, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    hasher.update(page.to_le_bytes());
    hasher.update(index.to_le_bytes());
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
