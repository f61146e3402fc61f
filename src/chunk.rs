//! Separator-aware, overlapping text chunker.
//!
//! Splits each page of the source document into [`Chunk`]s of at most
//! `chunk_size` characters. Consecutive chunks of a page share exactly
//! `chunk_overlap` characters: chunk N+1 starts with the last
//! `chunk_overlap` characters of chunk N, so dropping that prefix from every
//! chunk after the first and concatenating gives back the page text.
//!
//! Cut points are chosen from an ordered separator list (paragraph break,
//! line break, CJK and Latin sentence punctuation, clause punctuation). The
//! first separator in the list that occurs inside the current window wins,
//! at its last occurrence; the separator stays with the chunk it ends. When
//! no separator fits, the chunk is cut at exactly `chunk_size` characters
//! and marked [`Chunk::hard_cut`].
//!
//! All lengths are counted in `char`s so that CJK text is not penalised by
//! its UTF-8 width.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::config::{ChunkingConfig, MetadataConfig};
use crate::models::{Chunk, ChunkMetadata, Page};

/// A chunk boundary within one text, in character offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub hard_cut: bool,
}

/// Compute chunk spans for `text`.
///
/// Returns no spans for empty text. Requires `overlap < chunk_size`
/// (enforced by [`Config::validate`](crate::config::Config::validate));
/// a larger overlap is clamped so the splitter always makes progress.
pub fn split_spans(
    text: &str,
    chunk_size: usize,
    overlap: usize,
    separators: &[String],
) -> Vec<Span> {
    let chars: Vec<char> = text.chars().collect();
    let seps: Vec<Vec<char>> = separators
        .iter()
        .filter(|s| !s.is_empty())
        .map(|s| s.chars().collect())
        .collect();

    let chunk_size = chunk_size.max(1);
    let overlap = overlap.min(chunk_size - 1);
    let total = chars.len();

    let mut spans = Vec::new();
    if total == 0 {
        return spans;
    }

    let mut start = 0;
    loop {
        if total - start <= chunk_size {
            spans.push(Span {
                start,
                end: total,
                hard_cut: false,
            });
            break;
        }

        let limit = start + chunk_size;
        // The cut must leave something past the overlap, or the next chunk
        // would start where this one did.
        let min_end = start + overlap + 1;

        let span = match find_cut(&chars, &seps, min_end, limit) {
            Some(end) => Span {
                start,
                end,
                hard_cut: false,
            },
            None => Span {
                start,
                end: limit,
                hard_cut: true,
            },
        };
        spans.push(span);
        start = span.end - overlap;
    }

    spans
}

/// Find the end offset of the highest-priority separator whose end falls in
/// `[min_end, limit]`, preferring its last occurrence.
fn find_cut(chars: &[char], seps: &[Vec<char>], min_end: usize, limit: usize) -> Option<usize> {
    for sep in seps {
        let len = sep.len();
        let mut end = limit;
        while end >= min_end && end >= len {
            if chars[end - len..end] == sep[..] {
                return Some(end);
            }
            end -= 1;
        }
    }
    None
}

/// Split every page into chunks and tag them with `metadata`.
///
/// Blank pages contribute nothing. Chunk indices are contiguous across the
/// whole document, starting at 0.
pub fn chunk_pages(
    pages: &[Page],
    config: &ChunkingConfig,
    metadata: &MetadataConfig,
) -> Vec<Chunk> {
    let mut chunks = Vec::new();

    for page in pages {
        if page.text.trim().is_empty() {
            continue;
        }

        let spans = split_spans(
            &page.text,
            config.chunk_size,
            config.chunk_overlap,
            &config.separators,
        );
        let chars: Vec<char> = page.text.chars().collect();

        for span in spans {
            let text: String = chars[span.start..span.end].iter().collect();
            let meta = ChunkMetadata {
                source: metadata.source.clone(),
                language: metadata.language.clone(),
                chunk_type: metadata.chunk_type.clone(),
                page: page.number,
            };
            chunks.push(make_chunk(chunks.len(), text, span, meta));
        }
    }

    chunks
}

fn make_chunk(index: usize, text: String, span: Span, metadata: ChunkMetadata) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        id: Uuid::new_v4().to_string(),
        chunk_index: index,
        text,
        hash,
        start_char: span.start,
        end_char: span.end,
        hard_cut: span.hard_cut,
        metadata,
    }
}
