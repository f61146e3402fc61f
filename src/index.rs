//! Ephemeral in-memory vector index.
//!
//! Holds `(Chunk, vector)` pairs for one workflow run and answers top-K
//! nearest-neighbour queries by brute-force cosine similarity. The index is
//! immutable after [`VectorIndex::new`], so it can be shared behind an `Arc`
//! without locking.
//!
//! Metadata filters are applied while scanning, before truncation to K, so a
//! filtered query still returns up to K matching chunks.

use anyhow::{bail, Result};
use serde::Serialize;

use crate::models::{Chunk, ChunkMetadata};

/// A retrieved chunk and its cosine similarity to the query.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// Metadata predicate for [`VectorIndex::search`]. `None` fields match
/// anything.
#[derive(Debug, Clone, Default)]
pub struct ChunkFilter {
    pub language: Option<String>,
    pub chunk_type: Option<String>,
    pub source: Option<String>,
}

impl ChunkFilter {
    pub fn language(language: impl Into<String>) -> Self {
        Self {
            language: Some(language.into()),
            ..Default::default()
        }
    }

    pub fn matches(&self, meta: &ChunkMetadata) -> bool {
        fn field_ok(want: &Option<String>, have: &str) -> bool {
            want.as_deref().map_or(true, |w| w == have)
        }
        field_ok(&self.language, &meta.language)
            && field_ok(&self.chunk_type, &meta.chunk_type)
            && field_ok(&self.source, &meta.source)
    }
}

#[derive(Debug)]
struct Entry {
    chunk: Chunk,
    vector: Vec<f32>,
}

#[derive(Debug)]
pub struct VectorIndex {
    model: String,
    dims: usize,
    entries: Vec<Entry>,
}

impl VectorIndex {
    /// Pair each chunk with its vector.
    ///
    /// # Errors
    ///
    /// Fails if the counts differ, any vector is not `dims` long, or any
    /// component is NaN or infinite.
    pub fn new(
        model: impl Into<String>,
        dims: usize,
        chunks: Vec<Chunk>,
        vectors: Vec<Vec<f32>>,
    ) -> Result<Self> {
        if chunks.len() != vectors.len() {
            bail!(
                "cannot index {} chunks with {} vectors",
                chunks.len(),
                vectors.len()
            );
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != dims) {
            bail!("vector has {} dimensions, index expects {}", bad.len(), dims);
        }
        if let Some(pos) = vectors.iter().position(|v| !is_finite(v)) {
            bail!("vector {} contains non-finite values", pos);
        }

        let entries = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| Entry { chunk, vector })
            .collect();

        Ok(Self {
            model: model.into(),
            dims,
            entries,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.entries.iter().map(|e| &e.chunk)
    }

    /// Return up to `k` chunks passing `filter`, most similar first.
    ///
    /// Ties keep document order.
    pub fn search(
        &self,
        query_vec: &[f32],
        k: usize,
        filter: Option<&ChunkFilter>,
    ) -> Result<Vec<ScoredChunk>> {
        if query_vec.len() != self.dims {
            bail!(
                "query vector has {} dimensions, index expects {}",
                query_vec.len(),
                self.dims
            );
        }
        if !is_finite(query_vec) {
            bail!("query vector contains non-finite values");
        }

        let mut candidates: Vec<ScoredChunk> = self
            .entries
            .iter()
            .filter(|e| filter.map_or(true, |f| f.matches(&e.chunk.metadata)))
            .map(|e| ScoredChunk {
                chunk: e.chunk.clone(),
                score: cosine_similarity(query_vec, &e.vector),
            })
            .collect();

        candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
        candidates.truncate(k);
        Ok(candidates)
    }
}

fn is_finite(v: &[f32]) -> bool {
    v.iter().all(|x| x.is_finite())
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`, or `0.0` for empty vectors, vectors of
/// different lengths, or zero vectors. Sums are taken in `f64` so large
/// finite components cannot overflow to infinity.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (&x, &y) in a.iter().zip(b.iter()) {
        let (x, y) = (f64::from(x), f64::from(y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f64::from(f32::EPSILON) {
        return 0.0;
    }

    (dot / denom).clamp(-1.0, 1.0) as f32
}
