//! In-memory [`VectorStore`] with brute-force cosine similarity.
//!
//! Documents handled here are a single uploaded file, so a flat scan over
//! every vector is fast enough and exact.

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::models::{Chunk, ScoredChunk};

use super::VectorStore;

struct StoredVector {
    chunk: Chunk,
    vector: Vec<f32>,
}

/// Flat in-memory index over one document's chunks.
pub struct InMemoryVectorStore {
    entries: Vec<StoredVector>,
    dims: usize,
}

impl InMemoryVectorStore {
    /// Build an index from chunks and their vectors (same order, same length).
    ///
    /// # Errors
    ///
    /// Fails when the two slices differ in length or the vectors do not all
    /// share one non-zero dimensionality.
    pub fn build(chunks: Vec<Chunk>, vectors: Vec<Vec<f32>>) -> Result<Self> {
        if chunks.len() != vectors.len() {
            bail!(
                "cannot build index: {} chunks but {} vectors",
                chunks.len(),
                vectors.len()
            );
        }
        let dims = vectors.first().map(|v| v.len()).unwrap_or(0);
        if !vectors.is_empty() && dims == 0 {
            bail!("cannot build index: embedding vectors are empty");
        }
        if let Some(bad) = vectors.iter().position(|v| v.len() != dims) {
            bail!(
                "cannot build index: vector {} has {} dims, expected {}",
                bad,
                vectors[bad].len(),
                dims
            );
        }

        let entries = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| StoredVector { chunk, vector })
            .collect();

        Ok(Self { entries, dims })
    }

    /// Chunks in document order.
    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.entries.iter().map(|e| &e.chunk)
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn similarity_search(&self, query_vec: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        if !self.entries.is_empty() && query_vec.len() != self.dims {
            bail!(
                "query vector has {} dims but the index holds {}-dim vectors",
                query_vec.len(),
                self.dims
            );
        }
        let mut candidates: Vec<ScoredChunk> = self
            .entries
            .iter()
            .map(|e| ScoredChunk {
                chunk: e.chunk.clone(),
                score: cosine_similarity(query_vec, &e.vector),
            })
            .collect();
        // Stable sort: equal scores keep document order.
        candidates.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        candidates.truncate(k);
        Ok(candidates)
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn dims(&self) -> usize {
        self.dims
    }
}
