//! Vector storage abstraction.
//!
//! A [`VectorStore`] holds the embedded chunks of one document and answers
//! nearest-neighbour queries. Stores are built wholesale from a chunk list
//! and its vectors; there is no update or delete. When the source document
//! changes, a new store is built.
//!
//! Implementations must be `Send + Sync` so a built store can be shared
//! behind an `Arc` by the retriever cache.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::ScoredChunk;

/// Nearest-neighbour index over embedded chunks.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`similarity_search`](VectorStore::similarity_search) | Top-k chunks for a query vector |
/// | [`len`](VectorStore::len) | Number of indexed chunks |
/// | [`dims`](VectorStore::dims) | Vector dimensionality (0 when empty) |
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Return up to `k` chunks ordered by descending similarity.
    async fn similarity_search(&self, query_vec: &[f32], k: usize) -> Result<Vec<ScoredChunk>>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn dims(&self) -> usize;
}
