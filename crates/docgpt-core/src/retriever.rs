//! Query-time retrieval over a built [`VectorStore`].

use std::sync::Arc;

use anyhow::Result;

use crate::embedding::Embedder;
use crate::models::RetrievedContext;
use crate::store::VectorStore;

/// Default number of chunks returned per query.
pub const DEFAULT_TOP_K: usize = 4;

/// Embeds a question and returns the most similar chunks of one document.
///
/// Query embeddings go straight to `query_embedder`, never through the
/// document cache: questions are one-off and not tied to the file.
pub struct Retriever {
    store: Arc<dyn VectorStore>,
    query_embedder: Arc<dyn Embedder>,
    top_k: usize,
}

impl Retriever {
    pub fn new(store: Arc<dyn VectorStore>, query_embedder: Arc<dyn Embedder>, top_k: usize) -> Self {
        Self {
            store,
            query_embedder,
            top_k: top_k.max(1),
        }
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Number of chunks in the underlying index.
    pub fn indexed_chunks(&self) -> usize {
        self.store.len()
    }

    /// Retrieve the `top_k` chunks most relevant to `question`,
    /// highest score first.
    pub async fn retrieve(&self, question: &str) -> Result<RetrievedContext> {
        if self.store.is_empty() {
            return Ok(Vec::new());
        }
        let query_vec = self.query_embedder.embed_query(question).await?;
        self.store.similarity_search(&query_vec, self.top_k).await
    }
}
