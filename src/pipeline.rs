//! Upload → retriever pipeline with a per-process memo.
//!
//! [`DocumentPipeline::embed_file`] ingests an upload, embeds its chunks
//! through the on-disk cache, and builds an in-memory index. The resulting
//! [`Retriever`] is memoized by [`FileKey`], so presenting the same file
//! again skips chunking and embedding entirely.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;

use docgpt_core::chunk::TokenCounter;
use docgpt_core::embedding::Embedder;
use docgpt_core::retriever::Retriever;
use docgpt_core::store::memory::InMemoryVectorStore;

use crate::config::Config;
use crate::embed_cache::{CacheBackedEmbedder, LocalFileStore};
use crate::ingest::{ingest_upload, safe_file_name, FileKey, UploadedFile};
use crate::progress::{EmbedProgressEvent, ProgressReporter};

/// Retrievers built in this process, keyed by upload content.
#[derive(Default)]
pub struct RetrieverCache {
    entries: HashMap<FileKey, Arc<Retriever>>,
}

impl RetrieverCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, key: &FileKey) -> Option<Arc<Retriever>> {
        self.entries.get(key).cloned()
    }

    pub fn store(&mut self, key: FileKey, retriever: Arc<Retriever>) {
        self.entries.insert(key, retriever);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Owns everything needed to turn uploads into retrievers.
pub struct DocumentPipeline {
    config: Config,
    embedder: Arc<dyn Embedder>,
    counter: Arc<dyn TokenCounter>,
    retrievers: RetrieverCache,
    progress: Box<dyn ProgressReporter>,
}

impl DocumentPipeline {
    pub fn new(
        config: Config,
        embedder: Arc<dyn Embedder>,
        counter: Arc<dyn TokenCounter>,
        progress: Box<dyn ProgressReporter>,
    ) -> Self {
        Self {
            config,
            embedder,
            counter,
            retrievers: RetrieverCache::new(),
            progress,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn retrievers(&self) -> &RetrieverCache {
        &self.retrievers
    }

    /// Return a retriever for `upload`, building it on first sight.
    ///
    /// Document vectors are read from and written to
    /// `<cache_dir>/embeddings/<file name>/`. The retriever embeds questions
    /// with the raw embedder.
    pub async fn embed_file(&mut self, upload: &UploadedFile) -> Result<(FileKey, Arc<Retriever>)> {
        let key = upload.key();
        if let Some(retriever) = self.retrievers.lookup(&key) {
            tracing::debug!(file = %upload.name, key = %key, "retriever memo hit");
            self.progress.report(EmbedProgressEvent::Reused {
                file: upload.name.clone(),
            });
            return Ok((key, retriever));
        }

        let doc = ingest_upload(
            &self.config,
            upload,
            self.counter.clone(),
            self.progress.as_ref(),
        )
        .await?;

        let namespace = self
            .config
            .cache
            .embeddings_dir()
            .join(safe_file_name(&doc.name)?);
        let cached = CacheBackedEmbedder::new(
            self.embedder.clone(),
            LocalFileStore::new(namespace),
            self.config.embedding.batch_size,
        );

        let texts: Vec<String> = doc.chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = cached
            .embed_with_progress(&texts, &doc.name, self.progress.as_ref())
            .await?;
        let stats = cached.stats();
        tracing::info!(
            file = %doc.name,
            chunks = doc.chunks.len(),
            cache_hits = stats.hits,
            cache_misses = stats.misses,
            "document embedded"
        );

        let chunk_count = doc.chunks.len() as u64;
        let store = InMemoryVectorStore::build(doc.chunks, vectors)?;
        let retriever = Arc::new(Retriever::new(
            Arc::new(store),
            self.embedder.clone(),
            self.config.retrieval.top_k,
        ));
        self.retrievers.store(key.clone(), retriever.clone());

        self.progress.report(EmbedProgressEvent::Ready {
            file: upload.name.clone(),
            chunks: chunk_count,
        });
        Ok((key, retriever))
    }
}
