//! Persistent, content-addressed cache in front of an [`Embedder`].
//!
//! Each uploaded file gets its own namespace directory under
//! `<cache_dir>/embeddings/`. Inside it, one file per chunk holds the
//! chunk's vector as little-endian `f32` bytes, named by
//! `sha256(model ‖ 0x00 ‖ chunk text)`. Re-embedding the same file only
//! calls the remote service for chunks that are not already on disk.
//!
//! Entries are never evicted automatically; `docgpt cache clear` removes
//! them. An entry that fails to decode is treated as a miss and rewritten.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sha2::{Digest, Sha256};

use docgpt_core::embedding::{blob_to_vec, vec_to_blob, Embedder};

use crate::progress::{EmbedProgressEvent, NoProgress, ProgressReporter};

/// Key-value byte store backed by one file per key.
#[derive(Debug, Clone)]
pub struct LocalFileStore {
    root: PathBuf,
}

impl LocalFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Read the values for `keys`; `None` for keys with no entry.
    pub async fn mget(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>> {
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            let path = self.root.join(key);
            match tokio::fs::read(&path).await {
                Ok(bytes) => out.push(Some(bytes)),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => out.push(None),
                Err(e) => {
                    return Err(e)
                        .with_context(|| format!("Failed to read cache entry {}", path.display()))
                }
            }
        }
        Ok(out)
    }

    /// Write every `(key, value)` pair, creating the store directory if needed.
    pub async fn mset(&self, entries: &[(String, Vec<u8>)]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        tokio::fs::create_dir_all(&self.root)
            .await
            .with_context(|| format!("Failed to create cache dir {}", self.root.display()))?;
        for (key, value) in entries {
            let path = self.root.join(key);
            tokio::fs::write(&path, value)
                .await
                .with_context(|| format!("Failed to write cache entry {}", path.display()))?;
        }
        Ok(())
    }
}

/// Hit/miss counters since construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

/// Wraps an embedder with a [`LocalFileStore`].
///
/// Document embeddings are cached; [`embed_query`](Embedder::embed_query)
/// bypasses the cache and goes straight to the wrapped embedder.
pub struct CacheBackedEmbedder {
    inner: Arc<dyn Embedder>,
    store: LocalFileStore,
    batch_size: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CacheBackedEmbedder {
    pub fn new(inner: Arc<dyn Embedder>, store: LocalFileStore, batch_size: usize) -> Self {
        Self {
            inner,
            store,
            batch_size: batch_size.max(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    /// Cache key for `text` under the wrapped embedder's model.
    pub fn cache_key(&self, text: &str) -> String {
        cache_key(self.inner.model_name(), text)
    }

    /// Embed documents, reporting progress as batches complete.
    pub async fn embed_with_progress(
        &self,
        texts: &[String],
        label: &str,
        progress: &dyn ProgressReporter,
    ) -> Result<Vec<Vec<f32>>> {
        let keys: Vec<String> = texts.iter().map(|t| self.cache_key(t)).collect();
        let stored = self.store.mget(&keys).await?;

        let mut vectors: Vec<Option<Vec<f32>>> = Vec::with_capacity(texts.len());
        let mut missing: Vec<usize> = Vec::new();
        for (i, entry) in stored.into_iter().enumerate() {
            match entry.map(|bytes| blob_to_vec(&bytes)) {
                Some(Some(vec)) => vectors.push(Some(vec)),
                Some(None) => {
                    tracing::warn!(key = %keys[i], "corrupt embedding cache entry, recomputing");
                    vectors.push(None);
                    missing.push(i);
                }
                None => {
                    vectors.push(None);
                    missing.push(i);
                }
            }
        }

        let hits = (texts.len() - missing.len()) as u64;
        self.hits.fetch_add(hits, Ordering::Relaxed);
        self.misses.fetch_add(missing.len() as u64, Ordering::Relaxed);
        tracing::debug!(
            namespace = %self.store.root().display(),
            hits,
            misses = missing.len(),
            "embedding cache lookup"
        );

        let total = missing.len() as u64;
        let mut done = 0u64;
        progress.report(EmbedProgressEvent::Embedding {
            file: label.to_string(),
            n: done,
            total,
            cached: hits,
        });

        for batch in missing.chunks(self.batch_size) {
            let batch_texts: Vec<String> = batch.iter().map(|&i| texts[i].clone()).collect();
            let embedded = self.inner.embed_documents(&batch_texts).await?;
            if embedded.len() != batch.len() {
                anyhow::bail!(
                    "embedder returned {} vectors for {} texts",
                    embedded.len(),
                    batch.len()
                );
            }

            let entries: Vec<(String, Vec<u8>)> = batch
                .iter()
                .zip(embedded.iter())
                .map(|(&i, v)| (keys[i].clone(), vec_to_blob(v)))
                .collect();
            self.store.mset(&entries).await?;

            for (&i, v) in batch.iter().zip(embedded) {
                vectors[i] = Some(v);
            }

            done += batch.len() as u64;
            progress.report(EmbedProgressEvent::Embedding {
                file: label.to_string(),
                n: done,
                total,
                cached: hits,
            });
        }

        vectors
            .into_iter()
            .map(|v| v.ok_or_else(|| anyhow::anyhow!("embedding missing after cache fill")))
            .collect()
    }
}

#[async_trait]
impl Embedder for CacheBackedEmbedder {
    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let label = self.store.root().display().to_string();
        self.embed_with_progress(texts, &label, &NoProgress).await
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.inner.embed_query(text).await
    }
}

/// `sha256(model ‖ 0x00 ‖ text)` as lowercase hex.
pub fn cache_key(model: &str, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(model.as_bytes());
    hasher.update([0u8]);
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}
