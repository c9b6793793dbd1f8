//! `docgpt ingest <FILE> [--dry-run]`.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;

use docgpt_core::chunk::TokenCounter;

use crate::config::Config;
use crate::embedding::create_embedder;
use crate::ingest::{ingest_upload, UploadedFile};
use crate::pipeline::DocumentPipeline;
use crate::progress::ProgressReporter;
use crate::tokens::TiktokenCounter;

/// Persist and chunk `file`; unless `dry_run`, also embed it into the cache.
///
/// A dry run touches neither the network nor the credential.
pub async fn run_ingest(
    config: &Config,
    api_key: Option<String>,
    progress: Box<dyn ProgressReporter>,
    file: &Path,
    dry_run: bool,
) -> Result<()> {
    let upload = UploadedFile::from_path(file).await?;
    let counter: Arc<dyn TokenCounter> = Arc::new(TiktokenCounter::new()?);

    if dry_run {
        let doc = ingest_upload(config, &upload, counter.clone(), progress.as_ref()).await?;
        let tokens: Vec<usize> = doc.chunks.iter().map(|c| counter.count(&c.text)).collect();
        let max_tokens = tokens.iter().copied().max().unwrap_or(0);
        println!("ingest {} (dry-run)", doc.name);
        println!("  format: {}", doc.format.as_str());
        println!("  stored: {}", doc.path.display());
        println!("  text bytes: {}", doc.text_len);
        println!("  chunks: {}", doc.chunks.len());
        println!("  largest chunk: {} tokens", max_tokens);
        return Ok(());
    }

    let embedder = create_embedder(&config.embedding, api_key)?;
    let mut pipeline = DocumentPipeline::new(config.clone(), embedder, counter, progress);
    let (key, retriever) = pipeline.embed_file(&upload).await?;

    println!("ingest {}", upload.name);
    println!("  key: {}", key.as_str());
    println!("  chunks: {}", retriever.indexed_chunks());
    println!("ok");
    Ok(())
}
