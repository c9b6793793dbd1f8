//! `docgpt cache stats` and `docgpt cache clear`.
//!
//! The cache is only ever removed explicitly through these commands.

use std::path::Path;

use anyhow::{Context, Result};

use crate::config::Config;
use crate::ingest::safe_file_name;

/// Per-namespace (per uploaded file) embedding counts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceStats {
    pub name: String,
    pub entries: u64,
    pub bytes: u64,
}

/// Summary of what the cache directory holds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheSummary {
    pub files: u64,
    pub file_bytes: u64,
    pub namespaces: Vec<NamespaceStats>,
}

impl CacheSummary {
    pub fn total_entries(&self) -> u64 {
        self.namespaces.iter().map(|n| n.entries).sum()
    }

    pub fn total_embedding_bytes(&self) -> u64 {
        self.namespaces.iter().map(|n| n.bytes).sum()
    }
}

/// Count regular files directly under `dir`. A missing directory is empty.
fn count_files(dir: &Path) -> Result<(u64, u64)> {
    if !dir.exists() {
        return Ok((0, 0));
    }
    let mut count = 0;
    let mut bytes = 0;
    for entry in std::fs::read_dir(dir).with_context(|| format!("Failed to read {}", dir.display()))? {
        let meta = entry?.metadata()?;
        if meta.is_file() {
            count += 1;
            bytes += meta.len();
        }
    }
    Ok((count, bytes))
}

pub fn summarize(config: &Config) -> Result<CacheSummary> {
    let (files, file_bytes) = count_files(&config.cache.files_dir())?;

    let mut namespaces = Vec::new();
    let embeddings = config.cache.embeddings_dir();
    if embeddings.exists() {
        for entry in std::fs::read_dir(&embeddings)
            .with_context(|| format!("Failed to read {}", embeddings.display()))?
        {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let (entries, bytes) = count_files(&entry.path())?;
            namespaces.push(NamespaceStats {
                name: entry.file_name().to_string_lossy().into_owned(),
                entries,
                bytes,
            });
        }
    }
    namespaces.sort_by(|a, b| a.name.cmp(&b.name));

    Ok(CacheSummary {
        files,
        file_bytes,
        namespaces,
    })
}

pub fn run_stats(config: &Config) -> Result<()> {
    let summary = summarize(config)?;

    println!("DocumentGPT Cache");
    println!("=================");
    println!();
    println!("  Directory:   {}", config.cache.dir.display());
    println!(
        "  Files:       {} ({})",
        summary.files,
        format_bytes(summary.file_bytes)
    );
    println!(
        "  Embeddings:  {} ({})",
        summary.total_entries(),
        format_bytes(summary.total_embedding_bytes())
    );

    if !summary.namespaces.is_empty() {
        println!();
        println!("  {:<40} {:>10} {:>10}", "FILE", "VECTORS", "SIZE");
        println!("  {}", "-".repeat(62));
        for ns in &summary.namespaces {
            println!(
                "  {:<40} {:>10} {:>10}",
                ns.name,
                ns.entries,
                format_bytes(ns.bytes)
            );
        }
    }
    println!();
    Ok(())
}

/// Remove cached uploads and embeddings, either everything or one file's.
///
/// Returns the number of paths removed.
pub fn clear(config: &Config, file: Option<&str>) -> Result<usize> {
    let targets = match file {
        Some(name) => {
            let safe = safe_file_name(name)?;
            vec![
                config.cache.files_dir().join(&safe),
                config.cache.embeddings_dir().join(&safe),
            ]
        }
        None => vec![config.cache.files_dir(), config.cache.embeddings_dir()],
    };

    let mut removed = 0;
    for path in targets {
        if path.is_dir() {
            std::fs::remove_dir_all(&path)
                .with_context(|| format!("Failed to remove {}", path.display()))?;
        } else if path.is_file() {
            std::fs::remove_file(&path)
                .with_context(|| format!("Failed to remove {}", path.display()))?;
        } else {
            continue;
        }
        tracing::info!(path = %path.display(), "removed from cache");
        removed += 1;
    }
    Ok(removed)
}

pub fn run_clear(config: &Config, file: Option<&str>) -> Result<()> {
    let removed = clear(config, file)?;
    match (file, removed) {
        (_, 0) => println!("Nothing to clear."),
        (Some(name), _) => println!("Cleared cached data for {}.", name),
        (None, _) => println!("Cleared {}.", config.cache.dir.display()),
    }
    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
