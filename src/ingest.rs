//! Upload ingestion: persist → extract → chunk.
//!
//! An upload is copied verbatim into `<cache_dir>/files/<name>`, its text is
//! extracted according to the extension, and the text is split into
//! overlapping chunks. Failures are returned to the caller without retry.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use sha2::{Digest, Sha256};

use docgpt_core::chunk::{chunk_text, TokenCounter};
use docgpt_core::models::Chunk;

use crate::config::Config;
use crate::extract::{extract_text, DocumentFormat, ExtractError};
use crate::progress::{EmbedProgressEvent, ProgressReporter};

/// Content address of an upload: `sha256(name ‖ 0x00 ‖ bytes)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileKey(String);

impl FileKey {
    pub fn of(name: &str, bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(name.as_bytes());
        hasher.update([0u8]);
        hasher.update(bytes);
        FileKey(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for FileKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0[..12])
    }
}

/// A file handed to the application: its name and raw bytes.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }

    /// Read a file from disk, keeping only its final path component as the name.
    pub async fn from_path(path: &Path) -> Result<Self> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| anyhow::anyhow!("Invalid file path: {}", path.display()))?
            .to_string();
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Ok(Self::new(name, bytes))
    }

    pub fn key(&self) -> FileKey {
        FileKey::of(&self.name, &self.bytes)
    }
}

/// Result of ingesting one upload.
#[derive(Debug, Clone)]
pub struct IngestedDocument {
    pub key: FileKey,
    pub name: String,
    pub format: DocumentFormat,
    /// Where the upload was persisted.
    pub path: PathBuf,
    /// Byte length of the extracted text.
    pub text_len: usize,
    pub chunks: Vec<Chunk>,
}

/// Reduce an upload name to a single safe path component.
///
/// Keeps alphanumerics in any script, `.`, `-` and `_`. Path separators,
/// control and reserved characters become `_`, and a rewritten name gets a
/// short hash of the original so distinct uploads never share a name.
pub fn safe_file_name(name: &str) -> Result<String> {
    let base = Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("");
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        bail!("Invalid upload file name: {:?}", name);
    }
    if cleaned == base {
        return Ok(cleaned);
    }

    let tag = &hex::encode(Sha256::digest(base.as_bytes()))[..8];
    Ok(match cleaned.rfind('.') {
        Some(dot) if dot > 0 => format!("{}-{}{}", &cleaned[..dot], tag, &cleaned[dot..]),
        _ => format!("{}-{}", cleaned, tag),
    })
}

/// Write the upload's bytes verbatim under `files_dir`, creating it if needed.
pub async fn persist_upload(files_dir: &Path, upload: &UploadedFile) -> Result<PathBuf> {
    tokio::fs::create_dir_all(files_dir)
        .await
        .with_context(|| format!("Failed to create {}", files_dir.display()))?;
    let path = files_dir.join(safe_file_name(&upload.name)?);
    tokio::fs::write(&path, &upload.bytes)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}

/// Persist, extract, and chunk an upload.
///
/// # Errors
///
/// - [`ExtractError::UnsupportedFormat`] for anything but `.txt`, `.pdf`,
///   `.docx` (checked before anything is written).
/// - [`ExtractError::Pdf`] / [`ExtractError::Ooxml`] when parsing fails.
/// - [`ExtractError::NoText`] when the document has no text to index.
pub async fn ingest_upload(
    config: &Config,
    upload: &UploadedFile,
    counter: Arc<dyn TokenCounter>,
    progress: &dyn ProgressReporter,
) -> Result<IngestedDocument> {
    let format = DocumentFormat::from_file_name(&upload.name)?;
    let key = upload.key();

    progress.report(EmbedProgressEvent::Extracting {
        file: upload.name.clone(),
    });
    let path = persist_upload(&config.cache.files_dir(), upload).await?;

    let bytes = upload.bytes.clone();
    let name = upload.name.clone();
    let options = config.chunking.options();
    let document_id = key.as_str().to_string();
    let (text_len, chunks) = tokio::task::spawn_blocking(move || -> Result<_, ExtractError> {
        let text = extract_text(&bytes, format)?;
        let chunks = chunk_text(&document_id, &text, &options, counter.as_ref());
        if chunks.is_empty() {
            return Err(ExtractError::NoText(name));
        }
        Ok((text.len(), chunks))
    })
    .await
    .context("extraction task panicked")??;

    tracing::info!(
        file = %upload.name,
        key = %key,
        format = format.as_str(),
        text_len,
        chunks = chunks.len(),
        "ingested upload"
    );
    progress.report(EmbedProgressEvent::Chunked {
        file: upload.name.clone(),
        chunks: chunks.len() as u64,
    });

    Ok(IngestedDocument {
        key,
        name: upload.name.clone(),
        format,
        path,
        text_len,
        chunks,
    })
}
