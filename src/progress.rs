//! Ingestion and embedding progress reporting.
//!
//! Embedding a large document can take a while, so the pipeline reports
//! what it is doing: extracting, chunking, how many chunks were served from
//! the cache, and how many are left to embed. Progress is emitted on
//! **stderr** so stdout stays reserved for answers.

use std::io::Write;

/// A single progress event for the ingestion pipeline.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EmbedProgressEvent {
    /// Reading and parsing the uploaded file.
    Extracting { file: String },
    /// Text split into `chunks` chunks.
    Chunked { file: String, chunks: u64 },
    /// `n` of `total` uncached chunks embedded; `cached` came from disk.
    Embedding {
        file: String,
        n: u64,
        total: u64,
        cached: u64,
    },
    /// Retriever ready.
    Ready { file: String, chunks: u64 },
    /// The file was already indexed in this process.
    Reused { file: String },
}

/// Reports ingestion progress. Implementations write to stderr (human or JSON).
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: EmbedProgressEvent);
}

/// Human-friendly progress on stderr: "embedding report.pdf  12 / 40 chunks (8 cached)".
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: EmbedProgressEvent) {
        let line = match &event {
            EmbedProgressEvent::Extracting { file } => format!("reading {}...\n", file),
            EmbedProgressEvent::Chunked { file, chunks } => {
                format!("split {}  {} chunks\n", file, format_number(*chunks))
            }
            EmbedProgressEvent::Embedding {
                file,
                n,
                total,
                cached,
            } => format!(
                "embedding {}  {} / {} chunks ({} cached)\n",
                file,
                format_number(*n),
                format_number(*total),
                format_number(*cached)
            ),
            EmbedProgressEvent::Ready { file, chunks } => {
                format!("indexed {}  {} chunks\n", file, format_number(*chunks))
            }
            EmbedProgressEvent::Reused { file } => format!("{} already indexed\n", file),
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, event: EmbedProgressEvent) {
        let obj = event_json(&event);
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

fn event_json(event: &EmbedProgressEvent) -> serde_json::Value {
    match event {
        EmbedProgressEvent::Extracting { file } => serde_json::json!({
            "event": "progress",
            "file": file,
            "phase": "extracting"
        }),
        EmbedProgressEvent::Chunked { file, chunks } => serde_json::json!({
            "event": "progress",
            "file": file,
            "phase": "chunked",
            "chunks": chunks
        }),
        EmbedProgressEvent::Embedding {
            file,
            n,
            total,
            cached,
        } => serde_json::json!({
            "event": "progress",
            "file": file,
            "phase": "embedding",
            "n": n,
            "total": total,
            "cached": cached
        }),
        EmbedProgressEvent::Ready { file, chunks } => serde_json::json!({
            "event": "progress",
            "file": file,
            "phase": "ready",
            "chunks": chunks
        }),
        EmbedProgressEvent::Reused { file } => serde_json::json!({
            "event": "progress",
            "file": file,
            "phase": "reused"
        }),
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: EmbedProgressEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
