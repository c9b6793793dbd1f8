//! # DocumentGPT CLI (`docgpt`)
//!
//! Chat with a document from the terminal.
//!
//! ## Usage
//!
//! ```bash
//! docgpt --config ./config/docgpt.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docgpt chat <file>` | Index a document and start an interactive chat |
//! | `docgpt ask <file> "<question>"` | Answer one question and exit |
//! | `docgpt ingest <file>` | Persist, chunk and embed a document |
//! | `docgpt cache stats` | Show what the cache directory holds |
//! | `docgpt cache clear` | Delete cached uploads and embeddings |
//!
//! Diagnostics go to stderr and are filtered with `RUST_LOG`
//! (default `warn`).

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use docgpt::progress::ProgressMode;
use docgpt::{cache_cmd, chat, config, ingest_cmd};

/// DocumentGPT: ask questions about a PDF, Word, or text document.
#[derive(Parser)]
#[command(
    name = "docgpt",
    about = "Ask questions about a PDF, Word, or text document",
    version,
    long_about = "DocumentGPT splits a document into overlapping chunks, embeds them \
    (with an on-disk cache), retrieves the chunks most relevant to each question, and \
    streams an answer from a chat model that is told to use only that context."
)]
struct Cli {
    /// Path to configuration file (TOML). Optional; defaults apply when missing.
    #[arg(long, global = true, default_value = "./config/docgpt.toml")]
    config: PathBuf,

    /// API key for the OpenAI provider.
    #[arg(long, global = true, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Progress output on stderr. Defaults to human when stderr is a TTY.
    #[arg(long, global = true, value_enum)]
    progress: Option<ProgressMode>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index a document and chat about it.
    ///
    /// Type questions at the prompt; answers stream as they are generated.
    /// Ctrl-C cancels the answer in progress.
    Chat {
        /// A .pdf, .txt or .docx file.
        file: PathBuf,
    },

    /// Answer a single question about a document.
    Ask {
        /// A .pdf, .txt or .docx file.
        file: PathBuf,
        /// The question, passed to the model verbatim.
        question: String,
    },

    /// Persist, chunk and embed a document without chatting.
    Ingest {
        /// A .pdf, .txt or .docx file.
        file: PathBuf,

        /// Only extract and chunk; no embedding calls, no API key needed.
        #[arg(long)]
        dry_run: bool,
    },

    /// Inspect or clear the on-disk cache.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Show cached files and embedding counts.
    Stats,

    /// Delete cached uploads and embeddings.
    Clear {
        /// Only clear data for this uploaded file name.
        #[arg(long)]
        file: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;
    let progress = cli
        .progress
        .unwrap_or_else(ProgressMode::default_for_tty)
        .reporter();

    match cli.command {
        Commands::Chat { file } => {
            chat::run_chat(cfg, cli.api_key, progress, &file).await?;
        }
        Commands::Ask { file, question } => {
            chat::run_ask(cfg, cli.api_key, progress, &file, &question).await?;
        }
        Commands::Ingest { file, dry_run } => {
            ingest_cmd::run_ingest(&cfg, cli.api_key, progress, &file, dry_run).await?;
        }
        Commands::Cache { action } => match action {
            CacheAction::Stats => cache_cmd::run_stats(&cfg)?,
            CacheAction::Clear { file } => cache_cmd::run_clear(&cfg, file.as_deref())?,
        },
    }

    Ok(())
}
