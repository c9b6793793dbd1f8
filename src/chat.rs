//! Interactive chat and one-shot questions against a document.
//!
//! [`ChatApp`] wires the pipeline, the chat backend, and the session
//! together. [`run_chat`] drives it from a line-based REPL; [`run_ask`]
//! answers a single question and exits.
//!
//! REPL commands:
//!
//! | Command | Effect |
//! |---------|--------|
//! | `/open <file>` | Index another document and switch to it |
//! | `/history` | Print the transcript |
//! | `/reset` | Clear the transcript, keep the document |
//! | `/help` | List commands |
//! | `/quit` | Exit (also Ctrl-D, or Ctrl-C at the prompt) |
//!
//! Ctrl-C while an answer is streaming or `/open` is indexing cancels that
//! step only.

use std::future::Future;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

use docgpt_core::chunk::TokenCounter;
use docgpt_core::models::Role;

use crate::completion::{Cancelled, StreamHandler};
use crate::config::Config;
use crate::embedding::create_embedder;
use crate::ingest::UploadedFile;
use crate::llm::{create_chat_backend, ChatBackend};
use crate::pipeline::DocumentPipeline;
use crate::progress::ProgressReporter;
use crate::session::{ActiveDocument, Session};
use crate::tokens::TiktokenCounter;

const READY_MESSAGE: &str = "I'm ready! Ask away!";

const HELP: &str = "\
Commands:
  /open <file>   index a .pdf, .txt or .docx file and chat about it
  /history       show this conversation
  /reset         forget this conversation, keep the document
  /help          show this help
  /quit          exit
Ctrl-C stops the answer or indexing in progress.";

/// Pipeline, backend and session for one user.
pub struct ChatApp {
    pipeline: DocumentPipeline,
    backend: Box<dyn ChatBackend>,
    session: Session,
}

impl ChatApp {
    /// Build the application from configuration.
    pub fn new(
        config: Config,
        api_key: Option<String>,
        progress: Box<dyn ProgressReporter>,
    ) -> Result<Self> {
        let embedder = create_embedder(&config.embedding, api_key.clone())?;
        let backend = create_chat_backend(&config.llm, api_key)?;
        let counter: Arc<dyn TokenCounter> = Arc::new(TiktokenCounter::new()?);
        let language = config.llm.response_language.clone();
        let pipeline = DocumentPipeline::new(config, embedder, counter, progress);
        Ok(Self::with_parts(pipeline, backend, language))
    }

    pub fn with_parts(
        pipeline: DocumentPipeline,
        backend: Box<dyn ChatBackend>,
        language: impl Into<String>,
    ) -> Self {
        Self {
            pipeline,
            backend,
            session: Session::new(language),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn pipeline(&self) -> &DocumentPipeline {
        &self.pipeline
    }

    /// Index `upload` and make it the active document.
    ///
    /// On failure the previously active document, if any, stays active.
    pub async fn open_upload(&mut self, upload: &UploadedFile) -> Result<()> {
        let (key, retriever) = self.pipeline.embed_file(upload).await?;
        self.session.activate(ActiveDocument {
            key,
            name: upload.name.clone(),
            retriever,
        });
        Ok(())
    }

    pub async fn open(&mut self, path: &Path) -> Result<()> {
        let upload = UploadedFile::from_path(path).await?;
        self.open_upload(&upload).await
    }

    pub async fn ask(
        &mut self,
        question: &str,
        handler: &mut dyn StreamHandler,
        cancel: &CancellationToken,
    ) -> Result<String> {
        self.session
            .ask(question, self.backend.as_ref(), handler, cancel)
            .await
    }

    pub fn reset(&mut self) {
        self.session.reset();
    }
}

/// Prints a streaming answer to stdout.
///
/// Each update carries the full answer so far; only the part not yet on
/// screen is written.
#[derive(Default)]
pub struct TerminalDisplay {
    shown: usize,
}

impl TerminalDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    fn write(&self, text: &str) {
        let mut out = std::io::stdout().lock();
        let _ = out.write_all(text.as_bytes());
        let _ = out.flush();
    }
}

impl StreamHandler for TerminalDisplay {
    fn on_start(&mut self) {
        self.shown = 0;
    }

    fn on_token(&mut self, buffer: &str) {
        if let Some(new) = buffer.get(self.shown..) {
            self.write(new);
        }
        self.shown = buffer.len();
    }

    fn on_end(&mut self, answer: &str) {
        self.on_token(answer);
        self.write("\n");
    }

    fn on_error(&mut self, _error: &anyhow::Error) {
        if self.shown > 0 {
            self.write("\n");
        }
    }
}

/// A token cancelled by the next Ctrl-C. Abort the handle when done.
fn cancel_on_ctrl_c() -> (CancellationToken, tokio::task::JoinHandle<()>) {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trigger.cancel();
        }
    });
    (cancel, watcher)
}

/// Run `work` unless `cancel` fires first, in which case it is dropped.
async fn until_cancelled<T>(
    work: impl Future<Output = Result<T>>,
    cancel: &CancellationToken,
) -> Result<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Cancelled.into()),
        out = work => out,
    }
}

/// Ask with Ctrl-C bound to the answer's cancellation token.
async fn ask_interruptible(app: &mut ChatApp, question: &str) -> Result<String> {
    let (cancel, watcher) = cancel_on_ctrl_c();
    let mut display = TerminalDisplay::new();
    let result = app.ask(question, &mut display, &cancel).await;
    watcher.abort();
    result
}

/// `/open` with Ctrl-C abandoning the indexing; the current document stays.
async fn open_interruptible(app: &mut ChatApp, path: &Path) -> Result<()> {
    let (cancel, watcher) = cancel_on_ctrl_c();
    let result = until_cancelled(app.open(path), &cancel).await;
    watcher.abort();
    result
}

fn print_history(session: &Session) {
    let turns = session.transcript().all();
    if turns.is_empty() {
        println!("(no messages yet)");
        return;
    }
    for turn in turns {
        let who = match turn.role() {
            Role::Human => "you",
            Role::Ai => "ai",
        };
        println!(
            "[{}] {}: {}",
            turn.created_at().format("%H:%M:%S"),
            who,
            turn.message()
        );
    }
}

fn print_prompt() {
    let mut out = std::io::stdout().lock();
    let _ = out.write_all(b"> ");
    let _ = out.flush();
}

/// Interactive REPL over `file`.
pub async fn run_chat(
    config: Config,
    api_key: Option<String>,
    progress: Box<dyn ProgressReporter>,
    file: &Path,
) -> Result<()> {
    let mut app = ChatApp::new(config, api_key, progress)?;
    app.open(file).await?;

    println!("{}", READY_MESSAGE);
    println!("Type /help for commands.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print_prompt();
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            println!();
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        match input.split_once(' ').map_or((input, ""), |(c, rest)| (c, rest.trim())) {
            ("/quit" | "/exit", _) => break,
            ("/help", _) => println!("{}", HELP),
            ("/history", _) => print_history(app.session()),
            ("/reset", _) => {
                app.reset();
                println!("Conversation cleared.");
            }
            ("/open", "") => println!("Usage: /open <file>"),
            ("/open", path) => match open_interruptible(&mut app, Path::new(path)).await {
                Ok(()) => println!("{}", READY_MESSAGE),
                Err(e) if e.downcast_ref::<Cancelled>().is_some() => println!("(cancelled)"),
                Err(e) => eprintln!("Error: {:#}", e),
            },
            (cmd, _) if cmd.starts_with('/') => {
                println!("Unknown command {}. Type /help for commands.", cmd)
            }
            _ => match ask_interruptible(&mut app, input).await {
                Ok(_) => {}
                Err(e) if e.downcast_ref::<Cancelled>().is_some() => println!("(cancelled)"),
                Err(e) => eprintln!("Error: {:#}", e),
            },
        }
    }
    Ok(())
}

/// Answer one question about `file` on stdout.
pub async fn run_ask(
    config: Config,
    api_key: Option<String>,
    progress: Box<dyn ProgressReporter>,
    file: &Path,
    question: &str,
) -> Result<()> {
    let mut app = ChatApp::new(config, api_key, progress)?;
    app.open(file).await?;
    ask_interruptible(&mut app, question).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancelled_work_is_dropped() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = until_cancelled(std::future::pending::<Result<()>>(), &cancel)
            .await
            .unwrap_err();
        assert!(err.downcast_ref::<Cancelled>().is_some());
    }

    #[tokio::test]
    async fn finished_work_passes_through() {
        let cancel = CancellationToken::new();
        let out = until_cancelled(async { Ok(7) }, &cancel).await.unwrap();
        assert_eq!(out, 7);
    }

    #[test]
    fn display_tracks_what_was_shown() {
        let mut d = TerminalDisplay::new();
        d.on_start();
        d.on_token("Hel");
        assert_eq!(d.shown, 3);
        d.on_token("Hello");
        assert_eq!(d.shown, 5);
        d.on_end("Hello");
        assert_eq!(d.shown, 5);
    }

    #[test]
    fn display_survives_non_boundary_offsets() {
        let mut d = TerminalDisplay::new();
        d.on_start();
        d.on_token("\u{ac00}");
        d.shown = 1;
        d.on_token("\u{ac00}\u{ac01}");
        assert_eq!(d.shown, 6);
    }
}
