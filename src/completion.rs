//! Driving a completion stream to a settled answer.
//!
//! [`run_completion`] consumes a [`TokenStream`], keeps the accumulated
//! answer in a buffer, and forwards lifecycle hooks to a [`StreamHandler`].
//! Display surfaces receive the whole buffer on every token and replace
//! what they showed before. A [`TokenStream`](crate::llm::TokenStream) only
//! ends once the backend signalled completion, so its end settles the answer.
//!
//! ```text
//! Idle ──stream opened──▶ Streaming ──backend done──▶ Settled
//!   │                        │
//!   └──── error / cancel ────┴──▶ (on_error, nothing committed)
//! ```

use anyhow::Result;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use docgpt_core::prompt::ChatPrompt;

use crate::llm::ChatBackend;

/// Lifecycle of one answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    Streaming,
    Settled,
}

/// Hooks invoked while an answer streams in.
pub trait StreamHandler: Send {
    fn on_start(&mut self) {}

    /// `buffer` is the full answer so far, not just the new token.
    fn on_token(&mut self, buffer: &str);

    fn on_end(&mut self, answer: &str);

    fn on_error(&mut self, _error: &anyhow::Error) {}
}

/// The in-flight completion was cancelled by the user.
#[derive(Debug)]
pub struct Cancelled;

impl std::fmt::Display for Cancelled {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("answer cancelled")
    }
}

impl std::error::Error for Cancelled {}

/// Accumulates one answer and enforces the state transitions.
#[derive(Debug)]
pub struct AnswerBuffer {
    state: StreamState,
    text: String,
}

impl Default for AnswerBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl AnswerBuffer {
    pub fn new() -> Self {
        Self {
            state: StreamState::Idle,
            text: String::new(),
        }
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn start(&mut self) {
        debug_assert_eq!(self.state, StreamState::Idle);
        self.state = StreamState::Streaming;
    }

    pub fn push(&mut self, token: &str) {
        debug_assert_eq!(self.state, StreamState::Streaming);
        self.text.push_str(token);
    }

    /// Settle and hand back the final answer.
    pub fn settle(mut self) -> String {
        self.state = StreamState::Settled;
        self.text
    }
}

/// Stream an answer for `prompt`, returning the settled text.
///
/// Any failure, including cancellation through `cancel`, is reported to
/// `handler.on_error` and returned; `on_end` is only called on success.
pub async fn run_completion(
    backend: &dyn ChatBackend,
    prompt: &ChatPrompt,
    handler: &mut dyn StreamHandler,
    cancel: &CancellationToken,
) -> Result<String> {
    match drive(backend, prompt, handler, cancel).await {
        Ok(answer) => {
            handler.on_end(&answer);
            Ok(answer)
        }
        Err(e) => {
            tracing::debug!(error = %e, "completion failed");
            handler.on_error(&e);
            Err(e)
        }
    }
}

async fn drive(
    backend: &dyn ChatBackend,
    prompt: &ChatPrompt,
    handler: &mut dyn StreamHandler,
    cancel: &CancellationToken,
) -> Result<String> {
    let mut answer = AnswerBuffer::new();

    let mut stream = tokio::select! {
        _ = cancel.cancelled() => return Err(Cancelled.into()),
        opened = backend.stream(prompt) => opened?,
    };
    answer.start();
    handler.on_start();

    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => return Err(Cancelled.into()),
            next = stream.next() => next,
        };
        match next {
            Some(Ok(token)) => {
                answer.push(&token);
                handler.on_token(answer.text());
            }
            Some(Err(e)) => return Err(e),
            None => break,
        }
    }

    tracing::debug!(
        model = backend.model_name(),
        chars = answer.text().len(),
        "completion settled"
    );
    Ok(answer.settle())
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::llm::TokenStream;
    use async_trait::async_trait;

    /// Backend that replays a fixed script of stream items.
    pub struct ScriptedBackend {
        pub items: Vec<std::result::Result<&'static str, &'static str>>,
        pub fail_open: Option<fn() -> anyhow::Error>,
        pub hang_after_items: bool,
    }

    impl ScriptedBackend {
        pub fn tokens(tokens: &[&'static str]) -> Self {
            Self {
                items: tokens.iter().map(|t| Ok(*t)).collect(),
                fail_open: None,
                hang_after_items: false,
            }
        }
    }

    #[async_trait]
    impl ChatBackend for ScriptedBackend {
        fn model_name(&self) -> &str {
            "scripted"
        }

        async fn stream(&self, _prompt: &ChatPrompt) -> Result<TokenStream> {
            if let Some(fail) = self.fail_open {
                return Err(fail());
            }
            let items: Vec<Result<String>> = self
                .items
                .iter()
                .map(|i| match i {
                    Ok(t) => Ok(t.to_string()),
                    Err(e) => Err(anyhow::anyhow!(*e)),
                })
                .collect();
            let head = futures::stream::iter(items);
            if self.hang_after_items {
                Ok(Box::pin(head.chain(futures::stream::pending())))
            } else {
                Ok(Box::pin(head))
            }
        }
    }

    /// Handler that records every hook call.
    #[derive(Default)]
    pub struct RecordingHandler {
        pub started: bool,
        pub shown: Vec<String>,
        pub ended: Option<String>,
        pub errors: Vec<String>,
    }

    impl StreamHandler for RecordingHandler {
        fn on_start(&mut self) {
            self.started = true;
        }

        fn on_token(&mut self, buffer: &str) {
            self.shown.push(buffer.to_string());
        }

        fn on_end(&mut self, answer: &str) {
            self.ended = Some(answer.to_string());
        }

        fn on_error(&mut self, error: &anyhow::Error) {
            self.errors.push(error.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{RecordingHandler, ScriptedBackend};
    use super::*;
    use crate::remote::RemoteError;

    fn missing_key() -> anyhow::Error {
        RemoteError::missing_key("test").into()
    }

    fn prompt() -> ChatPrompt {
        ChatPrompt {
            system: "system".into(),
            human: "question".into(),
        }
    }

    #[test]
    fn answer_buffer_transitions() {
        let mut buf = AnswerBuffer::new();
        assert_eq!(buf.state(), StreamState::Idle);
        buf.start();
        assert_eq!(buf.state(), StreamState::Streaming);
        buf.push("a");
        buf.push("b");
        assert_eq!(buf.text(), "ab");
        assert_eq!(buf.settle(), "ab");
    }

    #[tokio::test]
    async fn tokens_are_shown_as_growing_buffer() {
        let backend = ScriptedBackend::tokens(&["Hel", "lo", "!"]);
        let mut handler = RecordingHandler::default();
        let answer = run_completion(&backend, &prompt(), &mut handler, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(answer, "Hello!");
        assert!(handler.started);
        assert_eq!(handler.shown, vec!["Hel", "Hello", "Hello!"]);
        assert_eq!(handler.ended.as_deref(), Some("Hello!"));
        assert!(handler.errors.is_empty());
    }

    #[tokio::test]
    async fn mid_stream_error_does_not_settle() {
        let backend = ScriptedBackend {
            items: vec![Ok("partial"), Err("connection reset")],
            fail_open: None,
            hang_after_items: false,
        };
        let mut handler = RecordingHandler::default();
        let err = run_completion(&backend, &prompt(), &mut handler, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(err.to_string().contains("connection reset"));
        assert_eq!(handler.shown, vec!["partial"]);
        assert!(handler.ended.is_none());
        assert_eq!(handler.errors.len(), 1);
    }

    #[tokio::test]
    async fn open_failure_reports_error_without_start() {
        let backend = ScriptedBackend {
            items: vec![],
            fail_open: Some(missing_key),
            hang_after_items: false,
        };
        let mut handler = RecordingHandler::default();
        let err = run_completion(&backend, &prompt(), &mut handler, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(err.downcast_ref::<RemoteError>().unwrap().is_unauthorized());
        assert!(!handler.started);
        assert!(handler.shown.is_empty());
        assert_eq!(handler.errors.len(), 1);
    }

    #[tokio::test]
    async fn cancellation_stops_a_hanging_stream() {
        let backend = ScriptedBackend {
            items: vec![Ok("thinking")],
            fail_open: None,
            hang_after_items: true,
        };
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let mut handler = RecordingHandler::default();
        let err = run_completion(&backend, &prompt(), &mut handler, &cancel)
            .await
            .unwrap_err();

        assert!(err.downcast_ref::<Cancelled>().is_some());
        assert_eq!(handler.shown, vec!["thinking"]);
        assert!(handler.ended.is_none());
    }
}
