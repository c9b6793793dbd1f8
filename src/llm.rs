//! Streaming chat backends.
//!
//! A [`ChatBackend`] turns a [`ChatPrompt`] into a lazy [`TokenStream`] of
//! content deltas. Two wire formats are supported:
//! - OpenAI-compatible `POST {base_url}/v1/chat/completions` (SSE `data:` lines)
//! - Ollama `POST {url}/api/chat` (newline-delimited JSON)
//!
//! Connection and HTTP status failures surface as [`RemoteError`] from
//! [`ChatBackend::stream`]; failures after the stream opened surface as
//! stream items. A response that ends before the backend's completion
//! marker (`data: [DONE]`, `"done": true`) is a network failure, not an
//! answer. Nothing here retries.

use std::pin::Pin;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use futures::stream::{Stream, StreamExt};
use serde::{Deserialize, Serialize};

use docgpt_core::prompt::ChatPrompt;

use crate::config::LlmConfig;
use crate::remote::RemoteError;

/// Content deltas of one completion, in arrival order.
///
/// The stream ends only once the backend signalled completion; a truncated
/// response yields an error item instead.
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

const OLLAMA_DEFAULT_URL: &str = "http://localhost:11434";

/// One parsed line of a completion response.
#[derive(Debug, PartialEq, Eq)]
enum StreamEvent {
    Delta(String),
    Done,
}

#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Model identifier sent with each request.
    fn model_name(&self) -> &str;

    /// Open a completion stream for `prompt`.
    async fn stream(&self, prompt: &ChatPrompt) -> Result<TokenStream>;
}

#[derive(Serialize, Deserialize)]
struct StreamMessage {
    role: String,
    content: String,
}

fn prompt_messages(prompt: &ChatPrompt) -> Vec<StreamMessage> {
    vec![
        StreamMessage {
            role: "system".to_string(),
            content: prompt.system.clone(),
        },
        StreamMessage {
            role: "user".to_string(),
            content: prompt.human.clone(),
        },
    ]
}

/// Fail with a typed [`RemoteError`] unless the response is a success.
async fn check_status(service: &str, resp: reqwest::Response) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(RemoteError::from_status(service, status, body).into())
}

// ─── OpenAI ──────────────────────────────────────────────

#[derive(Serialize)]
struct OpenAiStreamRequest<'a> {
    model: &'a str,
    messages: Vec<StreamMessage>,
    temperature: f32,
    stream: bool,
}

#[derive(Deserialize)]
struct OpenAiStreamChunk {
    choices: Vec<OpenAiStreamChoice>,
}

#[derive(Deserialize)]
struct OpenAiStreamChoice {
    delta: OpenAiStreamDelta,
}

#[derive(Deserialize)]
struct OpenAiStreamDelta {
    content: Option<String>,
}

pub struct OpenAiChat {
    client: reqwest::Client,
    api_key: Option<String>,
    model: String,
    temperature: f32,
    endpoint: String,
}

impl OpenAiChat {
    pub fn new(config: &LlmConfig, api_key: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            model: config.model.clone(),
            temperature: config.temperature,
            endpoint: format!(
                "{}/v1/chat/completions",
                config.base_url.trim_end_matches('/')
            ),
        })
    }
}

#[async_trait]
impl ChatBackend for OpenAiChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn stream(&self, prompt: &ChatPrompt) -> Result<TokenStream> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| RemoteError::missing_key("OpenAI chat"))?;

        let req = OpenAiStreamRequest {
            model: &self.model,
            messages: prompt_messages(prompt),
            temperature: self.temperature,
            stream: true,
        };

        let resp = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", api_key.trim()))
            .json(&req)
            .send()
            .await
            .map_err(|e| RemoteError::Network(format!("OpenAI chat unreachable: {}", e)))?;
        let resp = check_status("OpenAI chat", resp).await?;

        let events = stream_lines(resp.bytes_stream()).filter_map(|line| async move {
            match line {
                Ok(line) => parse_openai_line(&line),
                Err(e) => Some(Err(e)),
            }
        });
        Ok(until_done("OpenAI chat", events))
    }
}

/// Parse one SSE line. `None` for blank lines, non-data fields, and
/// role-only deltas.
fn parse_openai_line(line: &str) -> Option<Result<StreamEvent>> {
    let line = line.trim();
    let data = line.strip_prefix("data:")?.trim();
    if data == "[DONE]" {
        return Some(Ok(StreamEvent::Done));
    }
    if data.is_empty() {
        return None;
    }

    match serde_json::from_str::<OpenAiStreamChunk>(data) {
        Ok(chunk) => {
            let content = chunk
                .choices
                .into_iter()
                .next()
                .and_then(|c| c.delta.content)
                .unwrap_or_default();
            if content.is_empty() {
                None
            } else {
                Some(Ok(StreamEvent::Delta(content)))
            }
        }
        Err(e) => Some(Err(anyhow::anyhow!("Failed to parse OpenAI chunk: {}", e))),
    }
}

// ─── Ollama ──────────────────────────────────────────────

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
}

#[derive(Serialize)]
struct OllamaStreamRequest<'a> {
    model: &'a str,
    messages: Vec<StreamMessage>,
    options: OllamaOptions,
    stream: bool,
}

#[derive(Deserialize)]
struct OllamaStreamChunk {
    message: Option<StreamMessage>,
    #[serde(default)]
    done: bool,
    error: Option<String>,
}

pub struct OllamaChat {
    client: reqwest::Client,
    model: String,
    temperature: f32,
    endpoint: String,
}

impl OllamaChat {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let url = config.url.as_deref().unwrap_or(OLLAMA_DEFAULT_URL);
        Ok(Self {
            client,
            model: config.model.clone(),
            temperature: config.temperature,
            endpoint: format!("{}/api/chat", url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl ChatBackend for OllamaChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn stream(&self, prompt: &ChatPrompt) -> Result<TokenStream> {
        let req = OllamaStreamRequest {
            model: &self.model,
            messages: prompt_messages(prompt),
            options: OllamaOptions {
                temperature: self.temperature,
            },
            stream: true,
        };

        let resp = self
            .client
            .post(&self.endpoint)
            .json(&req)
            .send()
            .await
            .map_err(|e| RemoteError::Network(format!("Ollama chat unreachable: {}", e)))?;
        let resp = check_status("Ollama chat", resp).await?;

        let events = stream_lines(resp.bytes_stream()).filter_map(|line| async move {
            match line {
                Ok(line) => parse_ollama_line(&line),
                Err(e) => Some(Err(e)),
            }
        });
        Ok(until_done("Ollama chat", events))
    }
}

/// Parse one NDJSON line. `None` for blank lines and empty deltas.
fn parse_ollama_line(line: &str) -> Option<Result<StreamEvent>> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    match serde_json::from_str::<OllamaStreamChunk>(line) {
        Ok(chunk) => {
            if let Some(err) = chunk.error {
                return Some(Err(anyhow::anyhow!("Ollama stream error: {}", err)));
            }
            if chunk.done {
                return Some(Ok(StreamEvent::Done));
            }
            let content = chunk.message.map(|m| m.content).unwrap_or_default();
            if content.is_empty() {
                None
            } else {
                Some(Ok(StreamEvent::Delta(content)))
            }
        }
        Err(e) => Some(Err(anyhow::anyhow!("Failed to parse Ollama chunk: {}", e))),
    }
}

// ─── Line buffering ──────────────────────────────────────

/// Re-split a byte stream into non-blank lines. Bytes are buffered until a
/// newline so multi-byte characters split across reads decode intact.
fn stream_lines<S>(byte_stream: S) -> impl Stream<Item = Result<String>> + Send
where
    S: Stream<Item = reqwest::Result<bytes::Bytes>> + Send + 'static,
{
    futures::stream::unfold(
        (Box::pin(byte_stream), Vec::<u8>::new(), false),
        |(mut stream, mut buffer, finished)| async move {
            if finished {
                return None;
            }
            loop {
                if let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
                    let rest = buffer.split_off(pos + 1);
                    let line = String::from_utf8_lossy(&buffer[..pos]).into_owned();
                    buffer = rest;
                    if !line.trim().is_empty() {
                        return Some((Ok(line), (stream, buffer, false)));
                    }
                    continue;
                }

                match stream.next().await {
                    Some(Ok(bytes)) => buffer.extend_from_slice(&bytes),
                    Some(Err(e)) => {
                        let err = RemoteError::Network(format!("stream read error: {}", e));
                        return Some((Err(err.into()), (stream, buffer, true)));
                    }
                    None => {
                        let remaining = String::from_utf8_lossy(&buffer).into_owned();
                        buffer.clear();
                        if remaining.trim().is_empty() {
                            return None;
                        }
                        return Some((Ok(remaining), (stream, buffer, true)));
                    }
                }
            }
        },
    )
}

/// Yield deltas until the completion marker. Running out of input first is
/// a [`RemoteError::Network`] failure; the first error ends the stream.
fn until_done<S>(service: &'static str, events: S) -> TokenStream
where
    S: Stream<Item = Result<StreamEvent>> + Send + 'static,
{
    let deltas = futures::stream::unfold(
        (Box::pin(events), false),
        move |(mut events, finished)| async move {
            if finished {
                return None;
            }
            match events.next().await {
                Some(Ok(StreamEvent::Delta(text))) => Some((Ok(text), (events, false))),
                Some(Ok(StreamEvent::Done)) => None,
                Some(Err(e)) => Some((Err(e), (events, true))),
                None => {
                    let err = RemoteError::Network(format!(
                        "{} stream ended before completion",
                        service
                    ));
                    Some((Err(err.into()), (events, true)))
                }
            }
        },
    );
    Box::pin(deltas)
}

/// Create the [`ChatBackend`] named by `config.provider`.
pub fn create_chat_backend(
    config: &LlmConfig,
    api_key: Option<String>,
) -> Result<Box<dyn ChatBackend>> {
    match config.provider.as_str() {
        "openai" => Ok(Box::new(OpenAiChat::new(config, api_key)?)),
        "ollama" => Ok(Box::new(OllamaChat::new(config)?)),
        other => bail!("Unsupported LLM provider for chat: {}", other),
    }
}
