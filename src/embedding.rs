//! Remote embedding backends.
//!
//! Concrete [`Embedder`] implementations:
//! - **[`OpenAIEmbedder`]**: `POST {base_url}/v1/embeddings` with a bearer key.
//! - **[`OllamaEmbedder`]**: `POST {url}/api/embed` on a local Ollama server.
//! - **[`DisabledEmbedder`]**: always fails; used when `provider = "disabled"`.
//!
//! Use [`create_embedder`] to build one from configuration. Documents should
//! be embedded through [`CacheBackedEmbedder`](crate::embed_cache::CacheBackedEmbedder);
//! queries go to the raw embedder.
//!
//! # Retry Strategy
//!
//! Off by default (`embedding.max_retries = 0`). When enabled, only
//! transient failures are retried with exponential backoff:
//! - HTTP 429 and 5xx → retry
//! - Network errors → retry
//! - HTTP 401/403 and other 4xx → fail immediately
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;

use docgpt_core::embedding::Embedder;

use crate::config::EmbeddingConfig;
use crate::remote::RemoteError;

/// Default Ollama server URL.
const OLLAMA_DEFAULT_URL: &str = "http://localhost:11434";

// ============ Disabled ============

/// An embedder that always returns errors.
pub struct DisabledEmbedder;

#[async_trait]
impl Embedder for DisabledEmbedder {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn embed_documents(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        bail!("Embedding provider is disabled (set embedding.provider in the config)")
    }
}

// ============ OpenAI ============

/// Embedder backed by the OpenAI embeddings API.
///
/// A missing API key is reported on the first call, not at construction,
/// so commands that never embed can run without one.
pub struct OpenAIEmbedder {
    client: reqwest::Client,
    api_key: Option<String>,
    model: String,
    endpoint: String,
    max_retries: u32,
}

impl OpenAIEmbedder {
    pub fn new(config: &EmbeddingConfig, api_key: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            model: config.model.clone(),
            endpoint: format!("{}/v1/embeddings", config.base_url.trim_end_matches('/')),
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| RemoteError::missing_key("OpenAI embeddings"))?;

        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let json = send_with_retry("OpenAI embeddings", self.max_retries, || {
            self.client
                .post(&self.endpoint)
                .header("Authorization", format!("Bearer {}", api_key.trim()))
                .json(&body)
        })
        .await?;

        let embeddings = parse_openai_response(&json)?;
        check_count(&embeddings, texts.len())?;
        Ok(embeddings)
    }
}

/// Parse the OpenAI embeddings response, ordering vectors by `index`.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing data array"))?;

    let mut indexed = Vec::with_capacity(data.len());

    for (position, item) in data.iter().enumerate() {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing embedding"))?;
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(position);

        let vec = components(embedding, "OpenAI")?;

        indexed.push((index, vec));
    }

    indexed.sort_by_key(|(i, _)| *i);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

// ============ Ollama ============

/// Embedder backed by a local Ollama instance.
pub struct OllamaEmbedder {
    client: reqwest::Client,
    model: String,
    url: String,
    max_retries: u32,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| OLLAMA_DEFAULT_URL.to_string());
        Ok(Self {
            client,
            model: config.model.clone(),
            url: url.trim_end_matches('/').to_string(),
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let endpoint = format!("{}/api/embed", self.url);

        let json = send_with_retry("Ollama embeddings", self.max_retries, || {
            self.client.post(&endpoint).json(&body)
        })
        .await?;

        let embeddings = parse_ollama_response(&json)?;
        check_count(&embeddings, texts.len())?;
        Ok(embeddings)
    }
}

fn parse_ollama_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: missing embeddings array"))?;

    let mut result = Vec::with_capacity(embeddings.len());

    for embedding in embeddings {
        let values = embedding
            .as_array()
            .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: embedding is not an array"))?;
        let vec = components(values, "Ollama")?;
        result.push(vec);
    }

    Ok(result)
}

// ============ Shared ============

fn components(values: &[serde_json::Value], provider: &str) -> Result<Vec<f32>> {
    values
        .iter()
        .map(|v| {
            v.as_f64().map(|f| f as f32).ok_or_else(|| {
                anyhow::anyhow!("Invalid {} response: non-numeric embedding value {}", provider, v)
            })
        })
        .collect()
}

fn check_count(embeddings: &[Vec<f32>], expected: usize) -> Result<()> {
    if embeddings.len() != expected {
        bail!(
            "embedding response has {} vectors for {} inputs",
            embeddings.len(),
            expected
        );
    }
    Ok(())
}

/// Send a JSON request, retrying transient failures up to `max_retries` times.
async fn send_with_retry<F>(
    service: &str,
    max_retries: u32,
    mut build: F,
) -> std::result::Result<serde_json::Value, RemoteError>
where
    F: FnMut() -> reqwest::RequestBuilder,
{
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tracing::warn!(service, attempt, ?delay, "retrying embedding request");
            tokio::time::sleep(delay).await;
        }

        let err = match build().send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    return response.json().await.map_err(RemoteError::from);
                }
                let body = response.text().await.unwrap_or_default();
                RemoteError::from_status(service, status, body)
            }
            Err(e) => RemoteError::Network(format!("{} unreachable: {}", service, e)),
        };

        if !err.is_transient() {
            return Err(err);
        }
        last_err = Some(err);
    }

    Err(last_err
        .unwrap_or_else(|| RemoteError::Network(format!("{} failed after retries", service))))
}

/// Create the [`Embedder`] named by `config.provider`.
///
/// | Config Value | Embedder |
/// |-------------|----------|
/// | `"openai"` | [`OpenAIEmbedder`] |
/// | `"ollama"` | [`OllamaEmbedder`] |
/// | `"disabled"` | [`DisabledEmbedder`] |
pub fn create_embedder(
    config: &EmbeddingConfig,
    api_key: Option<String>,
) -> Result<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAIEmbedder::new(config, api_key)?)),
        "ollama" => Ok(Arc::new(OllamaEmbedder::new(config)?)),
        "disabled" => Ok(Arc::new(DisabledEmbedder)),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openai_response_is_reordered_by_index() {
        let json = serde_json::json!({
            "data": [
                {"index": 1, "embedding": [0.0, 1.0]},
                {"index": 0, "embedding": [1.0, 0.0]},
            ]
        });
        let vecs = parse_openai_response(&json).unwrap();
        assert_eq!(vecs, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn openai_response_without_data_is_error() {
        assert!(parse_openai_response(&serde_json::json!({"error": "x"})).is_err());
    }

    #[test]
    fn ollama_response_parsed() {
        let json = serde_json::json!({"embeddings": [[0.5, 0.25]]});
        assert_eq!(parse_ollama_response(&json).unwrap(), vec![vec![0.5, 0.25]]);
    }

    #[test]
    fn non_numeric_components_are_rejected() {
        let openai = serde_json::json!({
            "data": [{"index": 0, "embedding": [0.5, "oops"]}]
        });
        let err = parse_openai_response(&openai).unwrap_err();
        assert!(err.to_string().contains("Invalid OpenAI response"), "{}", err);

        let ollama = serde_json::json!({"embeddings": [[0.5, null]]});
        let err = parse_ollama_response(&ollama).unwrap_err();
        assert!(err.to_string().contains("Invalid Ollama response"), "{}", err);
    }

    #[tokio::test]
    async fn missing_api_key_fails_before_any_request() {
        let embedder = OpenAIEmbedder::new(&EmbeddingConfig::default(), None).unwrap();
        let err = embedder
            .embed_documents(&["hello".to_string()])
            .await
            .unwrap_err();
        let remote = err.downcast_ref::<RemoteError>().expect("typed remote error");
        assert!(remote.is_unauthorized());
    }

    #[tokio::test]
    async fn disabled_embedder_errors() {
        assert!(DisabledEmbedder
            .embed_documents(&["x".to_string()])
            .await
            .is_err());
    }

    #[test]
    fn create_embedder_by_name() {
        let mut cfg = EmbeddingConfig::default();
        assert_eq!(create_embedder(&cfg, None).unwrap().model_name(), "text-embedding-ada-002");
        cfg.provider = "disabled".to_string();
        assert_eq!(create_embedder(&cfg, None).unwrap().model_name(), "disabled");
        cfg.provider = "nope".to_string();
        assert!(create_embedder(&cfg, None).is_err());
    }
}
