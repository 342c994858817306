//! OpenAI-compatible embedding and chat clients.
//!
//! This module is only available when the `openai` feature is enabled.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::config::{DEFAULT_BASE_URL, DEFAULT_EMBEDDING_MODEL, DEFAULT_GENERATION_MODEL, RagConfig};
use crate::embedding::{DEFAULT_MAX_CONCURRENCY, EmbeddingProvider};
use crate::error::{RagError, Result};
use crate::generation::{GenerationRequest, GeneratorClient};

/// The default dimensionality for `text-embedding-3-small`.
const DEFAULT_DIMENSIONS: usize = 1536;

/// HTTP-level deadline used unless overridden.
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

fn build_http_client(timeout: Duration, provider: &str) -> Result<reqwest::Client> {
    reqwest::Client::builder().timeout(timeout).build().map_err(|e| {
        RagError::Config(format!("{provider}: failed to build HTTP client: {e}"))
    })
}

fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}/{path}", base_url.trim_end_matches('/'))
}

fn require_api_key(api_key: String, provider: &str) -> Result<String> {
    if api_key.is_empty() {
        return Err(RagError::Config(format!("{provider}: API key must not be empty")));
    }
    Ok(api_key)
}

/// Read the `error.message` field of an OpenAI error body, falling back to the raw body.
fn error_detail(body: String) -> String {
    serde_json::from_str::<ErrorResponse>(&body).map(|e| e.error.message).unwrap_or(body)
}

// ── OpenAI API request/response types ──────────────────────────────

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

// ── Embeddings ─────────────────────────────────────────────────────

/// An [`EmbeddingProvider`] backed by the OpenAI embeddings API.
///
/// Uses `reqwest` to call `{base_url}/embeddings` directly.
///
/// # Configuration
///
/// - `model` – defaults to `text-embedding-3-small`.
/// - `dimensions` – optional Matryoshka dimension override.
/// - `base_url` – defaults to `https://api.openai.com/v1`.
///
/// # Example
///
/// ```rust,ignore
/// use ragchain::openai::OpenAIEmbeddingProvider;
///
/// let provider = OpenAIEmbeddingProvider::new("sk-...")?;
/// let embedding = provider.embed("hello world").await?;
/// ```
pub struct OpenAIEmbeddingProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    dimensions: usize,
    /// If set, passed to the API for Matryoshka dimension truncation.
    request_dimensions: Option<usize>,
    timeout: Duration,
    max_concurrency: usize,
}

impl OpenAIEmbeddingProvider {
    /// Create a new provider with the given API key.
    ///
    /// Uses the default model (`text-embedding-3-small`) and dimensions (1536).
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = require_api_key(api_key.into(), "OpenAI")?;
        Ok(Self {
            client: build_http_client(DEFAULT_HTTP_TIMEOUT, "OpenAI")?,
            api_key,
            base_url: DEFAULT_BASE_URL.into(),
            model: DEFAULT_EMBEDDING_MODEL.into(),
            dimensions: DEFAULT_DIMENSIONS,
            request_dimensions: None,
            timeout: DEFAULT_HTTP_TIMEOUT,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        })
    }

    /// Create a provider from a validated [`RagConfig`].
    pub fn from_config(config: &RagConfig) -> Result<Self> {
        Self::new(config.api_key.clone())?
            .with_model(config.embedding_model.clone())
            .with_base_url(config.base_url.clone())
            .with_max_concurrency(config.max_concurrency)
            .with_timeout(config.embed_timeout)
    }

    /// Set the model name (e.g. `text-embedding-3-large`).
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the API base URL (for OpenAI-compatible servers).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the output dimensions (Matryoshka support).
    ///
    /// When set, the API returns embeddings truncated to this size.
    /// This also updates the value returned by [`dimensions()`](EmbeddingProvider::dimensions).
    pub fn with_dimensions(mut self, dims: usize) -> Self {
        self.dimensions = dims;
        self.request_dimensions = Some(dims);
        self
    }

    /// Set the HTTP request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.client = build_http_client(timeout, "OpenAI")?;
        self.timeout = timeout;
        Ok(self)
    }

    /// Set the concurrency bound reported to batch callers.
    pub fn with_max_concurrency(mut self, limit: usize) -> Self {
        self.max_concurrency = limit;
        self
    }

    fn map_send_error(&self, e: reqwest::Error) -> RagError {
        error!(provider = "OpenAI", error = %e, "request failed");
        if e.is_timeout() {
            RagError::Timeout { operation: "embedding", after: self.timeout }
        } else {
            RagError::embedding("OpenAI", format!("request failed: {e}"))
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        debug!(provider = "OpenAI", text_len = text.len(), "embedding single text");

        let results = self.embed_batch(&[text]).await?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| RagError::embedding("OpenAI", "API returned empty response"))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(
            provider = "OpenAI",
            batch_size = texts.len(),
            model = %self.model,
            "embedding batch"
        );

        let request_body = EmbeddingRequest {
            model: &self.model,
            // The API rejects empty strings; a single space embeds as "no content"
            input: texts.iter().map(|t| if t.is_empty() { " " } else { *t }).collect(),
            dimensions: self.request_dimensions,
        };

        let response = self
            .client
            .post(endpoint(&self.base_url, "embeddings"))
            .bearer_auth(&self.api_key)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = error_detail(response.text().await.unwrap_or_default());
            error!(provider = "OpenAI", %status, "API error");
            return Err(RagError::embedding("OpenAI", format!("API returned {status}: {detail}")));
        }

        let embedding_response: EmbeddingResponse = response.json().await.map_err(|e| {
            error!(provider = "OpenAI", error = %e, "failed to parse response");
            RagError::embedding("OpenAI", format!("failed to parse response: {e}"))
        })?;

        let mut data = embedding_response.data;
        if data.len() != texts.len() {
            return Err(RagError::embedding(
                "OpenAI",
                format!("API returned {} embeddings for {} inputs", data.len(), texts.len()),
            ));
        }
        data.sort_by_key(|d| d.index);
        Ok(data.into_iter().map(|d| d.embedding).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    fn name(&self) -> &str {
        "OpenAI"
    }
}

// ── Chat completions ───────────────────────────────────────────────

/// A [`GeneratorClient`] backed by the OpenAI chat completions API.
///
/// The prompt is sent as a single `user` message. Unset generation
/// parameters are omitted so the model defaults apply.
///
/// # Example
///
/// ```rust,ignore
/// use ragchain::openai::OpenAIChatClient;
///
/// let client = OpenAIChatClient::new("sk-...")?.with_model("gpt-4o-mini");
/// ```
pub struct OpenAIChatClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    timeout: Duration,
}

impl OpenAIChatClient {
    /// Create a new client with the given API key and the default model.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = require_api_key(api_key.into(), "OpenAI")?;
        Ok(Self {
            client: build_http_client(DEFAULT_HTTP_TIMEOUT, "OpenAI")?,
            api_key,
            base_url: DEFAULT_BASE_URL.into(),
            model: DEFAULT_GENERATION_MODEL.into(),
            timeout: DEFAULT_HTTP_TIMEOUT,
        })
    }

    /// Create a client from a validated [`RagConfig`].
    pub fn from_config(config: &RagConfig) -> Result<Self> {
        Self::new(config.api_key.clone())?
            .with_model(config.generation_model.clone())
            .with_base_url(config.base_url.clone())
            .with_timeout(config.generation_timeout)
    }

    /// Set the model name.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the API base URL (for OpenAI-compatible servers).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the HTTP request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.client = build_http_client(timeout, "OpenAI")?;
        self.timeout = timeout;
        Ok(self)
    }
}

#[async_trait]
impl GeneratorClient for OpenAIChatClient {
    async fn generate(&self, request: GenerationRequest) -> Result<String> {
        debug!(
            provider = "OpenAI",
            model = %self.model,
            prompt_len = request.prompt.as_str().len(),
            "chat completion"
        );

        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage { role: "user", content: request.prompt.as_str() }],
            temperature: request.params.temperature,
            max_tokens: request.params.max_tokens,
        };

        let response = self
            .client
            .post(endpoint(&self.base_url, "chat/completions"))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!(provider = "OpenAI", error = %e, "request failed");
                if e.is_timeout() {
                    RagError::Timeout { operation: "generation", after: self.timeout }
                } else {
                    RagError::generation("OpenAI", format!("request failed: {e}"))
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = error_detail(response.text().await.unwrap_or_default());
            error!(provider = "OpenAI", %status, "API error");
            return Err(RagError::generation("OpenAI", format!("API returned {status}: {detail}")));
        }

        let chat: ChatResponse = response.json().await.map_err(|e| {
            error!(provider = "OpenAI", error = %e, "failed to parse response");
            RagError::generation("OpenAI", format!("failed to parse response: {e}"))
        })?;

        let choice = chat
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| RagError::generation("OpenAI", "response contained no choices"))?;
        debug!(provider = "OpenAI", finish_reason = ?choice.finish_reason, "chat completion done");

        choice
            .message
            .content
            .filter(|content| !content.is_empty())
            .ok_or_else(|| RagError::generation("OpenAI", "response message had no content"))
    }

    fn name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_without_double_slash() {
        assert_eq!(endpoint("http://host/v1/", "embeddings"), "http://host/v1/embeddings");
        assert_eq!(
            endpoint("http://host/v1", "chat/completions"),
            "http://host/v1/chat/completions"
        );
    }

    #[test]
    fn error_detail_prefers_api_message() {
        let body = r#"{"error":{"message":"bad key","type":"invalid_request_error"}}"#;
        assert_eq!(error_detail(body.to_string()), "bad key");
        assert_eq!(error_detail("plain".to_string()), "plain");
    }

    #[test]
    fn chat_request_omits_unset_params() {
        let body = ChatRequest {
            model: "m",
            messages: vec![ChatMessage { role: "user", content: "hi" }],
            temperature: None,
            max_tokens: None,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("temperature").is_none());
        assert!(json.get("max_tokens").is_none());
    }

    #[test]
    fn empty_api_key_is_rejected() {
        assert!(matches!(OpenAIChatClient::new(""), Err(RagError::Config(_))));
        assert!(matches!(OpenAIEmbeddingProvider::new(""), Err(RagError::Config(_))));
    }
}
