//! Providers for OpenAI-compatible HTTP APIs.
//!
//! [`OpenAIEmbeddingProvider`] calls `/embeddings`; [`OpenAICompatibleGenerator`]
//! calls `/chat/completions`, optionally streaming over server-sent events.
//! Both take a base URL so they work against OpenAI itself, the Hugging Face
//! router, or a local server exposing the same API.
//!
//! This module is only available when the `openai` feature is enabled.

use std::time::Duration;

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::embedding::EmbeddingProvider;
use crate::error::{GenerationError, RagError, Result};
use crate::generation::{GenerationProvider, GenerationRequest, TextStream};

/// The default OpenAI API base URL.
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// The Hugging Face inference router, which speaks the OpenAI chat API.
pub const HF_ROUTER_BASE_URL: &str = "https://router.huggingface.co/v1";

/// The default model for OpenAI embeddings.
const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// The default dimensionality for `text-embedding-3-small`.
const DEFAULT_DIMENSIONS: usize = 1536;

fn native_dimensions(model: &str) -> Option<usize> {
    match model {
        "text-embedding-3-small" | "text-embedding-ada-002" => Some(1536),
        "text-embedding-3-large" => Some(3072),
        _ => None,
    }
}

/// The default chat model served through the Hugging Face router.
pub const DEFAULT_GENERATION_MODEL: &str = "mistralai/Mistral-7B-Instruct-v0.2:hf-inference";

/// Default request deadline for generation calls.
const DEFAULT_GENERATION_TIMEOUT: Duration = Duration::from_secs(120);

/// End-of-stream sentinel sent by OpenAI-compatible servers.
const STREAM_DONE: &str = "[DONE]";

const EMBEDDING_PROVIDER: &str = "OpenAI";
const GENERATION_PROVIDER: &str = "openai-compatible";

fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}/{path}", base_url.trim_end_matches('/'))
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

/// Pull the API's error message out of a failed response body, if present.
fn error_detail(body: String) -> String {
    serde_json::from_str::<ErrorResponse>(&body).map(|e| e.error.message).unwrap_or(body)
}

/// An [`EmbeddingProvider`] backed by an OpenAI-compatible embeddings API.
///
/// # Configuration
///
/// - `base_url` – defaults to the OpenAI API.
/// - `model` – defaults to `text-embedding-3-small`.
/// - `dimensions` – optional Matryoshka dimension override.
/// - `api_key` – from the constructor or the `OPENAI_API_KEY` environment
///   variable; omitted entirely by [`unauthenticated`](Self::unauthenticated).
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::openai::OpenAIEmbeddingProvider;
///
/// let provider = OpenAIEmbeddingProvider::new("sk-...")?;
/// let embedding = provider.embed("hello world").await?;
/// ```
pub struct OpenAIEmbeddingProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    dimensions: usize,
    /// If set, passed to the API for Matryoshka dimension truncation.
    request_dimensions: Option<usize>,
}

impl OpenAIEmbeddingProvider {
    /// Create a new provider with the given API key.
    ///
    /// Uses the default model (`text-embedding-3-small`) and dimensions (1536).
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(RagError::Embedding {
                provider: EMBEDDING_PROVIDER.into(),
                message: "API key must not be empty".into(),
            });
        }
        Ok(Self { api_key: Some(api_key), ..Self::unauthenticated(OPENAI_BASE_URL) })
    }

    /// Create a provider for a server that needs no API key.
    pub fn unauthenticated(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: None,
            model: DEFAULT_EMBEDDING_MODEL.into(),
            dimensions: DEFAULT_DIMENSIONS,
            request_dimensions: None,
        }
    }

    /// Create a new provider using the `OPENAI_API_KEY` environment variable.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| RagError::Embedding {
            provider: EMBEDDING_PROVIDER.into(),
            message: "OPENAI_API_KEY environment variable not set".into(),
        })?;
        Self::new(api_key)
    }

    /// Set the API base URL (everything before `/embeddings`).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the model name (e.g. `text-embedding-3-large`).
    ///
    /// Known OpenAI models also set [`dimensions()`](EmbeddingProvider::dimensions)
    /// unless an explicit size was requested. Other models keep the current
    /// value; use [`with_dimensions`](Self::with_dimensions) when it differs.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        if self.request_dimensions.is_none() {
            if let Some(dims) = native_dimensions(&self.model) {
                self.dimensions = dims;
            }
        }
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

    fn failure(message: String) -> RagError {
        RagError::Embedding { provider: EMBEDDING_PROVIDER.into(), message }
    }
}

// ── Embeddings API request/response types ──

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
    embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingProvider for OpenAIEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        debug!(provider = EMBEDDING_PROVIDER, text_len = text.len(), "embedding single text");

        let results = self.embed_batch(&[text]).await?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| Self::failure("API returned empty response".into()))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(
            provider = EMBEDDING_PROVIDER,
            batch_size = texts.len(),
            model = %self.model,
            "embedding batch"
        );

        let request_body = EmbeddingRequest {
            model: &self.model,
            input: texts.to_vec(),
            dimensions: self.request_dimensions,
        };

        let mut request =
            self.client.post(endpoint(&self.base_url, "embeddings")).json(&request_body);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await.map_err(|e| {
            error!(provider = EMBEDDING_PROVIDER, error = %e, "request failed");
            Self::failure(format!("request failed: {e}"))
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!(provider = EMBEDDING_PROVIDER, %status, "API error");
            return Err(Self::failure(format!("API returned {status}: {}", error_detail(body))));
        }

        let embedding_response: EmbeddingResponse = response.json().await.map_err(|e| {
            error!(provider = EMBEDDING_PROVIDER, error = %e, "failed to parse response");
            Self::failure(format!("failed to parse response: {e}"))
        })?;

        if embedding_response.data.len() != texts.len() {
            return Err(Self::failure(format!(
                "API returned {} embeddings for {} inputs",
                embedding_response.data.len(),
                texts.len()
            )));
        }

        Ok(embedding_response.data.into_iter().map(|d| d.embedding).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// A [`GenerationProvider`] backed by an OpenAI-compatible chat completions API.
///
/// Defaults to the Hugging Face router and
/// `mistralai/Mistral-7B-Instruct-v0.2:hf-inference`, with a 120 second
/// request deadline. Each prompt is sent as a single user message.
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::openai::OpenAICompatibleGenerator;
///
/// let generator = OpenAICompatibleGenerator::from_env()?;
/// let text = generator.generate(&GenerationRequest::new(prompt, 300, 0.0)).await?;
/// ```
pub struct OpenAICompatibleGenerator {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    timeout: Duration,
}

impl OpenAICompatibleGenerator {
    /// Create a generator for the Hugging Face router with the given token.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(Self::request_failed("API key must not be empty".into()));
        }
        Self::build(HF_ROUTER_BASE_URL.into(), Some(api_key), DEFAULT_GENERATION_TIMEOUT)
    }

    /// Create a generator for a server that needs no API key.
    pub fn unauthenticated(base_url: impl Into<String>) -> Result<Self> {
        Self::build(base_url.into(), None, DEFAULT_GENERATION_TIMEOUT)
    }

    /// Create a generator using the `HF_TOKEN` environment variable.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("HF_TOKEN")
            .map_err(|_| Self::request_failed("HF_TOKEN environment variable not set".into()))?;
        Self::new(api_key)
    }

    fn build(base_url: String, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Self::request_failed(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, base_url, api_key, model: DEFAULT_GENERATION_MODEL.into(), timeout })
    }

    /// Set the API base URL (everything before `/chat/completions`).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the model name.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the request deadline.
    pub fn with_timeout(self, timeout: Duration) -> Result<Self> {
        let model = self.model;
        let mut generator = Self::build(self.base_url, self.api_key, timeout)?;
        generator.model = model;
        Ok(generator)
    }

    fn request_failed(message: String) -> RagError {
        GenerationError::Request { provider: GENERATION_PROVIDER.into(), message }.into()
    }

    fn malformed(message: String) -> RagError {
        GenerationError::MalformedResponse { provider: GENERATION_PROVIDER.into(), message }.into()
    }

    fn transport_error(&self, e: reqwest::Error) -> RagError {
        if e.is_timeout() {
            error!(provider = GENERATION_PROVIDER, after = ?self.timeout, "request timed out");
            GenerationError::Timeout { provider: GENERATION_PROVIDER.into(), after: self.timeout }
                .into()
        } else {
            error!(provider = GENERATION_PROVIDER, error = %e, "request failed");
            Self::request_failed(format!("request failed: {e}"))
        }
    }

    async fn send(&self, request: &GenerationRequest, stream: bool) -> Result<reqwest::Response> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage { role: "user", content: &request.prompt }],
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            stream,
        };

        let mut http = self.client.post(endpoint(&self.base_url, "chat/completions")).json(&body);
        if let Some(api_key) = &self.api_key {
            http = http.bearer_auth(api_key);
        }

        let response = http.send().await.map_err(|e| self.transport_error(e))?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!(provider = GENERATION_PROVIDER, %status, "API error");
            let detail = error_detail(body);
            return Err(Self::request_failed(format!("API returned {status}: {detail}")));
        }
        Ok(response)
    }
}

// ── Chat completions request/response types ──

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
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
    message: ChatContent,
}

#[derive(Deserialize)]
struct ChatChunk {
    choices: Vec<ChunkChoice>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChatContent,
}

#[derive(Deserialize, Default)]
struct ChatContent {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl GenerationProvider for OpenAICompatibleGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        debug!(
            provider = GENERATION_PROVIDER,
            model = %self.model,
            prompt_len = request.prompt.len(),
            max_tokens = request.max_tokens,
            "generating"
        );

        let response = self.send(request, false).await?;
        let text = response.text().await.map_err(|e| self.transport_error(e))?;
        let parsed: ChatResponse = serde_json::from_str(&text)
            .map_err(|e| Self::malformed(format!("failed to parse response: {e}")))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.unwrap_or_default())
            .ok_or_else(|| Self::malformed("response contained no choices".into()))
    }

    async fn generate_stream(&self, request: &GenerationRequest) -> Result<TextStream> {
        debug!(
            provider = GENERATION_PROVIDER,
            model = %self.model,
            prompt_len = request.prompt.len(),
            "opening generation stream"
        );

        let response = self.send(request, true).await?;
        let timeout = self.timeout;
        let mut events = response.bytes_stream().eventsource();

        let stream = async_stream::stream! {
            while let Some(event) = events.next().await {
                let event = match event {
                    Ok(event) => event,
                    Err(eventsource_stream::EventStreamError::Transport(e)) if e.is_timeout() => {
                        yield Err(GenerationError::Timeout {
                            provider: GENERATION_PROVIDER.into(),
                            after: timeout,
                        }
                        .into());
                        break;
                    }
                    Err(e) => {
                        yield Err(Self::request_failed(format!("stream failed: {e}")));
                        break;
                    }
                };

                let data = event.data.trim();
                if data == STREAM_DONE {
                    break;
                }
                if data.is_empty() {
                    continue;
                }

                match serde_json::from_str::<ChatChunk>(data) {
                    Ok(chunk) => {
                        let text: String = chunk
                            .choices
                            .into_iter()
                            .filter_map(|choice| choice.delta.content)
                            .collect();
                        if !text.is_empty() {
                            yield Ok(text);
                        }
                    }
                    Err(e) => {
                        yield Err(Self::malformed(format!("failed to parse stream event: {e}")));
                        break;
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }

    fn name(&self) -> &str {
        GENERATION_PROVIDER
    }
}
