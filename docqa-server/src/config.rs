//! Server configuration from environment variables.
//!
//! | Variable | Default |
//! |---|---|
//! | `DOCQA_HOST` | `127.0.0.1` |
//! | `DOCQA_PORT` | `8000` |
//! | `DOCQA_MAX_UPLOAD_BYTES` | 32 MiB |
//! | `DOCQA_RAG_CONFIG` | built-in [`RagConfig`] defaults |
//! | `DOCQA_DEFAULT_DOCUMENT` | none |
//! | `DOCQA_EMBEDDING_URL` | OpenAI API |
//! | `DOCQA_EMBEDDING_MODEL` | `text-embedding-3-small` |
//! | `DOCQA_EMBEDDING_DIMENSIONS` | model default (set it for non-OpenAI models) |
//! | `DOCQA_EMBEDDING_API_KEY` / `OPENAI_API_KEY` | none (unauthenticated) |
//! | `DOCQA_GENERATION_URL` | Hugging Face router |
//! | `DOCQA_GENERATION_MODEL` | `mistralai/Mistral-7B-Instruct-v0.2:hf-inference` |
//! | `DOCQA_GENERATION_API_KEY` / `HF_TOKEN` | none (unauthenticated) |

use std::path::PathBuf;

use anyhow::Context;
use docqa_rag::RagConfig;
use docqa_rag::openai::{DEFAULT_GENERATION_MODEL, HF_ROUTER_BASE_URL, OPENAI_BASE_URL};

const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// An OpenAI-compatible HTTP endpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EndpointConfig {
    /// Base URL, without the operation path.
    pub url: String,
    /// Model name sent with each request.
    pub model: String,
    /// Bearer token, if the endpoint needs one.
    pub api_key: Option<String>,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Upper bound on request bodies, uploads included.
    pub max_upload_bytes: usize,
    pub rag: RagConfig,
    /// Document ingested at start-up, if any.
    pub default_document: Option<PathBuf>,
    pub embedding: EndpointConfig,
    /// Requested embedding size, for models that support truncation.
    pub embedding_dimensions: Option<usize>,
    pub generation: EndpointConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            max_upload_bytes: 32 * 1024 * 1024,
            rag: RagConfig::default(),
            default_document: None,
            embedding: EndpointConfig {
                url: OPENAI_BASE_URL.to_string(),
                model: DEFAULT_EMBEDDING_MODEL.to_string(),
                api_key: None,
            },
            embedding_dimensions: None,
            generation: EndpointConfig {
                url: HF_ROUTER_BASE_URL.to_string(),
                model: DEFAULT_GENERATION_MODEL.to_string(),
                api_key: None,
            },
        }
    }
}

impl ServerConfig {
    /// Read the configuration from the process environment.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the configuration through `lookup`, which maps a variable name
    /// to its value. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut config = Self::default();

        if let Some(host) = get("DOCQA_HOST") {
            config.host = host;
        }
        if let Some(port) = get("DOCQA_PORT") {
            config.port = port.parse().with_context(|| format!("invalid DOCQA_PORT: {port}"))?;
        }
        if let Some(limit) = get("DOCQA_MAX_UPLOAD_BYTES") {
            config.max_upload_bytes = limit
                .parse()
                .with_context(|| format!("invalid DOCQA_MAX_UPLOAD_BYTES: {limit}"))?;
        }
        if let Some(path) = get("DOCQA_RAG_CONFIG") {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read DOCQA_RAG_CONFIG file {path}"))?;
            config.rag = serde_json::from_str(&raw)
                .with_context(|| format!("invalid RAG configuration in {path}"))?;
        }
        config.rag.validate().context("invalid RAG configuration")?;

        config.default_document = get("DOCQA_DEFAULT_DOCUMENT").map(PathBuf::from);

        if let Some(url) = get("DOCQA_EMBEDDING_URL") {
            config.embedding.url = url;
        }
        if let Some(model) = get("DOCQA_EMBEDDING_MODEL") {
            config.embedding.model = model;
        }
        config.embedding.api_key = get("DOCQA_EMBEDDING_API_KEY").or_else(|| get("OPENAI_API_KEY"));
        if let Some(dims) = get("DOCQA_EMBEDDING_DIMENSIONS") {
            config.embedding_dimensions = Some(
                dims.parse()
                    .with_context(|| format!("invalid DOCQA_EMBEDDING_DIMENSIONS: {dims}"))?,
            );
        }

        if let Some(url) = get("DOCQA_GENERATION_URL") {
            config.generation.url = url;
        }
        if let Some(model) = get("DOCQA_GENERATION_MODEL") {
            config.generation.model = model;
        }
        config.generation.api_key = get("DOCQA_GENERATION_API_KEY").or_else(|| get("HF_TOKEN"));

        Ok(config)
    }
}
