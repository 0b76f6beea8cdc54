//! Deterministic in-process providers shared by the integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use docqa_rag::{
    EmbeddingProvider, GenerationError, GenerationProvider, GenerationRequest, RagConfig,
    RagEngine, RagError, Result, TextStream,
};
use tokio::sync::Mutex;

pub const DIM: usize = 256;

/// Bag-of-words embedder: each lower-cased alphanumeric token is hashed
/// (FNV-1a) into one of `DIM` buckets.
#[derive(Default)]
pub struct HashEmbedder {
    pub fail: AtomicBool,
    pub calls: AtomicUsize,
}

pub fn bucket(token: &str) -> usize {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in token.bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    (hash % DIM as u64) as usize
}

pub fn embed_text(text: &str) -> Vec<f32> {
    let mut v = vec![0.0; DIM];
    for token in text.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty()) {
        v[bucket(&token.to_lowercase())] += 1.0;
    }
    v
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(RagError::Embedding {
                provider: "hash".into(),
                message: "embedding backend unavailable".into(),
            });
        }
        Ok(embed_text(text))
    }

    fn dimensions(&self) -> usize {
        DIM
    }
}

/// Produces `DIM`-sized vectors while declaring one dimension more.
pub struct MisreportingEmbedder;

#[async_trait]
impl EmbeddingProvider for MisreportingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(embed_text(text))
    }

    fn dimensions(&self) -> usize {
        DIM + 1
    }
}

/// Returns a fixed reply; streams it word by word.
pub struct ScriptedGenerator {
    pub reply: String,
    pub calls: AtomicUsize,
    pub requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedGenerator {
    pub fn new(reply: impl Into<String>) -> Self {
        Self { reply: reply.into(), calls: AtomicUsize::new(0), requests: Mutex::new(Vec::new()) }
    }

    pub async fn last_request(&self) -> Option<GenerationRequest> {
        self.requests.lock().await.last().cloned()
    }
}

#[async_trait]
impl GenerationProvider for ScriptedGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().await.push(request.clone());
        Ok(self.reply.clone())
    }

    async fn generate_stream(&self, request: &GenerationRequest) -> Result<TextStream> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().await.push(request.clone());
        let pieces: Vec<Result<String>> =
            self.reply.split_inclusive(' ').map(|s| Ok(s.to_string())).collect();
        Ok(Box::pin(futures::stream::iter(pieces)))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Always fails with a request error.
#[derive(Default)]
pub struct FailingGenerator {
    pub calls: AtomicUsize,
}

#[async_trait]
impl GenerationProvider for FailingGenerator {
    async fn generate(&self, _request: &GenerationRequest) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(GenerationError::Request { provider: "failing".into(), message: "503 upstream".into() }
            .into())
    }

    fn name(&self) -> &str {
        "failing"
    }
}

/// Never answers within any reasonable deadline.
pub struct SlowGenerator;

#[async_trait]
impl GenerationProvider for SlowGenerator {
    async fn generate(&self, _request: &GenerationRequest) -> Result<String> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok("too late".into())
    }

    async fn generate_stream(&self, _request: &GenerationRequest) -> Result<TextStream> {
        Ok(Box::pin(async_stream::stream! {
            yield Ok("first ".to_string());
            tokio::time::sleep(Duration::from_secs(3600)).await;
            yield Ok("too late".to_string());
        }))
    }

    fn name(&self) -> &str {
        "slow"
    }
}

/// Sets its flag when dropped.
pub struct DropFlag(pub Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Streams one fragment, then hangs forever. Records when the stream is dropped.
pub struct EndlessStreamGenerator {
    pub dropped: Arc<AtomicBool>,
}

#[async_trait]
impl GenerationProvider for EndlessStreamGenerator {
    async fn generate(&self, _request: &GenerationRequest) -> Result<String> {
        futures::future::pending::<()>().await;
        Ok(String::new())
    }

    async fn generate_stream(&self, _request: &GenerationRequest) -> Result<TextStream> {
        let guard = DropFlag(self.dropped.clone());
        Ok(Box::pin(async_stream::stream! {
            let _guard = guard;
            yield Ok("partial ".to_string());
            futures::future::pending::<()>().await;
        }))
    }

    fn name(&self) -> &str {
        "endless"
    }
}

/// Streams one fragment, then fails.
pub struct BrokenStreamGenerator;

#[async_trait]
impl GenerationProvider for BrokenStreamGenerator {
    async fn generate(&self, _request: &GenerationRequest) -> Result<String> {
        Ok(String::new())
    }

    async fn generate_stream(&self, _request: &GenerationRequest) -> Result<TextStream> {
        Ok(Box::pin(async_stream::stream! {
            yield Ok("Par".to_string());
            yield Err(GenerationError::Request {
                provider: "broken".into(),
                message: "connection reset".into(),
            }
            .into());
            yield Ok("is".to_string());
        }))
    }

    fn name(&self) -> &str {
        "broken"
    }
}

pub const PARIS: &str = "Paris is the capital of France. The Eiffel Tower is in Paris.";

pub const SUMMARY_JSON: &str = r#"{"topic": "The text describes Paris",
 "point1": "Paris is the capital of France",
 "point2": "The Eiffel Tower stands in Paris",
 "point3": "The city is a national landmark",
 "conclusion": "Paris is central to France"}"#;

/// Config with small chunks, matching the Paris scenario.
pub fn small_config() -> RagConfig {
    RagConfig::builder().chunk_size(40).chunk_overlap(10).build().unwrap()
}

pub fn engine_with(
    config: RagConfig,
    embedder: Arc<dyn EmbeddingProvider>,
    generator: Arc<dyn GenerationProvider>,
) -> RagEngine {
    RagEngine::builder()
        .config(config)
        .embedding_provider(embedder)
        .generation_provider(generator)
        .build()
        .unwrap()
}
