//! The question-answering engine.
//!
//! [`RagEngine`] owns the corpus and coordinates ingestion
//! (extract → chunk → embed → append) and questions
//! (classify → embed → retrieve → prompt → generate → post-process).
//!
//! The corpus sits behind a readers-writer lock. `ingest` and `reset` take
//! it exclusively; questions share it, and only while classifying, embedding
//! the question and retrieving. Generation runs after the lock is released,
//! so a slow or abandoned answer never holds back writers.
//!
//! # Example
//!
//! ```rust,ignore
//! use docqa_rag::{IngestSource, Query, RagConfig, RagEngine};
//!
//! let engine = RagEngine::builder()
//!     .config(RagConfig::default())
//!     .embedding_provider(Arc::new(my_embedder))
//!     .generation_provider(Arc::new(my_generator))
//!     .build()?;
//!
//! engine.ingest(IngestSource::path("report.pdf"), None).await?;
//! let answer = engine.ask(Query::new("What is the capital of France?")).await?;
//! ```

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;

use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, error, info};

use crate::chunking::{Chunker, FixedSizeChunker};
use crate::config::RagConfig;
use crate::corpus::Corpus;
use crate::document::{
    Answer, Citation, Document, DocumentSummary, IngestReport, IngestSource, Query, RetrievalResult,
};
use crate::embedding::EmbeddingProvider;
use crate::error::{GenerationError, IngestionError, RagError, Result, RetrievalError};
use crate::extract::TextExtractor;
use crate::generation::{GenerationProvider, GenerationRequest};
use crate::intent::{QueryClassifier, QueryIntent};
use crate::prompt::PromptBuilder;
use crate::retriever::Retriever;

/// Whether anything has been ingested.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    /// No chunks indexed; questions fail with "not ready".
    Empty,
    /// At least one chunk indexed.
    Ready,
}

/// A consistent snapshot of the engine's size.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EngineStatus {
    /// Current state.
    pub state: EngineState,
    /// Number of ingested documents.
    pub documents: usize,
    /// Number of indexed chunks.
    pub chunks: usize,
    /// Number of stored vectors; always equal to `chunks`.
    pub vectors: usize,
}

/// One item of a streamed answer.
///
/// A stream yields `Citations` once (unless it fails before retrieval
/// completes), then zero or more `Text` fragments, then exactly one of
/// `Done` or `Error`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum StreamFragment {
    /// The chunks the answer is grounded on.
    Citations(Vec<Citation>),
    /// A piece of answer text.
    Text(String),
    /// The answer is complete.
    Done,
    /// The answer failed; nothing follows.
    Error(String),
}

impl StreamFragment {
    /// Whether this fragment ends the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamFragment::Done | StreamFragment::Error(_))
    }
}

impl fmt::Display for StreamFragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamFragment::Citations(citations) => {
                f.write_str("sources:")?;
                for c in citations {
                    write!(f, " {}#{}", c.document_id, c.sequence)?;
                }
                Ok(())
            }
            StreamFragment::Text(text) => f.write_str(text),
            StreamFragment::Done => f.write_str("[DONE]"),
            StreamFragment::Error(message) => write!(f, "error: {message}"),
        }
    }
}

/// A streamed answer. Dropping it cancels the in-flight generation.
pub type AnswerStream = Pin<Box<dyn Stream<Item = StreamFragment> + Send>>;

/// Everything a question needs after the corpus lock is released.
struct PreparedQuestion {
    intent: QueryIntent,
    retrieval: RetrievalResult,
    request: GenerationRequest,
}

struct EngineInner {
    config: RagConfig,
    classifier: QueryClassifier,
    retriever: Retriever,
    prompts: PromptBuilder,
    chunker: Arc<dyn Chunker>,
    extractor: Arc<dyn TextExtractor>,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    generation_provider: Arc<dyn GenerationProvider>,
    corpus: RwLock<Corpus>,
}

/// The retrieval-augmented question-answering engine.
///
/// Cheap to clone; clones share the same corpus. Construct one via
/// [`RagEngine::builder()`].
#[derive(Clone)]
pub struct RagEngine {
    inner: Arc<EngineInner>,
}

impl fmt::Debug for RagEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RagEngine")
            .field("config", &self.inner.config)
            .field("generation_provider", &self.inner.generation_provider.name())
            .finish_non_exhaustive()
    }
}

impl RagEngine {
    /// Create a new [`RagEngineBuilder`].
    pub fn builder() -> RagEngineBuilder {
        RagEngineBuilder::default()
    }

    /// Return a reference to the engine configuration.
    pub fn config(&self) -> &RagConfig {
        &self.inner.config
    }

    /// Return the query classifier.
    pub fn classifier(&self) -> &QueryClassifier {
        &self.inner.classifier
    }

    /// Ingest one document: extract → chunk → embed → append.
    ///
    /// The document id is `document_id` if given, else the file name of a
    /// path source. Extraction, chunking and embedding happen without the
    /// lock; the append is atomic under the write lock. On any error the
    /// corpus is left exactly as it was.
    ///
    /// # Errors
    ///
    /// - [`IngestionError`] when the id is missing or already used, or the
    ///   source is unreadable, empty or yields no chunks.
    /// - [`RagError::Embedding`] when the embedding provider fails or returns
    ///   vectors whose length differs from its declared
    ///   [`dimensions`](EmbeddingProvider::dimensions).
    /// - [`RagError::Index`] when the vectors do not match the dimensionality
    ///   already fixed by earlier documents.
    pub async fn ingest(
        &self,
        source: IngestSource,
        document_id: Option<&str>,
    ) -> Result<IngestReport> {
        let inner = &self.inner;
        let document_id = document_id
            .map(str::to_string)
            .or_else(|| source.file_name())
            .filter(|id| !id.trim().is_empty())
            .ok_or(IngestionError::MissingDocumentId)?;

        if inner.corpus.read().await.contains(&document_id) {
            return Err(IngestionError::DuplicateDocument { document_id }.into());
        }

        let text = inner.extractor.extract(&source).inspect_err(|e| {
            error!(document.id = %document_id, error = %e, "extraction failed");
        })?;
        if text.trim().is_empty() {
            return Err(IngestionError::EmptyText { document_id }.into());
        }

        let document = Document::new(document_id, text);
        let chunks = inner.chunker.chunk(&document);
        if chunks.is_empty() {
            return Err(IngestionError::NoChunks { document_id: document.id }.into());
        }

        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let vectors = inner.embedding_provider.embed_batch(&texts).await.inspect_err(|e| {
            error!(document.id = %document.id, error = %e, "embedding failed during ingestion");
        })?;

        let expected = inner.embedding_provider.dimensions();
        if let Some(bad) = vectors.iter().find(|v| v.len() != expected) {
            error!(
                document.id = %document.id,
                expected,
                actual = bad.len(),
                "embedding size mismatch"
            );
            return Err(RagError::Embedding {
                provider: "embedding".to_string(),
                message: format!(
                    "provider declares {expected} dimensions but returned a {}-d vector",
                    bad.len()
                ),
            });
        }

        let summary = DocumentSummary {
            document_id: document.id.clone(),
            chunk_count: chunks.len(),
            char_count: document.text.chars().count(),
        };
        let chunks_added = chunks.len();

        let mut corpus = inner.corpus.write().await;
        corpus.append(summary, chunks, vectors).inspect_err(|e| {
            error!(document.id = %document.id, error = %e, "append rejected");
        })?;
        let total_chunks = corpus.chunk_count();
        drop(corpus);

        info!(document.id = %document.id, chunks_added, total_chunks, "ingested document");
        Ok(IngestReport { document_id: document.id, chunks_added, total_chunks })
    }

    /// Drop every document, chunk and vector. The engine returns to
    /// [`EngineState::Empty`].
    pub async fn reset(&self) {
        let mut corpus = self.inner.corpus.write().await;
        let dropped = corpus.chunk_count();
        corpus.clear();
        info!(dropped_chunks = dropped, "engine reset");
    }

    /// Classify, embed and retrieve context for `query` without generating.
    ///
    /// # Errors
    ///
    /// See [`ask`](Self::ask); generation errors cannot occur.
    pub async fn retrieve(&self, query: &Query) -> Result<RetrievalResult> {
        self.prepare(query).await.map(|prepared| prepared.retrieval)
    }

    /// Answer a question.
    ///
    /// # Errors
    ///
    /// - [`RetrievalError::NotReady`] when nothing is ingested.
    /// - [`RetrievalError::NoContextForDocument`] when the document filter
    ///   matches nothing.
    /// - [`RagError::InvalidQuery`] for a blank question or `top_k == 0`.
    /// - [`GenerationError`] when the generator fails or misses the
    ///   deadline. Failures are never retried.
    pub async fn ask(&self, query: Query) -> Result<Answer> {
        let prepared = self.prepare(&query).await?;
        let inner = &self.inner;

        let raw = self.generate(&prepared.request).await?;
        let answer = match prepared.intent {
            QueryIntent::Factual => inner.prompts.finish_factual(&raw),
            QueryIntent::Summary => inner.prompts.finish_summary(&raw),
        };

        let sources = prepared.retrieval.citations();
        info!(intent = %prepared.intent, sources = sources.len(), "answered question");
        Ok(Answer { answer, intent: prepared.intent, sources })
    }

    /// Answer a question as a stream of fragments.
    ///
    /// Errors never escape as panics or `Err`; they arrive as a single
    /// [`StreamFragment::Error`] that ends the stream. Factual answers are
    /// forwarded fragment by fragment. Summary answers are generated whole,
    /// post-processed and sent as one fragment.
    pub fn ask_stream(&self, query: Query) -> AnswerStream {
        let engine = self.clone();

        Box::pin(async_stream::stream! {
            let prepared = match engine.prepare(&query).await {
                Ok(prepared) => prepared,
                Err(e) => {
                    yield StreamFragment::Error(e.to_string());
                    return;
                }
            };
            yield StreamFragment::Citations(prepared.retrieval.citations());

            let inner = &engine.inner;
            match prepared.intent {
                QueryIntent::Summary => match engine.generate(&prepared.request).await {
                    Ok(raw) => {
                        yield StreamFragment::Text(inner.prompts.finish_summary(&raw));
                    }
                    Err(e) => {
                        error!(error = %e, "summary generation failed");
                        yield StreamFragment::Error(e.to_string());
                        return;
                    }
                },
                QueryIntent::Factual => {
                    let deadline = inner.config.generation_timeout();
                    let provider = &inner.generation_provider;

                    let opened = tokio::time::timeout(
                        deadline,
                        provider.generate_stream(&prepared.request),
                    )
                    .await;
                    let mut upstream = match opened {
                        Ok(Ok(upstream)) => upstream,
                        Ok(Err(e)) => {
                            error!(error = %e, "failed to open generation stream");
                            yield StreamFragment::Error(e.to_string());
                            return;
                        }
                        Err(_) => {
                            yield StreamFragment::Error(engine.timeout_error().to_string());
                            return;
                        }
                    };

                    let mut produced = false;
                    loop {
                        match tokio::time::timeout(deadline, upstream.next()).await {
                            Ok(Some(Ok(text))) => {
                                if !text.is_empty() {
                                    produced |= !text.trim().is_empty();
                                    yield StreamFragment::Text(text);
                                }
                            }
                            Ok(Some(Err(e))) => {
                                error!(error = %e, "generation stream failed");
                                yield StreamFragment::Error(e.to_string());
                                return;
                            }
                            Ok(None) => break,
                            Err(_) => {
                                error!(after = ?deadline, "generation stream stalled");
                                yield StreamFragment::Error(engine.timeout_error().to_string());
                                return;
                            }
                        }
                    }
                    if !produced {
                        yield StreamFragment::Text(inner.prompts.not_found_answer().to_string());
                    }
                }
            }

            debug!(intent = %prepared.intent, "answer stream complete");
            yield StreamFragment::Done;
        })
    }

    /// A consistent snapshot of the engine's size and state.
    pub async fn status(&self) -> EngineStatus {
        let corpus = self.inner.corpus.read().await;
        EngineStatus {
            state: if corpus.is_empty() { EngineState::Empty } else { EngineState::Ready },
            documents: corpus.documents().len(),
            chunks: corpus.chunk_count(),
            vectors: corpus.vector_count(),
        }
    }

    /// Ingested documents, in ingest order.
    pub async fn documents(&self) -> Vec<DocumentSummary> {
        self.inner.corpus.read().await.documents().to_vec()
    }

    /// Number of indexed chunks.
    pub async fn chunk_count(&self) -> usize {
        self.inner.corpus.read().await.chunk_count()
    }

    /// Number of stored vectors.
    pub async fn vector_count(&self) -> usize {
        self.inner.corpus.read().await.vector_count()
    }

    fn validate(query: &Query) -> Result<()> {
        if query.question.trim().is_empty() {
            return Err(RagError::InvalidQuery("question must not be empty".to_string()));
        }
        if query.top_k == Some(0) {
            return Err(RagError::InvalidQuery("top_k must be greater than zero".to_string()));
        }
        Ok(())
    }

    /// Everything up to the generation call, under the read lock.
    async fn prepare(&self, query: &Query) -> Result<PreparedQuestion> {
        let inner = &self.inner;

        // Readiness is reported ahead of query validation.
        let corpus = inner.corpus.read().await;
        if corpus.is_empty() {
            return Err(RetrievalError::NotReady.into());
        }
        Self::validate(query)?;

        let intent = inner.classifier.classify(&query.question);
        let query_vector = inner.embedding_provider.embed(&query.question).await.inspect_err(|e| {
            error!(error = %e, "embedding failed during query");
        })?;
        let retrieval = inner.retriever.retrieve(&corpus, &query_vector, query, intent)?;
        drop(corpus);

        let profile = inner.config.profile(intent);
        let prompt = inner.prompts.build(&retrieval.context, &query.question, intent);
        let request = GenerationRequest::new(prompt, profile.max_tokens, profile.temperature);

        Ok(PreparedQuestion { intent, retrieval, request })
    }

    /// One generation call under the configured deadline.
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        let inner = &self.inner;
        let deadline = inner.config.generation_timeout();
        match tokio::time::timeout(deadline, inner.generation_provider.generate(request)).await {
            Ok(result) => result.inspect_err(|e| error!(error = %e, "generation failed")),
            Err(_) => {
                error!(after = ?deadline, "generation timed out");
                Err(self.timeout_error())
            }
        }
    }

    fn timeout_error(&self) -> RagError {
        GenerationError::Timeout {
            provider: self.inner.generation_provider.name().to_string(),
            after: self.inner.config.generation_timeout(),
        }
        .into()
    }
}

/// Builder for constructing a [`RagEngine`].
///
/// The embedding and generation providers are required. The chunker
/// defaults to a [`FixedSizeChunker`] sized from the config, the classifier
/// to the config's cue table, and the extractor to plain UTF-8 text (PDF
/// sniffing when the `pdf` feature is enabled).
///
/// # Example
///
/// ```rust,ignore
/// let engine = RagEngine::builder()
///     .config(RagConfig::default())
///     .embedding_provider(Arc::new(embedder))
///     .generation_provider(Arc::new(generator))
///     .extractor(Arc::new(PlainTextExtractor))  // optional
///     .build()?;
/// ```
#[derive(Default)]
pub struct RagEngineBuilder {
    config: Option<RagConfig>,
    chunker: Option<Arc<dyn Chunker>>,
    extractor: Option<Arc<dyn TextExtractor>>,
    classifier: Option<QueryClassifier>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    generation_provider: Option<Arc<dyn GenerationProvider>>,
}

impl RagEngineBuilder {
    /// Set the engine configuration.
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the document chunker.
    pub fn chunker(mut self, chunker: Arc<dyn Chunker>) -> Self {
        self.chunker = Some(chunker);
        self
    }

    /// Set the text extractor.
    pub fn extractor(mut self, extractor: Arc<dyn TextExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    /// Set the query classifier, overriding the config's cue table.
    pub fn classifier(mut self, classifier: QueryClassifier) -> Self {
        self.classifier = Some(classifier);
        self
    }

    /// Set the embedding provider.
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Set the generation provider.
    pub fn generation_provider(mut self, provider: Arc<dyn GenerationProvider>) -> Self {
        self.generation_provider = Some(provider);
        self
    }

    /// Build the [`RagEngine`], validating the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if a provider is missing or the
    /// configuration is inconsistent.
    pub fn build(self) -> Result<RagEngine> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let embedding_provider = self
            .embedding_provider
            .ok_or_else(|| RagError::ConfigError("embedding_provider is required".to_string()))?;
        let generation_provider = self
            .generation_provider
            .ok_or_else(|| RagError::ConfigError("generation_provider is required".to_string()))?;
        let chunker = match self.chunker {
            Some(chunker) => chunker,
            None => Arc::new(FixedSizeChunker::new(config.chunk_size, config.chunk_overlap)?),
        };
        let extractor = self.extractor.unwrap_or_else(default_extractor);
        let classifier =
            self.classifier.unwrap_or_else(|| QueryClassifier::new(&config.summary_cues));

        Ok(RagEngine {
            inner: Arc::new(EngineInner {
                classifier,
                retriever: Retriever::from_config(&config),
                prompts: PromptBuilder::from_config(&config),
                chunker,
                extractor,
                embedding_provider,
                generation_provider,
                corpus: RwLock::new(Corpus::new()),
                config,
            }),
        })
    }
}

#[cfg(feature = "pdf")]
fn default_extractor() -> Arc<dyn TextExtractor> {
    Arc::new(crate::extract::SniffingExtractor)
}

#[cfg(not(feature = "pdf"))]
fn default_extractor() -> Arc<dyn TextExtractor> {
    Arc::new(crate::extract::PlainTextExtractor)
}
