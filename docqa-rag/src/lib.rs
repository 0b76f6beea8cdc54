//! Hybrid retrieval engine for document question answering.
//!
//! This crate provides:
//! - Character-window chunking with overlap
//! - An append-only, exact cosine-similarity embedding index
//! - Keyword-based summary/factual query classification
//! - Greedy Maximal Marginal Relevance re-ranking
//! - Whole-chunk context assembly under per-intent budgets, with citations
//! - Prompt templates and summary post-processing that never yields an empty answer
//! - [`RagEngine`], which ties these together behind a readers-writer lock
//!
//! Text extraction, embedding and generation are pluggable through
//! [`TextExtractor`], [`EmbeddingProvider`] and [`GenerationProvider`].
//!
//! # Features
//!
//! - `openai`: OpenAI-compatible embedding and chat-completion providers
//! - `pdf`: PDF text extraction via `lopdf`
//! - `full`: both of the above

pub mod chunking;
pub mod config;
pub mod corpus;
pub mod document;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod extract;
pub mod generation;
pub mod index;
pub mod intent;
pub mod mmr;
pub mod prompt;
pub mod retriever;

#[cfg(feature = "openai")]
pub mod openai;

pub use chunking::{Chunker, FixedSizeChunker};
pub use config::{ContextBudget, RagConfig, RagConfigBuilder, RetrievalProfile};
pub use corpus::Corpus;
pub use document::{
    Answer, Chunk, Citation, Document, DocumentSummary, IngestReport, IngestSource, Query,
    RetrievalResult, RetrievedChunk,
};
pub use embedding::EmbeddingProvider;
pub use engine::{
    AnswerStream, EngineState, EngineStatus, RagEngine, RagEngineBuilder, StreamFragment,
};
pub use error::{GenerationError, IndexError, IngestionError, RagError, Result, RetrievalError};
pub use extract::{PlainTextExtractor, TextExtractor};
#[cfg(feature = "pdf")]
pub use extract::{PdfExtractor, SniffingExtractor};
pub use generation::{GenerationProvider, GenerationRequest, TextStream};
pub use index::{EmbeddingIndex, SearchHit};
pub use intent::{QueryClassifier, QueryIntent};
pub use mmr::{MmrCandidate, mmr_select};
pub use prompt::{PromptBuilder, SummaryFields, SummaryOutput};
pub use retriever::Retriever;
