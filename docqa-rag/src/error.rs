//! Error types for the `docqa-rag` crate.
//!
//! Failures are grouped the way callers need to react to them: ingestion
//! problems reject a single document, index problems indicate inconsistent
//! embeddings, retrieval problems are user-facing conditions, and generation
//! problems come from the text-generation provider. Every variant is a value;
//! nothing in the engine panics on a recoverable failure.

use std::time::Duration;

use thiserror::Error;

/// Reasons a document is rejected at ingest time. Prior engine state is
/// never modified when one of these is returned.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IngestionError {
    /// The extractor could not read the source bytes or file.
    #[error("unreadable source: {0}")]
    UnreadableSource(String),

    /// The extractor succeeded but produced no text.
    #[error("document '{document_id}' contains no extractable text")]
    EmptyText {
        /// The rejected document.
        document_id: String,
    },

    /// Chunking produced nothing (the text was whitespace only).
    #[error("document '{document_id}' produced no chunks")]
    NoChunks {
        /// The rejected document.
        document_id: String,
    },

    /// A document with the same identifier is already indexed.
    #[error("document '{document_id}' is already ingested")]
    DuplicateDocument {
        /// The conflicting identifier.
        document_id: String,
    },

    /// Raw bytes were supplied without a document identifier.
    #[error("a document id is required when ingesting raw bytes")]
    MissingDocumentId,
}

/// Errors raised by the [`EmbeddingIndex`](crate::EmbeddingIndex).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IndexError {
    /// A vector's length differs from the dimensionality fixed by the first insert.
    #[error("dimension mismatch: index holds {expected}-d vectors, got {actual}")]
    DimensionMismatch {
        /// The established dimensionality.
        expected: usize,
        /// The offending vector's length.
        actual: usize,
    },

    /// Search was attempted before anything was inserted.
    #[error("index empty")]
    Empty,
}

/// User-facing retrieval conditions.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RetrievalError {
    /// Nothing is indexed yet.
    #[error("not ready, ingest a document first")]
    NotReady,

    /// The requested document has no indexed chunks.
    #[error("no context for requested document '{document_id}'")]
    NoContextForDocument {
        /// The document filter that matched nothing.
        document_id: String,
    },
}

/// Failures of the text-generation provider. Never retried automatically.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GenerationError {
    /// Network or HTTP-level failure.
    #[error("generation request failed ({provider}): {message}")]
    Request {
        /// The generation provider that failed.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// The provider did not answer before the deadline.
    #[error("generation timed out ({provider}) after {after:?}")]
    Timeout {
        /// The generation provider that timed out.
        provider: String,
        /// The deadline that elapsed.
        after: Duration,
    },

    /// The provider answered with something that could not be decoded.
    #[error("malformed generation response ({provider}): {message}")]
    MalformedResponse {
        /// The generation provider that produced the response.
        provider: String,
        /// A description of what was wrong.
        message: String,
    },
}

/// Errors that can occur in engine operations.
#[derive(Debug, Error)]
pub enum RagError {
    /// A document was rejected at ingest time.
    #[error(transparent)]
    Ingestion(#[from] IngestionError),

    /// The embedding index rejected an operation.
    #[error(transparent)]
    Index(#[from] IndexError),

    /// Retrieval could not produce any context.
    #[error(transparent)]
    Retrieval(#[from] RetrievalError),

    /// The embedding provider failed.
    #[error("Embedding error ({provider}): {message}")]
    Embedding {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// The generation provider failed.
    #[error(transparent)]
    Generation(#[from] GenerationError),

    /// The query itself is unusable (empty question, `top_k == 0`).
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// A configuration validation error.
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl RagError {
    /// A stable, machine-readable tag for this error.
    pub fn kind(&self) -> &'static str {
        match self {
            RagError::Ingestion(IngestionError::UnreadableSource(_)) => "unreadable_source",
            RagError::Ingestion(IngestionError::EmptyText { .. }) => "empty_text",
            RagError::Ingestion(IngestionError::NoChunks { .. }) => "no_chunks",
            RagError::Ingestion(IngestionError::DuplicateDocument { .. }) => "duplicate_document",
            RagError::Ingestion(IngestionError::MissingDocumentId) => "missing_document_id",
            RagError::Index(IndexError::DimensionMismatch { .. }) => "dimension_mismatch",
            RagError::Index(IndexError::Empty) => "index_empty",
            RagError::Retrieval(RetrievalError::NotReady) => "not_ready",
            RagError::Retrieval(RetrievalError::NoContextForDocument { .. }) => {
                "no_context_for_document"
            }
            RagError::Embedding { .. } => "embedding_failed",
            RagError::Generation(GenerationError::Request { .. }) => "generation_failed",
            RagError::Generation(GenerationError::Timeout { .. }) => "generation_timeout",
            RagError::Generation(GenerationError::MalformedResponse { .. }) => {
                "generation_malformed"
            }
            RagError::InvalidQuery(_) => "invalid_query",
            RagError::ConfigError(_) => "config",
        }
    }

    /// Whether this is the "nothing ingested yet" condition.
    pub fn is_not_ready(&self) -> bool {
        matches!(self, RagError::Retrieval(RetrievalError::NotReady))
    }
}

/// A convenience result type for engine operations.
pub type Result<T> = std::result::Result<T, RagError>;
