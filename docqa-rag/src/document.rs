//! Data types for documents, chunks, queries, and answers.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::intent::QueryIntent;

/// An ingested source document. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Document {
    /// Unique identifier for the document.
    pub id: String,
    /// The raw extracted text.
    pub text: String,
}

impl Document {
    /// Create a document from an identifier and its extracted text.
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self { id: id.into(), text: text.into() }
    }
}

/// A contiguous excerpt of a [`Document`].
///
/// Identity is `(document_id, sequence)`. Sequence numbers start at 0 and are
/// contiguous per document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chunk {
    /// The ID of the parent [`Document`].
    pub document_id: String,
    /// Position of this chunk within its document.
    pub sequence: usize,
    /// Start of the chunk's window, in characters from the start of the document.
    pub offset: usize,
    /// The trimmed text of the chunk.
    pub text: String,
}

impl Chunk {
    /// The citation identifying this chunk.
    pub fn citation(&self) -> Citation {
        Citation { document_id: self.document_id.clone(), sequence: self.sequence }
    }
}

/// A `(document_id, sequence)` pair identifying the chunk backing an answer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Citation {
    /// The cited document.
    pub document_id: String,
    /// The cited chunk within that document.
    pub sequence: usize,
}

/// Where the text of a document comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestSource {
    /// Raw file contents, e.g. an upload.
    Bytes(Vec<u8>),
    /// A file on the local filesystem.
    Path(PathBuf),
}

impl IngestSource {
    /// Wrap raw bytes.
    pub fn bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self::Bytes(bytes.into())
    }

    /// Wrap a filesystem path.
    pub fn path(path: impl Into<PathBuf>) -> Self {
        Self::Path(path.into())
    }

    /// The file name of a path source, used as the default document id.
    pub fn file_name(&self) -> Option<String> {
        match self {
            Self::Bytes(_) => None,
            Self::Path(path) => path.file_name().map(|name| name.to_string_lossy().into_owned()),
        }
    }
}

/// A question addressed to the engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Query {
    /// The natural-language question.
    pub question: String,
    /// Requested number of context chunks; the engine default when `None`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<usize>,
    /// Restrict retrieval to this document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
}

impl Query {
    /// A query using the engine's default `top_k` and no document filter.
    pub fn new(question: impl Into<String>) -> Self {
        Self { question: question.into(), top_k: None, document_id: None }
    }

    /// Set the number of context chunks.
    pub fn top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }

    /// Restrict retrieval to one document.
    pub fn document(mut self, document_id: impl Into<String>) -> Self {
        self.document_id = Some(document_id.into());
        self
    }
}

/// A chunk chosen for the context, with its similarity to the question.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievedChunk {
    /// The selected chunk.
    pub chunk: Chunk,
    /// Cosine similarity between the chunk and the question.
    pub relevance: f32,
}

/// The outcome of retrieval: the context handed to the generator and the
/// chunks it was built from, in the same order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievalResult {
    /// Intent the retrieval was tuned for.
    pub intent: QueryIntent,
    /// Chunks whose full text is in `context`, in context order.
    pub chunks: Vec<RetrievedChunk>,
    /// Concatenated chunk texts separated by blank lines.
    pub context: String,
}

impl RetrievalResult {
    /// Citations for every chunk in the context, in context order.
    pub fn citations(&self) -> Vec<Citation> {
        self.chunks.iter().map(|c| c.chunk.citation()).collect()
    }
}

/// A generated answer with its supporting citations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Answer {
    /// The answer text. Never empty.
    pub answer: String,
    /// The intent the question was classified as.
    pub intent: QueryIntent,
    /// The chunks the answer was grounded on.
    pub sources: Vec<Citation>,
}

/// Summary of a successful ingest.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IngestReport {
    /// The identifier the document was stored under.
    pub document_id: String,
    /// Chunks created for this document.
    pub chunks_added: usize,
    /// Chunks indexed across all documents after the ingest.
    pub total_chunks: usize,
}

/// An ingested document as listed by the engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DocumentSummary {
    /// The document identifier.
    pub document_id: String,
    /// Number of chunks indexed for it.
    pub chunk_count: usize,
    /// Length of the extracted text in characters.
    pub char_count: usize,
}
