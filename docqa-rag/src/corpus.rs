//! In-memory corpus: documents, chunks and their vectors.
//!
//! Chunk `i` in [`Corpus::chunks`] is backed by vector `i` in the index.
//! Mutation goes through [`Corpus::append`] and [`Corpus::clear`], which keep
//! the two in step.

use crate::document::{Chunk, DocumentSummary};
use crate::error::{IngestionError, RagError, Result};
use crate::index::EmbeddingIndex;

/// Everything the engine knows, guarded as one unit.
#[derive(Debug, Default)]
pub struct Corpus {
    documents: Vec<DocumentSummary>,
    chunks: Vec<Chunk>,
    index: EmbeddingIndex,
}

impl Corpus {
    /// An empty corpus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ingested documents, in ingest order.
    pub fn documents(&self) -> &[DocumentSummary] {
        &self.documents
    }

    /// All chunks, in insertion order.
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// The vector index parallel to [`chunks`](Self::chunks).
    pub fn index(&self) -> &EmbeddingIndex {
        &self.index
    }

    /// Number of stored chunks.
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Number of stored vectors.
    pub fn vector_count(&self) -> usize {
        self.index.len()
    }

    /// Whether nothing is indexed.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Whether a document with this id has been ingested.
    pub fn contains(&self, document_id: &str) -> bool {
        self.documents.iter().any(|d| d.document_id == document_id)
    }

    /// Append one document's chunks and vectors.
    ///
    /// Either everything is stored or nothing is: the id and the vector
    /// batch are validated before any state changes.
    pub fn append(
        &mut self,
        summary: DocumentSummary,
        chunks: Vec<Chunk>,
        vectors: Vec<Vec<f32>>,
    ) -> Result<()> {
        if self.contains(&summary.document_id) {
            let document_id = summary.document_id;
            return Err(IngestionError::DuplicateDocument { document_id }.into());
        }
        if chunks.is_empty() {
            return Err(IngestionError::NoChunks { document_id: summary.document_id }.into());
        }
        if chunks.len() != vectors.len() {
            return Err(RagError::Embedding {
                provider: "embedding".to_string(),
                message: format!(
                    "expected {} vectors for document '{}', got {}",
                    chunks.len(),
                    summary.document_id,
                    vectors.len()
                ),
            });
        }

        // Validates the batch up front; no partial insert is possible.
        self.index.insert(vectors)?;
        self.chunks.extend(chunks);
        self.documents.push(summary);
        Ok(())
    }

    /// Drop all documents, chunks and vectors.
    pub fn clear(&mut self) {
        self.documents.clear();
        self.chunks.clear();
        self.index.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IndexError;

    fn chunks(doc: &str, n: usize) -> Vec<Chunk> {
        (0..n)
            .map(|i| Chunk {
                document_id: doc.to_string(),
                sequence: i,
                offset: i * 10,
                text: format!("{doc} chunk {i}"),
            })
            .collect()
    }

    fn summary(doc: &str, n: usize) -> DocumentSummary {
        DocumentSummary { document_id: doc.to_string(), chunk_count: n, char_count: 10 * n }
    }

    #[test]
    fn append_keeps_chunks_and_vectors_in_step() {
        let mut corpus = Corpus::new();
        corpus
            .append(summary("a", 2), chunks("a", 2), vec![vec![1.0, 0.0], vec![0.0, 1.0]])
            .unwrap();
        assert_eq!(corpus.chunk_count(), 2);
        assert_eq!(corpus.vector_count(), 2);
        assert!(corpus.contains("a"));
    }

    #[test]
    fn rejected_appends_leave_state_untouched() {
        let mut corpus = Corpus::new();
        corpus.append(summary("a", 1), chunks("a", 1), vec![vec![1.0, 0.0]]).unwrap();

        let dup = corpus.append(summary("a", 1), chunks("a", 1), vec![vec![1.0, 0.0]]).unwrap_err();
        assert_eq!(dup.kind(), "duplicate_document");

        let mismatch = corpus.append(summary("b", 1), chunks("b", 1), vec![vec![1.0]]).unwrap_err();
        assert!(matches!(mismatch, RagError::Index(IndexError::DimensionMismatch { .. })));

        let short =
            corpus.append(summary("c", 2), chunks("c", 2), vec![vec![1.0, 0.0]]).unwrap_err();
        assert_eq!(short.kind(), "embedding_failed");

        assert_eq!(corpus.chunk_count(), 1);
        assert_eq!(corpus.vector_count(), 1);
        assert_eq!(corpus.documents().len(), 1);
    }

    #[test]
    fn clear_empties_everything() {
        let mut corpus = Corpus::new();
        corpus.append(summary("a", 1), chunks("a", 1), vec![vec![1.0, 0.0]]).unwrap();
        corpus.clear();
        assert!(corpus.is_empty());
        assert_eq!(corpus.vector_count(), 0);
        assert!(corpus.documents().is_empty());
        assert_eq!(corpus.index().dimensions(), None);
    }
}
