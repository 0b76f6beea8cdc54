//! Document chunking.
//!
//! This module provides the [`Chunker`] trait and [`FixedSizeChunker`], which
//! splits text into overlapping windows measured in characters.

use crate::document::{Chunk, Document};
use crate::error::{RagError, Result};

/// A strategy for splitting documents into chunks.
pub trait Chunker: Send + Sync {
    /// Split a document into chunks.
    ///
    /// Returns an empty `Vec` if the document has no non-whitespace text.
    /// Sequence numbers are assigned in emission order starting at 0.
    fn chunk(&self, document: &Document) -> Vec<Chunk>;
}

/// Splits text into fixed-size windows with configurable overlap.
///
/// Window `i` covers characters `[i * step, i * step + chunk_size)` where
/// `step = chunk_size - chunk_overlap`. Each window is trimmed; windows that
/// trim to nothing are dropped without consuming a sequence number. The walk
/// stops at the first window that reaches the end of the text.
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::{Chunker, Document, FixedSizeChunker};
///
/// let chunker = FixedSizeChunker::new(800, 150)?;
/// let chunks = chunker.chunk(&Document::new("report.pdf", text));
/// ```
#[derive(Debug, Clone)]
pub struct FixedSizeChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl FixedSizeChunker {
    /// Create a new `FixedSizeChunker`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] unless `0 <= chunk_overlap < chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_overlap >= chunk_size {
            return Err(RagError::ConfigError(format!(
                "chunk_overlap ({chunk_overlap}) must be less than chunk_size ({chunk_size})"
            )));
        }
        Ok(Self { chunk_size, chunk_overlap })
    }

    /// Maximum window length in characters.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Characters shared by consecutive windows.
    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    fn step(&self) -> usize {
        self.chunk_size - self.chunk_overlap
    }
}

impl Chunker for FixedSizeChunker {
    fn chunk(&self, document: &Document) -> Vec<Chunk> {
        let text = &document.text;
        // Byte offset of every char boundary, plus the end of the text.
        let bounds: Vec<usize> =
            text.char_indices().map(|(i, _)| i).chain(std::iter::once(text.len())).collect();
        let char_len = bounds.len() - 1;

        let mut chunks = Vec::new();
        let mut start = 0;

        while start < char_len {
            let end = (start + self.chunk_size).min(char_len);
            let piece = text[bounds[start]..bounds[end]].trim();

            if !piece.is_empty() {
                chunks.push(Chunk {
                    document_id: document.id.clone(),
                    sequence: chunks.len(),
                    offset: start,
                    text: piece.to_string(),
                });
            }

            if end == char_len {
                break;
            }
            start += self.step();
        }

        chunks
    }
}
