//! Append-only embedding index with exact cosine search.
//!
//! Vectors are L2-normalized on insert and stored contiguously, so search is
//! a single pass of dot products. The first non-empty insert fixes the
//! dimensionality; [`EmbeddingIndex::reset`] clears it again.

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::error::IndexError;

/// A search hit: the vector's insertion position and its cosine similarity.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SearchHit {
    /// Insertion position of the vector (parallel to chunk storage).
    pub position: usize,
    /// Cosine similarity to the query.
    pub score: f32,
}

/// Exact nearest-neighbour index over unit vectors.
#[derive(Debug, Clone, Default)]
pub struct EmbeddingIndex {
    dimensions: Option<usize>,
    data: Vec<f32>,
}

/// Scale `vector` to unit length in place. Zero vectors are left unchanged.
pub fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        vector.iter_mut().for_each(|x| *x /= norm);
    }
}

/// Inner product of two equal-length vectors.
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

impl EmbeddingIndex {
    /// Create an empty index with no dimensionality.
    pub fn new() -> Self {
        Self::default()
    }

    /// The dimensionality fixed by the first insert, if any.
    pub fn dimensions(&self) -> Option<usize> {
        self.dimensions
    }

    /// Number of stored vectors.
    pub fn len(&self) -> usize {
        match self.dimensions {
            Some(d) if d > 0 => self.data.len() / d,
            _ => 0,
        }
    }

    /// Whether nothing has been inserted.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check a batch against the established (or implied) dimensionality
    /// without modifying the index.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::DimensionMismatch`] for the first vector whose
    /// length differs from the index's dimensionality, or from the first
    /// vector of the batch when the index has none yet.
    pub fn check(&self, vectors: &[Vec<f32>]) -> Result<(), IndexError> {
        let Some(first) = vectors.first() else {
            return Ok(());
        };
        let expected = self.dimensions.unwrap_or(first.len());
        match vectors.iter().find(|v| v.len() != expected || v.is_empty()) {
            Some(bad) => Err(IndexError::DimensionMismatch { expected, actual: bad.len() }),
            None => Ok(()),
        }
    }

    /// Append a batch of vectors, normalizing each.
    ///
    /// The batch is validated in full before anything is stored, so a failed
    /// insert leaves the index untouched. Returns the positions assigned.
    pub fn insert(&mut self, vectors: Vec<Vec<f32>>) -> Result<Range<usize>, IndexError> {
        self.check(&vectors)?;
        let start = self.len();
        let Some(first) = vectors.first() else {
            return Ok(start..start);
        };
        let dimensions = *self.dimensions.get_or_insert(first.len());

        self.data.reserve(vectors.len() * dimensions);
        for mut vector in vectors {
            normalize(&mut vector);
            self.data.extend_from_slice(&vector);
        }
        Ok(start..self.len())
    }

    /// The stored (normalized) vector at `position`.
    pub fn vector(&self, position: usize) -> Option<&[f32]> {
        let d = self.dimensions?;
        self.data.get(position * d..(position + 1) * d)
    }

    /// The `k` most similar vectors to `query`, best first.
    ///
    /// # Errors
    ///
    /// [`IndexError::Empty`] when nothing is indexed, and
    /// [`IndexError::DimensionMismatch`] when `query` has the wrong length.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>, IndexError> {
        self.search_where(query, k, |_| true)
    }

    /// Like [`search`](Self::search), restricted to positions accepted by `filter`.
    ///
    /// Returns an empty list when no stored position passes the filter.
    /// Ties in score are broken by insertion order, earlier first.
    pub fn search_where<F>(
        &self,
        query: &[f32],
        k: usize,
        filter: F,
    ) -> Result<Vec<SearchHit>, IndexError>
    where
        F: Fn(usize) -> bool,
    {
        let dimensions = match self.dimensions {
            Some(d) if !self.data.is_empty() => d,
            _ => return Err(IndexError::Empty),
        };
        if query.len() != dimensions {
            return Err(IndexError::DimensionMismatch { expected: dimensions, actual: query.len() });
        }

        let mut query = query.to_vec();
        normalize(&mut query);

        let mut hits: Vec<SearchHit> = self
            .data
            .chunks_exact(dimensions)
            .enumerate()
            .filter(|(position, _)| filter(*position))
            .map(|(position, vector)| SearchHit { position, score: dot(&query, vector) })
            .collect();

        hits.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.position.cmp(&b.position)));
        hits.truncate(k);
        Ok(hits)
    }

    /// Remove every vector and forget the dimensionality.
    pub fn reset(&mut self) {
        self.dimensions = None;
        self.data.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_insert_fixes_dimensions() {
        let mut index = EmbeddingIndex::new();
        assert_eq!(index.insert(vec![vec![1.0, 0.0], vec![0.0, 2.0]]).unwrap(), 0..2);
        assert_eq!(index.dimensions(), Some(2));

        let err = index.insert(vec![vec![1.0, 0.0, 0.0]]).unwrap_err();
        assert_eq!(err, IndexError::DimensionMismatch { expected: 2, actual: 3 });
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn mixed_batch_is_rejected_atomically() {
        let mut index = EmbeddingIndex::new();
        let err = index.insert(vec![vec![1.0, 0.0], vec![1.0]]).unwrap_err();
        assert_eq!(err, IndexError::DimensionMismatch { expected: 2, actual: 1 });
        assert!(index.is_empty());
        assert_eq!(index.dimensions(), None);
    }

    #[test]
    fn vectors_are_stored_normalized() {
        let mut index = EmbeddingIndex::new();
        index.insert(vec![vec![3.0, 4.0]]).unwrap();
        let v = index.vector(0).unwrap();
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
        assert!(index.vector(1).is_none());
    }

    #[test]
    fn search_on_empty_index_fails() {
        let index = EmbeddingIndex::new();
        assert_eq!(index.search(&[1.0, 0.0], 3).unwrap_err(), IndexError::Empty);
    }

    #[test]
    fn search_orders_by_score_then_insertion() {
        let mut index = EmbeddingIndex::new();
        index
            .insert(vec![vec![0.0, 1.0], vec![1.0, 0.0], vec![2.0, 0.0], vec![1.0, 1.0]])
            .unwrap();

        let hits = index.search(&[1.0, 0.0], 10).unwrap();
        let positions: Vec<usize> = hits.iter().map(|h| h.position).collect();
        assert_eq!(positions, vec![1, 2, 3, 0]);
        assert!((hits[0].score - 1.0).abs() < 1e-6);

        assert_eq!(index.search(&[1.0, 0.0], 2).unwrap().len(), 2);
    }

    #[test]
    fn filtered_search_only_scans_accepted_positions() {
        let mut index = EmbeddingIndex::new();
        index.insert(vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![0.5, 0.5]]).unwrap();

        let hits = index.search_where(&[1.0, 0.0], 5, |p| p != 0).unwrap();
        let positions: Vec<usize> = hits.iter().map(|h| h.position).collect();
        assert_eq!(positions, vec![2, 1]);

        assert!(index.search_where(&[1.0, 0.0], 5, |_| false).unwrap().is_empty());
    }

    #[test]
    fn reset_forgets_dimensions() {
        let mut index = EmbeddingIndex::new();
        index.insert(vec![vec![1.0, 0.0]]).unwrap();
        index.reset();
        assert!(index.is_empty());
        assert_eq!(index.dimensions(), None);
        assert!(index.insert(vec![vec![1.0, 0.0, 0.0]]).is_ok());
    }
}
