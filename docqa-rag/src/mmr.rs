//! Maximal Marginal Relevance selection.
//!
//! Greedy, exact MMR: at each step every remaining candidate is scored as
//!
//! ```text
//! λ · relevance(c) − (1 − λ) · max_{s ∈ selected} sim(c, s)
//! ```
//!
//! and the maximizer is moved to the selection. Ties go to the higher
//! relevance, then to the lower sequence number, then to the earlier
//! position. Cost is `O(k · |candidates|)` similarity evaluations.
//!
//! `λ = 1` degenerates to plain relevance ranking.

use std::cmp::Ordering;

use crate::index::dot;

/// A candidate for selection.
#[derive(Debug, Clone, Copy)]
pub struct MmrCandidate<'a> {
    /// Index position, returned in the selection.
    pub position: usize,
    /// Chunk sequence number, used for tie-breaking.
    pub sequence: usize,
    /// Cosine similarity to the query.
    pub relevance: f32,
    /// The candidate's unit vector.
    pub vector: &'a [f32],
}

/// Select up to `k` candidates by MMR. Returns `(position, relevance)` in
/// selection order.
pub fn mmr_select(candidates: &[MmrCandidate<'_>], k: usize, lambda: f32) -> Vec<(usize, f32)> {
    let k = k.min(candidates.len());
    let mut remaining: Vec<usize> = (0..candidates.len()).collect();
    // Highest similarity to anything selected so far, per candidate.
    let mut redundancy = vec![0.0f32; candidates.len()];
    let mut selected = Vec::with_capacity(k);

    while selected.len() < k {
        let mut best: Option<(usize, f32)> = None;
        for (slot, &idx) in remaining.iter().enumerate() {
            let c = &candidates[idx];
            let score = lambda * c.relevance - (1.0 - lambda) * redundancy[idx];
            let better = match best {
                None => true,
                Some((best_slot, best_score)) => {
                    let b = &candidates[remaining[best_slot]];
                    score
                        .total_cmp(&best_score)
                        .then(c.relevance.total_cmp(&b.relevance))
                        .then(b.sequence.cmp(&c.sequence))
                        .then(b.position.cmp(&c.position))
                        == Ordering::Greater
                }
            };
            if better {
                best = Some((slot, score));
            }
        }

        let Some((slot, _)) = best else { break };
        let chosen = remaining.swap_remove(slot);
        let chosen_vector = candidates[chosen].vector;
        for &idx in &remaining {
            let sim = dot(candidates[idx].vector, chosen_vector);
            if selected.is_empty() || sim > redundancy[idx] {
                redundancy[idx] = sim;
            }
        }
        selected.push((candidates[chosen].position, candidates[chosen].relevance));
    }

    selected
}
