//! Context retrieval: candidate search, MMR re-ranking and budgeted assembly.
//!
//! A retrieval runs in four steps:
//!
//! 1. size the candidate pool for the query intent,
//! 2. exact search over the index (restricted to one document if asked),
//! 3. greedy MMR selection of `k = min(top_k, |candidates|)` chunks,
//! 4. whole-chunk context assembly against the intent's character budget.
//!
//! Summary retrievals re-sort the selection by `(document_id, sequence)`
//! before assembly so the context reads in document order.

use tracing::debug;

use crate::config::{RagConfig, RetrievalProfile};
use crate::corpus::Corpus;
use crate::document::{Query, RetrievalResult, RetrievedChunk};
use crate::error::{RagError, Result, RetrievalError};
use crate::intent::QueryIntent;
use crate::mmr::{MmrCandidate, mmr_select};

/// Separator placed between chunk texts in the assembled context.
pub const CONTEXT_SEPARATOR: &str = "\n\n";

/// Builds grounded context for a question from the corpus.
#[derive(Debug, Clone)]
pub struct Retriever {
    factual: RetrievalProfile,
    summary: RetrievalProfile,
    default_top_k: usize,
}

impl Retriever {
    /// Create a retriever from the two intent profiles.
    pub fn new(factual: RetrievalProfile, summary: RetrievalProfile) -> Self {
        Self { factual, summary, default_top_k: RagConfig::default().default_top_k }
    }

    /// Create a retriever from the retrieval settings of `config`.
    pub fn from_config(config: &RagConfig) -> Self {
        Self::new(config.factual.clone(), config.summary.clone())
            .with_default_top_k(config.default_top_k)
    }

    /// Set the `top_k` used when a query leaves it unspecified.
    pub fn with_default_top_k(mut self, top_k: usize) -> Self {
        self.default_top_k = top_k;
        self
    }

    /// The profile for `intent`.
    pub fn profile(&self, intent: QueryIntent) -> &RetrievalProfile {
        match intent {
            QueryIntent::Factual => &self.factual,
            QueryIntent::Summary => &self.summary,
        }
    }

    /// The effective `top_k` for `query`.
    pub fn top_k(&self, query: &Query) -> usize {
        query.top_k.unwrap_or(self.default_top_k)
    }

    /// Candidate pool size: `min(total, min(ceiling, max(floor, multiplier * top_k)))`.
    pub fn pool_size(&self, total: usize, top_k: usize, intent: QueryIntent) -> usize {
        let p = self.profile(intent);
        let wanted = p.pool_floor.max(p.pool_multiplier.saturating_mul(top_k));
        total.min(p.pool_ceiling.min(wanted))
    }

    /// Retrieve context for `query`, whose embedding is `query_vector`.
    ///
    /// # Errors
    ///
    /// - [`RetrievalError::NotReady`] when the corpus is empty.
    /// - [`RetrievalError::NoContextForDocument`] when the query's document
    ///   filter matches no chunk.
    /// - [`RagError::InvalidQuery`] when `top_k` resolves to zero.
    /// - [`RagError::Index`] when the query vector has the wrong dimensionality.
    pub fn retrieve(
        &self,
        corpus: &Corpus,
        query_vector: &[f32],
        query: &Query,
        intent: QueryIntent,
    ) -> Result<RetrievalResult> {
        if corpus.is_empty() {
            return Err(RetrievalError::NotReady.into());
        }
        let top_k = self.top_k(query);
        if top_k == 0 {
            return Err(RagError::InvalidQuery("top_k must be greater than zero".to_string()));
        }

        let profile = self.profile(intent);
        let chunks = corpus.chunks();
        let pool = self.pool_size(chunks.len(), top_k, intent);

        let hits = match query.document_id.as_deref() {
            Some(document_id) => {
                let hits = corpus.index().search_where(query_vector, pool, |position| {
                    chunks.get(position).is_some_and(|c| c.document_id == document_id)
                })?;
                if hits.is_empty() {
                    return Err(RetrievalError::NoContextForDocument {
                        document_id: document_id.to_string(),
                    }
                    .into());
                }
                hits
            }
            None => corpus.index().search(query_vector, pool)?,
        };

        let candidates: Vec<MmrCandidate<'_>> = hits
            .iter()
            .filter_map(|hit| {
                let chunk = chunks.get(hit.position)?;
                let vector = corpus.index().vector(hit.position)?;
                Some(MmrCandidate {
                    position: hit.position,
                    sequence: chunk.sequence,
                    relevance: hit.score,
                    vector,
                })
            })
            .collect();

        let k = top_k.min(candidates.len());
        let mut selected: Vec<RetrievedChunk> = mmr_select(&candidates, k, profile.mmr_lambda)
            .into_iter()
            .filter_map(|(position, relevance)| {
                chunks.get(position).map(|chunk| RetrievedChunk { chunk: chunk.clone(), relevance })
            })
            .collect();

        if intent == QueryIntent::Summary {
            selected.sort_by(|a, b| {
                a.chunk
                    .document_id
                    .cmp(&b.chunk.document_id)
                    .then(a.chunk.sequence.cmp(&b.chunk.sequence))
            });
        }

        let budget = profile.context_budget.for_selection(k);
        let result = assemble(intent, selected, budget);

        debug!(
            %intent,
            pool,
            candidates = candidates.len(),
            selected = k,
            included = result.chunks.len(),
            budget,
            context_chars = result.context.chars().count(),
            "retrieved context"
        );
        Ok(result)
    }
}

impl Default for Retriever {
    fn default() -> Self {
        Self::from_config(&RagConfig::default())
    }
}

/// Concatenate whole chunks until the next one would push the total chunk
/// text past `budget` characters. Separators are not counted.
fn assemble(intent: QueryIntent, selected: Vec<RetrievedChunk>, budget: usize) -> RetrievalResult {
    let mut used = 0;
    let mut included = Vec::with_capacity(selected.len());

    for retrieved in selected {
        let len = retrieved.chunk.text.chars().count();
        if used + len > budget {
            break;
        }
        used += len;
        included.push(retrieved);
    }

    let context = included
        .iter()
        .map(|r| r.chunk.text.as_str())
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR);

    RetrievalResult { intent, chunks: included, context }
}
