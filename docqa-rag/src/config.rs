//! Configuration for the retrieval engine.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};
use crate::intent::{QueryIntent, english_summary_cues};

/// Character budget for assembled context: `min(max, max(base, per_chunk * k))`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContextBudget {
    /// Budget used when `per_chunk * k` is smaller.
    pub base: usize,
    /// Budget granted per selected chunk.
    pub per_chunk: usize,
    /// Absolute ceiling.
    pub max: usize,
}

impl ContextBudget {
    /// A budget that does not scale with `k`.
    pub const fn flat(chars: usize) -> Self {
        Self { base: chars, per_chunk: 0, max: chars }
    }

    /// Resolve the budget for `k` selected chunks.
    pub fn for_selection(&self, k: usize) -> usize {
        self.max.min(self.base.max(self.per_chunk.saturating_mul(k)))
    }
}

/// Retrieval and generation knobs for one query intent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievalProfile {
    /// Minimum number of nearest-neighbour candidates.
    pub pool_floor: usize,
    /// Candidates fetched per requested result.
    pub pool_multiplier: usize,
    /// Upper bound on the candidate pool; bounds MMR cost.
    pub pool_ceiling: usize,
    /// MMR trade-off in `(0, 1]`; `1.0` is plain relevance ranking.
    pub mmr_lambda: f32,
    /// Context size limit in characters.
    pub context_budget: ContextBudget,
    /// Generation length limit.
    pub max_tokens: u32,
    /// Generation sampling temperature.
    pub temperature: f32,
}

impl RetrievalProfile {
    /// Precision-oriented defaults for factual questions.
    pub fn factual() -> Self {
        Self {
            pool_floor: 12,
            pool_multiplier: 2,
            pool_ceiling: 256,
            mmr_lambda: 0.65,
            context_budget: ContextBudget::flat(2000),
            max_tokens: 300,
            temperature: 0.0,
        }
    }

    /// Recall-oriented defaults for summary questions.
    pub fn summary() -> Self {
        Self {
            pool_floor: 48,
            pool_multiplier: 8,
            pool_ceiling: 256,
            mmr_lambda: 0.82,
            context_budget: ContextBudget { base: 3200, per_chunk: 900, max: 12000 },
            max_tokens: 700,
            temperature: 0.15,
        }
    }

    fn validate(&self, name: &str, chunk_size: usize) -> Result<()> {
        if !(self.mmr_lambda > 0.0 && self.mmr_lambda <= 1.0) {
            return Err(RagError::ConfigError(format!(
                "{name}.mmr_lambda ({}) must be in (0, 1]",
                self.mmr_lambda
            )));
        }
        if self.pool_floor == 0 || self.pool_multiplier == 0 || self.pool_ceiling == 0 {
            return Err(RagError::ConfigError(format!(
                "{name} pool floor, multiplier and ceiling must be greater than zero"
            )));
        }
        if self.context_budget.base > self.context_budget.max {
            return Err(RagError::ConfigError(format!(
                "{name}.context_budget.base ({}) exceeds its max ({})",
                self.context_budget.base, self.context_budget.max
            )));
        }
        if chunk_size > self.context_budget.base {
            return Err(RagError::ConfigError(format!(
                "chunk_size ({chunk_size}) must fit in the {name} context budget ({})",
                self.context_budget.base
            )));
        }
        if self.max_tokens == 0 {
            return Err(RagError::ConfigError(format!(
                "{name}.max_tokens must be greater than zero"
            )));
        }
        Ok(())
    }
}

/// Configuration parameters for the engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RagConfig {
    /// Chunk window size in characters.
    pub chunk_size: usize,
    /// Number of overlapping characters between consecutive chunks.
    pub chunk_overlap: usize,
    /// Number of results used when a query does not specify one.
    pub default_top_k: usize,
    /// Profile for factual questions.
    pub factual: RetrievalProfile,
    /// Profile for summary questions.
    pub summary: RetrievalProfile,
    /// Lower-case cue phrases that mark a question as a summary request.
    pub summary_cues: Vec<String>,
    /// Language the generator is instructed to answer in.
    pub language: String,
    /// Sentence returned when the answer is not in the context.
    pub not_found_answer: String,
    /// Phrases marking echoed instructions in unstructured summary output.
    pub boilerplate_markers: Vec<String>,
    /// Deadline for a generation call, and for each streamed fragment.
    pub generation_timeout_ms: u64,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            chunk_size: 800,
            chunk_overlap: 150,
            default_top_k: 6,
            factual: RetrievalProfile::factual(),
            summary: RetrievalProfile::summary(),
            summary_cues: english_summary_cues(),
            language: "English".to_string(),
            not_found_answer: "This information was not found in the document.".to_string(),
            boilerplate_markers: vec![
                "question-answering assistant".to_string(),
                "rules:".to_string(),
                "context:".to_string(),
                "question:".to_string(),
                "json".to_string(),
            ],
            generation_timeout_ms: 120_000,
        }
    }
}

impl RagConfig {
    /// Create a new builder for constructing a [`RagConfig`].
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }

    /// The profile used for `intent`.
    pub fn profile(&self, intent: QueryIntent) -> &RetrievalProfile {
        match intent {
            QueryIntent::Factual => &self.factual,
            QueryIntent::Summary => &self.summary,
        }
    }

    /// The generation deadline as a [`Duration`].
    pub fn generation_timeout(&self) -> Duration {
        Duration::from_millis(self.generation_timeout_ms)
    }

    /// Check that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if:
    /// - `chunk_size == 0` or `chunk_overlap >= chunk_size`
    /// - `default_top_k == 0`
    /// - a profile has a λ outside `(0, 1]`, a zero pool parameter, or a
    ///   base context budget smaller than `chunk_size`
    /// - `generation_timeout_ms == 0`
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(RagError::ConfigError("chunk_size must be greater than zero".to_string()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(RagError::ConfigError(format!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.default_top_k == 0 {
            return Err(RagError::ConfigError(
                "default_top_k must be greater than zero".to_string(),
            ));
        }
        self.factual.validate("factual", self.chunk_size)?;
        self.summary.validate("summary", self.chunk_size)?;
        if self.generation_timeout_ms == 0 {
            return Err(RagError::ConfigError(
                "generation_timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for constructing a validated [`RagConfig`].
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
}

impl RagConfigBuilder {
    /// Set the chunk window size in characters.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunk_size = size;
        self
    }

    /// Set the overlap between consecutive chunks in characters.
    pub fn chunk_overlap(mut self, overlap: usize) -> Self {
        self.config.chunk_overlap = overlap;
        self
    }

    /// Set the result count used when a query does not specify one.
    pub fn default_top_k(mut self, k: usize) -> Self {
        self.config.default_top_k = k;
        self
    }

    /// Replace the factual profile.
    pub fn factual(mut self, profile: RetrievalProfile) -> Self {
        self.config.factual = profile;
        self
    }

    /// Replace the summary profile.
    pub fn summary(mut self, profile: RetrievalProfile) -> Self {
        self.config.summary = profile;
        self
    }

    /// Replace the summary cue table.
    pub fn summary_cues<I, S>(mut self, cues: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.summary_cues = cues.into_iter().map(Into::into).collect();
        self
    }

    /// Set the answer language named in prompts.
    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.config.language = language.into();
        self
    }

    /// Set the fixed "not found" sentence.
    pub fn not_found_answer(mut self, sentence: impl Into<String>) -> Self {
        self.config.not_found_answer = sentence.into();
        self
    }

    /// Replace the boilerplate markers used by the summary fallback.
    pub fn boilerplate_markers<I, S>(mut self, markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.boilerplate_markers = markers.into_iter().map(Into::into).collect();
        self
    }

    /// Set the generation deadline.
    pub fn generation_timeout(mut self, timeout: Duration) -> Self {
        self.config.generation_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Build the [`RagConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// See [`RagConfig::validate`].
    pub fn build(self) -> Result<RagConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
