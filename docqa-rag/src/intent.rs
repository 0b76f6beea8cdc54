//! Query intent classification.
//!
//! A question is a summary request iff its lower-cased text contains one of
//! a configurable list of cue phrases. The heuristic is locale-specific and
//! will misclassify phrasings that the table does not list; intent only
//! changes retrieval breadth, context budget and prompt template.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The two query intents.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum QueryIntent {
    /// A question answered from specific passages.
    Factual,
    /// A request to summarize the document as a whole.
    Summary,
}

impl fmt::Display for QueryIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryIntent::Factual => f.write_str("factual"),
            QueryIntent::Summary => f.write_str("summary"),
        }
    }
}

/// English summary cue phrases.
pub fn english_summary_cues() -> Vec<String> {
    [
        "summary",
        "summarize",
        "summarise",
        "overview",
        "what is this about",
        "what is it about",
        "main topic",
        "main idea",
        "in general",
        "gist",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// Turkish summary cue phrases.
pub fn turkish_summary_cues() -> Vec<String> {
    ["ana konu", "özet", "genel", "tamamı", "ne anlatıyor", "konusu", "genel olarak"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Stateless keyword classifier over a cue table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryClassifier {
    cues: Vec<String>,
}

impl QueryClassifier {
    /// Build a classifier from cue phrases. Cues are lower-cased; blank cues are ignored.
    pub fn new<I, S>(cues: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let cues = cues
            .into_iter()
            .map(|c| c.as_ref().trim().to_lowercase())
            .filter(|c| !c.is_empty())
            .collect();
        Self { cues }
    }

    /// Classifier using [`english_summary_cues`].
    pub fn english() -> Self {
        Self::new(english_summary_cues())
    }

    /// Classifier using [`turkish_summary_cues`].
    pub fn turkish() -> Self {
        Self::new(turkish_summary_cues())
    }

    /// The active cue phrases.
    pub fn cues(&self) -> &[String] {
        &self.cues
    }

    /// Classify a question.
    pub fn classify(&self, question: &str) -> QueryIntent {
        let question = question.to_lowercase();
        if self.cues.iter().any(|cue| question.contains(cue.as_str())) {
            QueryIntent::Summary
        } else {
            QueryIntent::Factual
        }
    }
}

impl Default for QueryClassifier {
    fn default() -> Self {
        Self::english()
    }
}
