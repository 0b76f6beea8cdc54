//! Prompt rendering and summary post-processing.
//!
//! Factual questions get a grounded-answer template with a fixed "not found"
//! sentence. Summary questions ask the generator for a five-field JSON
//! object; its output is parsed into [`SummaryOutput`] and, when the
//! structure is missing, repaired by sentence extraction.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::RagConfig;
use crate::intent::QueryIntent;

/// Number of sentences in a summary answer.
const SUMMARY_SENTENCES: usize = 5;

static JSON_OBJECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{[\s\S]*\}").expect("static regex"));
static ENUMERATION_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)(?:^|\s)(?:(?:\d{1,2}[.)]|[-*•])\s+)+").expect("static regex")
});
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("static regex"));

/// The five-field summary the generator is asked to produce.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SummaryFields {
    /// One sentence naming the main topic.
    pub topic: String,
    /// First supporting point.
    pub point1: String,
    /// Second supporting point.
    pub point2: String,
    /// Third supporting point.
    pub point3: String,
    /// Closing sentence.
    pub conclusion: String,
}

impl SummaryFields {
    fn sentences(&self) -> [&str; SUMMARY_SENTENCES] {
        [&self.topic, &self.point1, &self.point2, &self.point3, &self.conclusion]
    }
}

/// Result of parsing raw summary output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SummaryOutput {
    /// All five fields were present and non-blank.
    Structured(SummaryFields),
    /// Anything else; handled by the fallback path.
    Unstructured(String),
}

/// Renders prompts for both intents and finishes raw generator output.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    language: String,
    not_found_answer: String,
    boilerplate_markers: Vec<String>,
}

impl PromptBuilder {
    /// Create a builder.
    pub fn new(
        language: impl Into<String>,
        not_found_answer: impl Into<String>,
        boilerplate_markers: Vec<String>,
    ) -> Self {
        Self {
            language: language.into(),
            not_found_answer: not_found_answer.into(),
            boilerplate_markers: boilerplate_markers
                .into_iter()
                .map(|m| m.to_lowercase())
                .collect(),
        }
    }

    /// Create a builder from the prompt settings of `config`.
    pub fn from_config(config: &RagConfig) -> Self {
        Self::new(
            config.language.clone(),
            config.not_found_answer.clone(),
            config.boilerplate_markers.clone(),
        )
    }

    /// The fixed "not found" sentence.
    pub fn not_found_answer(&self) -> &str {
        &self.not_found_answer
    }

    /// Render the instruction prompt for `intent`.
    pub fn build(&self, context: &str, question: &str, intent: QueryIntent) -> String {
        match intent {
            QueryIntent::Factual => self.factual_prompt(context, question),
            QueryIntent::Summary => self.summary_prompt(context, question),
        }
    }

    fn factual_prompt(&self, context: &str, question: &str) -> String {
        format!(
            "You are a document question-answering assistant.\n\
             \n\
             Rules:\n\
             1) Use only the information in CONTEXT.\n\
             2) Do not add anything that is not in CONTEXT.\n\
             3) Answer in {language}, briefly and clearly.\n\
             4) If the answer is not in CONTEXT, reply with exactly: \"{not_found}\"\n\
             \n\
             CONTEXT:\n\
             {context}\n\
             \n\
             QUESTION:\n\
             {question}\n\
             \n\
             ANSWER:",
            language = self.language,
            not_found = self.not_found_answer,
        )
    }

    fn summary_prompt(&self, context: &str, question: &str) -> String {
        format!(
            "You summarize documents using only the given context.\n\
             \n\
             Return ONLY valid JSON. Do not write a single character outside the JSON.\n\
             \n\
             JSON schema:\n\
             {{\n  \
               \"topic\": \"One clear sentence stating the main topic\",\n  \
               \"point1\": \"First key point as one sentence\",\n  \
               \"point2\": \"Second key point as one sentence\",\n  \
               \"point3\": \"Third key point as one sentence\",\n  \
               \"conclusion\": \"Short overall conclusion sentence\"\n\
             }}\n\
             \n\
             Rules:\n\
             - Use exactly the 1+3+1 structure (five sentences of content).\n\
             - Every field is a single complete sentence in {language}.\n\
             - Do not copy the text verbatim or quote long passages.\n\
             - Do not add information from outside the context.\n\
             \n\
             CONTEXT:\n\
             {context}\n\
             \n\
             QUESTION:\n\
             {question}\n\
             \n\
             JSON:",
            language = self.language,
        )
    }

    /// Parse raw generator output as the five-field structure.
    ///
    /// Accepts a bare JSON object or one embedded in surrounding prose or
    /// code fences. Missing or blank fields make the output unstructured.
    pub fn parse_summary(raw: &str) -> SummaryOutput {
        let trimmed = raw.trim();
        let parsed = serde_json::from_str::<SummaryFields>(trimmed).ok().or_else(|| {
            JSON_OBJECT
                .find(trimmed)
                .and_then(|m| serde_json::from_str::<SummaryFields>(m.as_str()).ok())
        });

        match parsed {
            Some(fields) if fields.sentences().iter().all(|s| !ensure_sentence(s).is_empty()) => {
                SummaryOutput::Structured(fields)
            }
            _ => SummaryOutput::Unstructured(raw.to_string()),
        }
    }

    /// Turn raw summary output into the final answer. Never returns an empty string.
    pub fn finish_summary(&self, raw: &str) -> String {
        match Self::parse_summary(raw) {
            SummaryOutput::Structured(fields) => {
                fields.sentences().iter().map(|s| ensure_sentence(s)).collect::<Vec<_>>().join(" ")
            }
            SummaryOutput::Unstructured(text) => {
                warn!(
                    raw_len = text.len(),
                    "summary output was not structured, extracting sentences"
                );
                let sentences = self.extract_sentences(&text);
                if sentences.is_empty() {
                    self.not_found_answer.clone()
                } else {
                    sentences.join(" ")
                }
            }
        }
    }

    /// Finish factual output: trimmed, with the "not found" sentence for blank output.
    pub fn finish_factual(&self, raw: &str) -> String {
        let answer = raw.trim();
        if answer.is_empty() {
            self.not_found_answer.clone()
        } else {
            answer.to_string()
        }
    }

    /// Fallback path: strip enumeration markers and echoed instructions, then
    /// keep the first five well-formed sentences.
    fn extract_sentences(&self, text: &str) -> Vec<String> {
        let cleaned = ENUMERATION_MARKER.replace_all(text, " ");
        let cleaned = WHITESPACE.replace_all(&cleaned, " ");

        split_sentences(cleaned.trim())
            .into_iter()
            .filter(|s| {
                let lower = s.to_lowercase();
                !self.boilerplate_markers.iter().any(|m| lower.contains(m.as_str()))
            })
            .map(ensure_sentence)
            .filter(|s| s.chars().any(char::is_alphabetic))
            .take(SUMMARY_SENTENCES)
            .collect()
    }
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::from_config(&RagConfig::default())
    }
}

/// Split after `.`, `!` or `?` when followed by whitespace.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if matches!(c, '.' | '!' | '?')
            && chars.peek().is_some_and(|(_, next)| next.is_whitespace())
        {
            let end = i + c.len_utf8();
            let sentence = text[start..end].trim();
            if !sentence.is_empty() {
                sentences.push(sentence);
            }
            start = end;
        }
    }
    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail);
    }
    sentences
}

/// Collapse whitespace, strip wrapping quotes and make sure the text ends
/// with terminal punctuation. Blank input stays blank.
fn ensure_sentence(text: &str) -> String {
    let collapsed = WHITESPACE.replace_all(text, " ");
    let trimmed = collapsed.trim().trim_matches(|c: char| matches!(c, ' ' | '\'' | '"' | '`'));
    if trimmed.is_empty() {
        return String::new();
    }
    if trimmed.ends_with(['.', '!', '?']) {
        trimmed.to_string()
    } else {
        format!("{trimmed}.")
    }
}
