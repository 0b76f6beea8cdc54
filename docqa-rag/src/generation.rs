//! Text-generation provider trait.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A lazily produced sequence of text fragments.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Parameters for one generation call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationRequest {
    /// The full instruction prompt.
    pub prompt: String,
    /// Upper bound on generated tokens.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
}

impl GenerationRequest {
    /// Create a request.
    pub fn new(prompt: impl Into<String>, max_tokens: u32, temperature: f32) -> Self {
        Self { prompt: prompt.into(), max_tokens, temperature }
    }
}

/// A backend that turns prompts into text.
///
/// Providers report deadline expiry as
/// [`GenerationError::Timeout`](crate::GenerationError::Timeout) rather than
/// hanging. The engine additionally enforces its own deadline around every
/// call and every streamed fragment.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Generate the complete response for `request`.
    async fn generate(&self, request: &GenerationRequest) -> Result<String>;

    /// Generate the response incrementally.
    ///
    /// Dropping the returned stream must cancel the underlying call. The
    /// default implementation yields the result of [`generate`](Self::generate)
    /// as a single fragment.
    async fn generate_stream(&self, request: &GenerationRequest) -> Result<TextStream> {
        let text = self.generate(request).await?;
        Ok(Box::pin(futures::stream::once(async move { Ok(text) })))
    }

    /// Short provider name used in logs and errors.
    fn name(&self) -> &str;
}
