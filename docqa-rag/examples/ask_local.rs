//! # Local question answering
//!
//! Ingests two small documents and asks factual, filtered and summary
//! questions, printing answers with their citations.
//!
//! Uses a bag-of-words embedder and an echoing generator, so it runs with
//! **zero API keys**.
//!
//! Run: `cargo run -p docqa-rag --example ask_local`

use std::sync::Arc;

use async_trait::async_trait;
use docqa_rag::{
    EmbeddingProvider, GenerationProvider, GenerationRequest, IngestSource, Query, RagConfig,
    RagEngine, StreamFragment,
};
use futures::StreamExt;

// ---------------------------------------------------------------------------
// WordHashEmbedder: one dimension per hashed word
// ---------------------------------------------------------------------------

struct WordHashEmbedder {
    dimensions: usize,
}

#[async_trait]
impl EmbeddingProvider for WordHashEmbedder {
    async fn embed(&self, text: &str) -> docqa_rag::Result<Vec<f32>> {
        let mut emb = vec![0.0f32; self.dimensions];
        for word in text.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
            let hash = word
                .to_lowercase()
                .bytes()
                .fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(u64::from(b)));
            emb[(hash % self.dimensions as u64) as usize] += 1.0;
        }
        Ok(emb)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

// ---------------------------------------------------------------------------
// ContextEcho: answers with the first line of context it was given
// ---------------------------------------------------------------------------

struct ContextEcho;

#[async_trait]
impl GenerationProvider for ContextEcho {
    async fn generate(&self, request: &GenerationRequest) -> docqa_rag::Result<String> {
        let context = request
            .prompt
            .split("CONTEXT:\n")
            .nth(1)
            .and_then(|rest| rest.lines().next())
            .unwrap_or_default();
        Ok(context.to_string())
    }

    fn name(&self) -> &str {
        "echo"
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Small windows so each document splits into several chunks.
    let config = RagConfig::builder().chunk_size(120).chunk_overlap(30).default_top_k(2).build()?;

    let engine = RagEngine::builder()
        .config(config)
        .embedding_provider(Arc::new(WordHashEmbedder { dimensions: 128 }))
        .generation_provider(Arc::new(ContextEcho))
        .build()?;

    let documents = [
        (
            "rust.txt",
            "Rust is a systems programming language focused on safety, speed and concurrency. \
             It achieves memory safety without a garbage collector through its ownership system. \
             Cargo is the Rust package manager and build tool.",
        ),
        (
            "rag.txt",
            "Retrieval-augmented generation combines a retriever with a language model. \
             Documents are chunked, embedded and indexed. At question time the most relevant \
             and least redundant chunks are handed to the model as context.",
        ),
    ];

    for (id, text) in documents {
        let report = engine.ingest(IngestSource::bytes(text.as_bytes()), Some(id)).await?;
        println!("{id} → {} chunk(s), {} total", report.chunks_added, report.total_chunks);
    }

    let questions = [
        Query::new("How does Rust achieve memory safety?"),
        Query::new("What is handed to the model?").document("rag.txt"),
        Query::new("Give me an overview").top_k(4),
    ];

    for query in questions {
        println!("\nQ: {}", query.question);
        let answer = engine.ask(query).await?;
        println!("A ({}): {}", answer.intent, answer.answer);
        for source in &answer.sources {
            println!("   [{}#{}]", source.document_id, source.sequence);
        }
    }

    println!("\nStreaming:");
    let mut stream = engine.ask_stream(Query::new("What is Cargo?"));
    while let Some(fragment) = stream.next().await {
        match fragment {
            StreamFragment::Text(text) => print!("{text}"),
            other => println!("\n{other}"),
        }
    }

    Ok(())
}
