use std::sync::Arc;

use async_trait::async_trait;
use docqa_rag::{EmbeddingProvider, GenerationProvider, GenerationRequest, RagConfig, RagEngine};
use docqa_server::{AppState, app_router};
use reqwest::multipart::{Form, Part};
use serde_json::{Value, json};

const DIM: usize = 32;

/// Letter-frequency embedding; deterministic and good enough to rank.
struct LetterEmbedder;

#[async_trait]
impl EmbeddingProvider for LetterEmbedder {
    async fn embed(&self, text: &str) -> docqa_rag::Result<Vec<f32>> {
        let mut v = vec![0.0f32; DIM];
        for c in text.chars().filter(char::is_ascii_alphabetic) {
            v[(c.to_ascii_lowercase() as usize - 'a' as usize) % DIM] += 1.0;
        }
        Ok(v)
    }

    fn dimensions(&self) -> usize {
        DIM
    }
}

struct FixedAnswer;

#[async_trait]
impl GenerationProvider for FixedAnswer {
    async fn generate(&self, _request: &GenerationRequest) -> docqa_rag::Result<String> {
        Ok("The capital of France is Paris.".to_string())
    }

    fn name(&self) -> &str {
        "fixed"
    }
}

async fn spawn_server() -> (String, tokio::task::JoinHandle<()>) {
    let engine = RagEngine::builder()
        .config(RagConfig::default())
        .embedding_provider(Arc::new(LetterEmbedder))
        .generation_provider(Arc::new(FixedAnswer))
        .build()
        .expect("engine");
    let app = app_router(AppState::new(engine));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("listener addr");

    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.expect("server run");
    });

    (format!("http://{}", addr), handle)
}

async fn upload(client: &reqwest::Client, base: &str, name: &str, text: &str) -> reqwest::Response {
    let part = Part::bytes(text.as_bytes().to_vec()).file_name(name.to_string());
    let form = Form::new().part("file", part);
    client
        .post(format!("{}/upload", base))
        .multipart(form)
        .send()
        .await
        .expect("upload response")
}

#[tokio::test]
async fn health_reports_empty_then_ready() {
    let (base, handle) = spawn_server().await;
    let client = reqwest::Client::new();

    let health: Value = client
        .get(format!("{}/health", base))
        .send()
        .await
        .expect("health response")
        .json()
        .await
        .expect("health json");
    assert_eq!(health["status"], "ok");
    assert_eq!(health["state"], "empty");
    assert_eq!(health["chunks"], 0);

    let uploaded = upload(&client, &base, "france.txt", "Paris is the capital of France.").await;
    assert!(uploaded.status().is_success());

    let health: Value = client
        .get(format!("{}/health", base))
        .send()
        .await
        .expect("health response")
        .json()
        .await
        .expect("health json");
    assert_eq!(health["state"], "ready");
    assert_eq!(health["documents"], 1);
    assert_eq!(health["chunks"], 1);

    handle.abort();
}

#[tokio::test]
async fn ask_before_upload_is_a_client_error() {
    let (base, handle) = spawn_server().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/ask", base))
        .json(&json!({"question": "What is the capital?"}))
        .send()
        .await
        .expect("ask response");
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.expect("error json");
    assert_eq!(body["kind"], "not_ready");

    let blank = client
        .post(format!("{}/ask", base))
        .json(&json!({"question": "  ", "top_k": 0}))
        .send()
        .await
        .expect("ask response");
    assert_eq!(blank.status(), reqwest::StatusCode::BAD_REQUEST);
    let body: Value = blank.json().await.expect("error json");
    assert_eq!(body["kind"], "not_ready");

    let stream = client
        .post(format!("{}/ask-stream", base))
        .json(&json!({"question": "What is the capital?"}))
        .send()
        .await
        .expect("stream response");
    assert_eq!(stream.status(), reqwest::StatusCode::BAD_REQUEST);

    handle.abort();
}

#[tokio::test]
async fn upload_then_ask_returns_answer_and_sources() {
    let (base, handle) = spawn_server().await;
    let client = reqwest::Client::new();

    let uploaded: Value = upload(&client, &base, "france.txt", "Paris is the capital of France.")
        .await
        .json()
        .await
        .expect("upload json");
    assert_eq!(uploaded["ok"], true);
    assert_eq!(uploaded["document_id"], "france.txt");
    assert_eq!(uploaded["chunks_added"], 1);

    let answer: Value = client
        .post(format!("{}/ask", base))
        .json(&json!({"question": "What is the capital of France?", "top_k": 2, "doc_id": ""}))
        .send()
        .await
        .expect("ask response")
        .json()
        .await
        .expect("ask json");
    assert_eq!(answer["answer"], "The capital of France is Paris.");
    assert_eq!(answer["intent"], "factual");
    assert_eq!(answer["sources"][0]["document_id"], "france.txt");
    assert_eq!(answer["sources"][0]["sequence"], 0);

    handle.abort();
}

#[tokio::test]
async fn ask_stream_emits_sources_tokens_and_done() {
    let (base, handle) = spawn_server().await;
    let client = reqwest::Client::new();
    upload(&client, &base, "france.txt", "Paris is the capital of France.").await;

    let response = client
        .post(format!("{}/ask-stream", base))
        .json(&json!({"question": "What is the capital of France?"}))
        .send()
        .await
        .expect("stream response");
    assert!(response.status().is_success());
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(content_type.starts_with("text/event-stream"));

    let body = response.text().await.expect("stream body");
    let sources = body.find("event: sources").expect("sources event");
    let token = body.find("event: token").expect("token event");
    let done = body.find("event: done").expect("done event");
    assert!(sources < token && token < done);
    assert!(body.contains("data: The capital of France is Paris."));
    assert!(body.contains("data: [DONE]"));
    assert!(!body.contains("event: error"));

    handle.abort();
}

#[tokio::test]
async fn reset_returns_engine_to_empty() {
    let (base, handle) = spawn_server().await;
    let client = reqwest::Client::new();
    upload(&client, &base, "france.txt", "Paris is the capital of France.").await;

    let reset: Value = client
        .post(format!("{}/reset", base))
        .send()
        .await
        .expect("reset response")
        .json()
        .await
        .expect("reset json");
    assert_eq!(reset["ok"], true);

    let response = client
        .post(format!("{}/ask", base))
        .json(&json!({"question": "What is the capital?"}))
        .send()
        .await
        .expect("ask response");
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);

    // The same name can be uploaded again.
    assert!(upload(&client, &base, "france.txt", "Paris again.").await.status().is_success());

    handle.abort();
}

#[tokio::test]
async fn unknown_document_filter_is_not_found() {
    let (base, handle) = spawn_server().await;
    let client = reqwest::Client::new();
    upload(&client, &base, "france.txt", "Paris is the capital of France.").await;

    let response = client
        .post(format!("{}/ask", base))
        .json(&json!({"question": "What is the capital?", "document_id": "spain.txt"}))
        .send()
        .await
        .expect("ask response");
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
    let body: Value = response.json().await.expect("error json");
    assert_eq!(body["kind"], "no_context_for_document");

    handle.abort();
}

#[tokio::test]
async fn duplicate_upload_conflicts_and_documents_are_listed() {
    let (base, handle) = spawn_server().await;
    let client = reqwest::Client::new();
    upload(&client, &base, "france.txt", "Paris is the capital of France.").await;
    upload(&client, &base, "spain.txt", "Madrid is the capital of Spain.").await;

    let again = upload(&client, &base, "france.txt", "Lyon is in France.").await;
    assert_eq!(again.status(), reqwest::StatusCode::CONFLICT);
    let body: Value = again.json().await.expect("error json");
    assert_eq!(body["kind"], "duplicate_document");

    let documents: Value = client
        .get(format!("{}/documents", base))
        .send()
        .await
        .expect("documents response")
        .json()
        .await
        .expect("documents json");
    let ids: Vec<&str> = documents
        .as_array()
        .expect("documents array")
        .iter()
        .filter_map(|d| d["document_id"].as_str())
        .collect();
    assert_eq!(ids, ["france.txt", "spain.txt"]);

    handle.abort();
}

#[tokio::test]
async fn upload_without_file_is_rejected() {
    let (base, handle) = spawn_server().await;
    let client = reqwest::Client::new();

    let form = Form::new().text("doc_id", "orphan");
    let response = client
        .post(format!("{}/upload", base))
        .multipart(form)
        .send()
        .await
        .expect("upload response");
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.expect("error json");
    assert_eq!(body["kind"], "missing_file");

    handle.abort();
}
