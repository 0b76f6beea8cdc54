use std::{convert::Infallible, net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response, sse::{Event, KeepAlive, Sse}},
    routing::{get, post},
};
use docqa_rag::{
    Citation, EngineState, IngestSource, Query, QueryIntent, RagEngine, RagError, StreamFragment,
    openai::{OpenAICompatibleGenerator, OpenAIEmbeddingProvider},
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};
use tracing::{error, info, warn};

use crate::config::ServerConfig;

#[derive(Clone, Debug)]
pub struct AppState {
    pub engine: RagEngine,
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(engine: RagEngine) -> Self {
        Self { engine, max_upload_bytes: ServerConfig::default().max_upload_bytes }
    }
}

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    pub question: String,
    #[serde(default)]
    pub top_k: Option<usize>,
    #[serde(default, alias = "document_id")]
    pub doc_id: Option<String>,
}

impl From<AskRequest> for Query {
    fn from(request: AskRequest) -> Self {
        Query {
            question: request.question,
            top_k: request.top_k,
            // Forms post an empty string for "no filter".
            document_id: request.doc_id.filter(|id| !id.trim().is_empty()),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AskResponse {
    pub answer: String,
    pub intent: QueryIntent,
    pub sources: Vec<Citation>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub ok: bool,
    pub document_id: String,
    pub chunks_added: usize,
    /// Total chunks indexed after the upload.
    pub chunks: usize,
}

/// An error rendered as `{ "error": ..., "kind": ... }`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    kind: &'static str,
    message: String,
}

impl ApiError {
    fn bad_request(kind: &'static str, message: impl Into<String>) -> Self {
        Self { status: StatusCode::BAD_REQUEST, kind, message: message.into() }
    }
}

/// HTTP status for an engine error.
pub fn status_for(err: &RagError) -> StatusCode {
    match err.kind() {
        "not_ready" | "index_empty" => StatusCode::BAD_REQUEST,
        "no_context_for_document" => StatusCode::NOT_FOUND,
        "duplicate_document" => StatusCode::CONFLICT,
        "invalid_query" | "unreadable_source" | "empty_text" | "no_chunks"
        | "missing_document_id" => StatusCode::UNPROCESSABLE_ENTITY,
        "generation_timeout" => StatusCode::GATEWAY_TIMEOUT,
        "embedding_failed" | "generation_failed" | "generation_malformed" => {
            StatusCode::BAD_GATEWAY
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<RagError> for ApiError {
    fn from(err: RagError) -> Self {
        let status = status_for(&err);
        if status.is_server_error() {
            error!(kind = err.kind(), error = %err, "request failed");
        } else {
            warn!(kind = err.kind(), error = %err, "request rejected");
        }
        Self { status, kind: err.kind(), message: err.to_string() }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({"error": self.message, "kind": self.kind}))).into_response()
    }
}

pub fn app_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let limit = state.max_upload_bytes;

    Router::new()
        .route("/health", get(health))
        .route("/documents", get(documents))
        .route("/upload", post(upload))
        .route("/reset", post(reset))
        .route("/ask", post(ask))
        .route("/ask-stream", post(ask_stream))
        .with_state(state)
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// Build the engine with HTTP-backed providers described by `config`.
pub fn build_engine(config: &ServerConfig) -> anyhow::Result<RagEngine> {
    let embedding = &config.embedding;
    let mut embedder = match &embedding.api_key {
        Some(key) => {
            OpenAIEmbeddingProvider::new(key.clone())?.with_base_url(embedding.url.clone())
        }
        None => OpenAIEmbeddingProvider::unauthenticated(embedding.url.clone()),
    }
    .with_model(embedding.model.clone());
    if let Some(dims) = config.embedding_dimensions {
        embedder = embedder.with_dimensions(dims);
    }

    let generation = &config.generation;
    let generator = match &generation.api_key {
        Some(key) => {
            OpenAICompatibleGenerator::new(key.clone())?.with_base_url(generation.url.clone())
        }
        None => OpenAICompatibleGenerator::unauthenticated(generation.url.clone())?,
    }
    .with_model(generation.model.clone())
    .with_timeout(config.rag.generation_timeout())?;

    let engine = RagEngine::builder()
        .config(config.rag.clone())
        .embedding_provider(Arc::new(embedder))
        .generation_provider(Arc::new(generator))
        .build()?;
    Ok(engine)
}

pub async fn run_server(config: ServerConfig) -> anyhow::Result<()> {
    let engine = build_engine(&config)?;

    if let Some(path) = &config.default_document {
        info!(path = %path.display(), "loading default document");
        match engine.ingest(IngestSource::path(path), None).await {
            Ok(report) => info!(
                document.id = %report.document_id,
                chunks = report.total_chunks,
                "default document loaded"
            ),
            Err(e) => error!(path = %path.display(), error = %e, "failed to load default document"),
        }
    }

    let state = AppState { engine, max_upload_bytes: config.max_upload_bytes };
    let app = app_router(state);
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .with_context(|| "invalid host/port for docqa server")?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("docqa listening on http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let status = state.engine.status().await;
    Json(json!({
        "status": "ok",
        "state": status.state,
        "documents": status.documents,
        "chunks": status.chunks,
    }))
}

async fn documents(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.engine.documents().await)
}

async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let mut document_id = None;
    let mut contents = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request("bad_multipart", e.to_string()))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let file_name = field.file_name().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request("bad_multipart", e.to_string()))?;
                document_id = document_id.or(file_name);
                contents = Some(bytes);
            }
            Some("doc_id") => {
                let id = field
                    .text()
                    .await
                    .map_err(|e| ApiError::bad_request("bad_multipart", e.to_string()))?;
                if !id.trim().is_empty() {
                    document_id = Some(id);
                }
            }
            _ => {}
        }
    }

    let contents = contents.ok_or_else(|| {
        ApiError::bad_request("missing_file", "multipart field 'file' is required")
    })?;
    let report = state
        .engine
        .ingest(IngestSource::bytes(contents.to_vec()), document_id.as_deref())
        .await?;

    Ok(Json(UploadResponse {
        ok: true,
        document_id: report.document_id,
        chunks_added: report.chunks_added,
        chunks: report.total_chunks,
    }))
}

async fn reset(State(state): State<AppState>) -> impl IntoResponse {
    state.engine.reset().await;
    Json(json!({"ok": true}))
}

async fn ask(
    State(state): State<AppState>,
    Json(request): Json<AskRequest>,
) -> Result<Json<AskResponse>, ApiError> {
    let answer = state.engine.ask(request.into()).await?;
    Ok(Json(AskResponse { answer: answer.answer, intent: answer.intent, sources: answer.sources }))
}

fn fragment_event(fragment: StreamFragment) -> Event {
    match &fragment {
        StreamFragment::Citations(citations) => Event::default()
            .event("sources")
            .json_data(citations)
            .unwrap_or_else(|_| Event::default().event("sources").data("[]")),
        StreamFragment::Text(text) => Event::default().event("token").data(text),
        StreamFragment::Done => Event::default().event("done").data(fragment.to_string()),
        StreamFragment::Error(_) => Event::default().event("error").data(fragment.to_string()),
    }
}

async fn ask_stream(
    State(state): State<AppState>,
    Json(request): Json<AskRequest>,
) -> Result<Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>>, ApiError> {
    if state.engine.status().await.state == EngineState::Empty {
        return Err(RagError::from(docqa_rag::RetrievalError::NotReady).into());
    }

    let stream = state
        .engine
        .ask_stream(request.into())
        .map(|fragment| Ok::<_, Infallible>(fragment_event(fragment)));

    Ok(Sse::new(stream)
        .keep_alive(KeepAlive::new().interval(Duration::from_secs(15)).text("keepalive")))
}
