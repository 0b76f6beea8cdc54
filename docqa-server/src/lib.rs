//! `docqa-server` exposes a [`docqa_rag::RagEngine`] over HTTP.
//! Answers can be fetched whole or streamed as server-sent events.

pub mod config;
pub mod server;

pub use config::{EndpointConfig, ServerConfig};
pub use server::{AppState, app_router, build_engine, run_server};
