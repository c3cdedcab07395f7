//! API routes

pub mod documents;
pub mod query;

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};

use crate::server::state::AppState;

/// Build all API routes
pub fn api_routes() -> Router<AppState> {
    Router::new()
        // Document management
        .route(
            "/documents",
            get(documents::list_documents).post(documents::create_document),
        )
        .route(
            "/documents/:id",
            get(documents::get_document).delete(documents::delete_document),
        )
        // Query
        .route("/query", post(query::query))
        .route("/query/stream", post(query::query_stream))
        // Info
        .route("/info", get(info))
}

/// API info endpoint
async fn info(State(state): State<AppState>) -> Json<Value> {
    let (provider, model) = state.engine().model();
    let config = state.config();

    Json(json!({
        "name": "codex-rag",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Document Q&A with citation-aware answers",
        "llm": { "provider": provider, "model": model },
        "citation": {
            "chunk_size": config.citation.chunk_size,
            "chunk_overlap": config.citation.chunk_overlap,
            "policy": config.citation.policy,
        },
        "endpoints": {
            "POST /api/documents": "Index a plain-text document",
            "GET /api/documents": "List all documents",
            "GET /api/documents/:id": "Get document details",
            "DELETE /api/documents/:id": "Delete a document",
            "POST /api/query": "Answer with citations",
            "POST /api/query/stream": "Answer with citations as Server-Sent Events"
        }
    }))
}
