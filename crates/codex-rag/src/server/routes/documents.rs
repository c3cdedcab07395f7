//! Document management endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;

use crate::error::{Error, Result};
use crate::server::state::AppState;
use crate::types::{Document, IngestRequest};

/// Response for the document list
#[derive(Debug, Serialize)]
pub struct DocumentList {
    pub documents: Vec<Document>,
    pub total: usize,
}

/// POST /api/documents - Index a plain-text document
pub async fn create_document(
    State(state): State<AppState>,
    Json(request): Json<IngestRequest>,
) -> Result<(StatusCode, Json<Document>)> {
    if request.name.trim().is_empty() {
        return Err(Error::invalid_request("Document name is empty"));
    }

    tracing::info!("Indexing document '{}' ({} bytes)", request.name, request.text.len());
    let document = state.index().add_document(&request.name, &request.text).await?;

    Ok((StatusCode::CREATED, Json(document)))
}

/// GET /api/documents - List indexed documents
pub async fn list_documents(State(state): State<AppState>) -> Json<DocumentList> {
    let documents = state.index().list_documents();
    let total = documents.len();
    Json(DocumentList { documents, total })
}

/// GET /api/documents/:id
pub async fn get_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Document>> {
    Ok(Json(state.index().get_document(&id)?))
}

/// DELETE /api/documents/:id
pub async fn delete_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Document>> {
    Ok(Json(state.index().remove_document(&id).await?))
}
