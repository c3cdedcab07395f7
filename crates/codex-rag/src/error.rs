//! Error types for the citation query engine

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Engine errors
#[derive(Debug, Error)]
pub enum Error {
    /// Retriever or index is not initialized
    #[error("Index unavailable: {0}")]
    IndexUnavailable(String),

    /// Retrieval call failed
    #[error("Retrieval failed: {0}")]
    Retrieval(String),

    /// Language model call or stream failed
    #[error("Model invocation failed: {0}")]
    ModelInvocation(String),

    /// Citation list could not be trusted
    #[error(transparent)]
    Citation(#[from] CitationError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Embedding error
    #[error("Embedding generation failed: {0}")]
    Embedding(String),

    /// Request rejected before any work was done
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Document not found
    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request error
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Faults in the model's citation list.
///
/// These never invalidate the prose answer, only the citations.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CitationError {
    /// The bracketed list was cut short or contained garbage
    #[error("Malformed citation output: {reason}")]
    Malformed { reason: MalformedCitation },

    /// A cited index has no matching source chunk
    #[error("Citation {index} is out of range (valid: 1..={chunk_count})")]
    OutOfRange { index: usize, chunk_count: usize },
}

/// Why a citation list was rejected by the parser
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MalformedCitation {
    /// Stream ended before the closing `]`
    Unterminated,
    /// An entry between the brackets is not a base-10 integer
    NonInteger(String),
}

impl std::fmt::Display for MalformedCitation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unterminated => write!(f, "citation list was never closed"),
            Self::NonInteger(entry) => write!(f, "'{}' is not a citation number", entry),
        }
    }
}

impl CitationError {
    /// Create a malformed-list error
    pub fn malformed(reason: MalformedCitation) -> Self {
        Self::Malformed { reason }
    }
}

impl Error {
    /// Create a retrieval error
    pub fn retrieval(message: impl Into<String>) -> Self {
        Self::Retrieval(message.into())
    }

    /// Create a model invocation error
    pub fn model(message: impl Into<String>) -> Self {
        Self::ModelInvocation(message.into())
    }

    /// Create an embedding error
    pub fn embedding(message: impl Into<String>) -> Self {
        Self::Embedding(message.into())
    }

    /// Create an invalid request error
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Machine-readable error kind, shared by the HTTP and SSE surfaces
    pub fn kind(&self) -> &'static str {
        match self {
            Error::IndexUnavailable(_) => "index_unavailable",
            Error::Retrieval(_) => "retrieval_error",
            Error::ModelInvocation(_) => "model_error",
            Error::Citation(CitationError::Malformed { .. }) => "malformed_citation",
            Error::Citation(CitationError::OutOfRange { .. }) => "out_of_range_citation",
            Error::Config(_) => "config_error",
            Error::Embedding(_) => "embedding_error",
            Error::InvalidRequest(_) => "invalid_request",
            Error::DocumentNotFound(_) => "not_found",
            Error::Io(_) => "io_error",
            Error::Json(_) => "json_error",
            Error::Http(_) => "http_error",
            Error::Internal(_) => "internal_error",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Error::IndexUnavailable(_) | Error::ModelInvocation(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Error::Retrieval(_) | Error::Http(_) => StatusCode::BAD_GATEWAY,
            Error::Citation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Error::Config(_) | Error::Json(_) | Error::InvalidRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            Error::DocumentNotFound(_) => StatusCode::NOT_FOUND,
            Error::Embedding(_) | Error::Io(_) | Error::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(json!({
            "error": {
                "type": self.kind(),
                "message": self.to_string(),
            }
        }));

        (status, body).into_response()
    }
}
