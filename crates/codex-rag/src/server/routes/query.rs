//! Query endpoints with citations

use std::convert::Infallible;

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::stream::{BoxStream, StreamExt};
use serde_json::json;

use crate::error::{Error, Result};
use crate::server::state::AppState;
use crate::types::{CitedResponse, QueryRequest, StreamEvent};

type EventStream = BoxStream<'static, std::result::Result<Event, Infallible>>;

fn validate(request: &QueryRequest) -> Result<()> {
    if request.question.trim().is_empty() {
        return Err(Error::invalid_request("Question is empty"));
    }
    if request.document_id.trim().is_empty() {
        return Err(Error::invalid_request("document_id is required"));
    }
    Ok(())
}

/// POST /api/query - Answer with citations
pub async fn query(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<CitedResponse>> {
    validate(&request)?;

    let response = state
        .engine()
        .answer_with_citations(&request.question, &request.document_id)
        .await?;

    Ok(Json(response))
}

/// POST /api/query/stream - Answer as Server-Sent Events.
///
/// Events: `text` (JSON string), `separator`, then either `citations`
/// (citation summary) or `error`.
pub async fn query_stream(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> Result<Sse<EventStream>> {
    validate(&request)?;

    let answer = state
        .engine()
        .stream_with_citations(&request.question, &request.document_id)
        .await?;

    let separator = state.config().citation.separator.clone();
    let events = answer
        .map(move |item| Ok::<_, Infallible>(to_event(item, &separator)))
        .boxed();

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

fn to_event(item: Result<StreamEvent>, separator: &str) -> Event {
    let event = match item {
        Ok(StreamEvent::Text(text)) => Event::default().event("text").json_data(text),
        Ok(StreamEvent::Separator) => Event::default().event("separator").json_data(separator),
        Ok(StreamEvent::Completed(summary)) => Event::default().event("citations").json_data(summary),
        Err(e) => {
            tracing::error!("Answer stream failed: {}", e);
            Event::default()
                .event("error")
                .json_data(json!({ "type": e.kind(), "message": e.to_string() }))
        }
    };

    event.unwrap_or_else(|e| {
        Event::default()
            .event("error")
            .data(format!("Failed to encode event: {}", e).replace(['\r', '\n'], " "))
    })
}
