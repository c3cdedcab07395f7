//! Frame processor that answers spoken questions through the engine
//!
//! Frames come from a voice pipeline (speech-to-text upstream, text-to-speech
//! downstream). User messages are answered with a streamed reply whose
//! citation markers are removed before they reach the speech synthesizer.

use std::sync::Arc;

use futures::StreamExt;
use regex::Regex;
use tokio::sync::mpsc::{Receiver, Sender};

use crate::config::VoiceConfig;
use crate::engine::CitationQueryEngine;
use crate::error::{Error, Result};
use crate::types::{CitationSummary, StreamEvent};

/// Unit of data exchanged with the voice pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Pipeline started
    Start,
    /// Transcribed user utterance
    UserMessage(String),
    /// A bot reply begins
    ResponseStart,
    /// Streamed reply text
    Text(String),
    /// Complete text to speak as-is
    Speak(String),
    /// A bot reply ends
    ResponseEnd,
    /// Sources cited by the reply that just ended
    Citations(CitationSummary),
    Error(String),
    /// Anything this processor does not handle
    Passthrough(String),
}

/// Removes inline `[n]` / `[n, m]` markers from text
#[derive(Debug, Clone)]
pub struct CitationTextFilter {
    pattern: Option<Regex>,
}

impl CitationTextFilter {
    pub fn new(enabled: bool) -> Result<Self> {
        let pattern = if enabled {
            Some(
                Regex::new(r"\s*\[\d+(?:\s*,\s*\d+)*\]")
                    .map_err(|e| Error::internal(format!("Invalid citation pattern: {}", e)))?,
            )
        } else {
            None
        };
        Ok(Self { pattern })
    }

    pub fn filter(&self, text: &str) -> String {
        match &self.pattern {
            Some(pattern) => pattern.replace_all(text, "").into_owned(),
            None => text.to_string(),
        }
    }
}

/// Answers `UserMessage` frames about one document
pub struct VoiceQueryProcessor {
    engine: Arc<CitationQueryEngine>,
    document_id: String,
    config: VoiceConfig,
    filter: CitationTextFilter,
}

impl VoiceQueryProcessor {
    pub fn new(
        engine: Arc<CitationQueryEngine>,
        document_id: impl Into<String>,
        config: VoiceConfig,
    ) -> Result<Self> {
        let filter = CitationTextFilter::new(config.filter_citations)?;
        Ok(Self {
            engine,
            document_id: document_id.into(),
            config,
            filter,
        })
    }

    /// Handle one frame, pushing output frames downstream
    pub async fn process(&self, frame: Frame, out: &Sender<Frame>) -> Result<()> {
        match frame {
            Frame::Start => {
                tracing::info!("{} joined the session", self.config.bot_name);
                send(out, Frame::ResponseStart).await?;
                send(out, Frame::Speak(self.config.greeting.clone())).await?;
                send(out, Frame::ResponseEnd).await
            }
            Frame::UserMessage(question) => {
                send(out, Frame::ResponseStart).await?;
                let answered = self.answer(&question, out).await;
                // the reply is always closed, even after a failure
                send(out, Frame::ResponseEnd).await?;
                answered
            }
            other => send(out, other).await,
        }
    }

    /// Process frames until the upstream channel closes
    pub async fn run(&self, mut input: Receiver<Frame>, out: Sender<Frame>) -> Result<()> {
        while let Some(frame) = input.recv().await {
            self.process(frame, &out).await?;
        }
        Ok(())
    }

    async fn answer(&self, question: &str, out: &Sender<Frame>) -> Result<()> {
        let mut answer = match self.engine.stream_with_citations(question, &self.document_id).await {
            Ok(answer) => answer,
            Err(e) => {
                tracing::error!("Voice query failed: {}", e);
                return send(out, Frame::Error(e.to_string())).await;
            }
        };

        // whether the last spoken text already closed a sentence
        let mut sentence_open = false;

        while let Some(event) = answer.next().await {
            match event {
                Ok(StreamEvent::Text(text)) => {
                    let text = self.filter.filter(&text);
                    if !text.trim().is_empty() {
                        sentence_open = !ends_sentence(&text);
                    }
                    if !text.is_empty() {
                        send(out, Frame::Text(text)).await?;
                    }
                }
                Ok(StreamEvent::Separator) => {
                    if sentence_open {
                        send(out, Frame::Text(self.config.sentence_terminator.clone())).await?;
                        sentence_open = false;
                    }
                }
                Ok(StreamEvent::Completed(summary)) => {
                    send(out, Frame::Citations(summary)).await?;
                }
                Err(e) => {
                    tracing::error!("Voice answer stream failed: {}", e);
                    return send(out, Frame::Error(e.to_string())).await;
                }
            }
        }

        Ok(())
    }
}

fn ends_sentence(text: &str) -> bool {
    text.trim_end().ends_with(['.', '!', '?'])
}

async fn send(out: &Sender<Frame>, frame: Frame) -> Result<()> {
    out.send(frame)
        .await
        .map_err(|_| Error::internal("Voice pipeline closed"))
}
