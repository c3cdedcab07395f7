//! Model invocation in buffered or streaming mode

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::parser::parse_complete;
use super::prompt::CitationPrompt;
use crate::config::RagConfig;
use crate::error::{CitationError, Error, MalformedCitation, Result};
use crate::providers::{LlmProvider, TokenStream};
use crate::types::CitedAnswer;

/// How the answer should be delivered
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SynthesisMode {
    #[default]
    Buffered,
    Streaming,
}

/// Unparsed model output
pub enum RawAnswer {
    /// Whole answer, already split into prose and citations
    Buffered {
        answer: CitedAnswer,
        /// Set when the citation list was damaged; the prose still stands
        fault: Option<CitationError>,
    },
    /// Live token stream
    Streaming(TokenStream),
}

impl std::fmt::Debug for RawAnswer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buffered { answer, fault } => f
                .debug_struct("Buffered")
                .field("answer", answer)
                .field("fault", fault)
                .finish(),
            Self::Streaming(_) => f.write_str("Streaming(..)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SynthesizerConfig {
    /// Ask for a JSON object in buffered mode
    pub structured_output: bool,
    /// Rendered where a citation list closes
    pub separator: String,
}

impl Default for SynthesizerConfig {
    fn default() -> Self {
        Self {
            structured_output: true,
            separator: "\n".to_string(),
        }
    }
}

impl From<&RagConfig> for SynthesizerConfig {
    fn from(config: &RagConfig) -> Self {
        Self {
            structured_output: config.llm.structured_output,
            separator: config.citation.separator.clone(),
        }
    }
}

/// Runs a citation prompt through an LLM provider
pub struct ResponseSynthesizer {
    llm: Arc<dyn LlmProvider>,
    config: SynthesizerConfig,
}

impl ResponseSynthesizer {
    pub fn new(llm: Arc<dyn LlmProvider>, config: SynthesizerConfig) -> Self {
        Self { llm, config }
    }

    pub fn config(&self) -> &SynthesizerConfig {
        &self.config
    }

    pub fn llm(&self) -> &Arc<dyn LlmProvider> {
        &self.llm
    }

    /// Invoke the model once. Errors are returned as-is, never retried.
    pub async fn invoke(&self, prompt: &CitationPrompt, mode: SynthesisMode) -> Result<RawAnswer> {
        tracing::debug!(
            "Invoking {} ({}) in {:?} mode, prompt {} chars",
            self.llm.name(),
            self.llm.model(),
            mode,
            prompt.as_str().len()
        );

        match mode {
            SynthesisMode::Buffered => self.buffered(prompt).await,
            SynthesisMode::Streaming => Ok(RawAnswer::Streaming(self.llm.stream(prompt.as_str()).await?)),
        }
    }

    async fn buffered(&self, prompt: &CitationPrompt) -> Result<RawAnswer> {
        let raw = if self.config.structured_output {
            let raw = self.llm.complete_json(&prompt.with_json_output()).await?;
            if let Some((answer, fault)) = decode_structured(&raw)? {
                return Ok(RawAnswer::Buffered { answer, fault });
            }
            tracing::debug!("Model output is not a JSON object, parsing as text");
            raw
        } else {
            self.llm.complete(prompt.as_str()).await?
        };

        let outcome = parse_complete(&raw, &self.config.separator);
        Ok(RawAnswer::Buffered {
            answer: CitedAnswer::new(outcome.text.trim(), outcome.citations),
            fault: outcome.fault,
        })
    }
}

/// Decode `{"answer": .., "citations": [..]}`, tolerating a code fence.
///
/// `Ok(None)` means the output is not a JSON object and has to be parsed as
/// text. Once it is an object the `answer` string is kept whatever shape the
/// citations come in; a bad citation only damages the list.
fn decode_structured(raw: &str) -> Result<Option<(CitedAnswer, Option<CitationError>)>> {
    let body = raw.trim();
    let body = body
        .strip_prefix("```json")
        .or_else(|| body.strip_prefix("```"))
        .map(|rest| rest.trim_end().trim_end_matches("```"))
        .unwrap_or(body)
        .trim();

    let Ok(Value::Object(object)) = serde_json::from_str::<Value>(body) else {
        return Ok(None);
    };
    let Some(text) = object.get("answer").and_then(Value::as_str) else {
        return Err(Error::model("Model returned a JSON object without an answer"));
    };

    let (citations, fault) = match object.get("citations") {
        None | Some(Value::Null) => (Vec::new(), None),
        Some(Value::Array(items)) => json_citations(items),
        Some(other) => (Vec::new(), Some(non_integer(other))),
    };

    // some models still append the bracketed list to the answer text
    if citations.is_empty() && fault.is_none() {
        let outcome = parse_complete(text, "");
        if outcome.fault.is_none() && !outcome.citations.is_empty() {
            return Ok(Some((CitedAnswer::new(outcome.text.trim(), outcome.citations), None)));
        }
    }

    Ok(Some((CitedAnswer::new(text.trim(), citations), fault)))
}

/// Citation numbers up to the first entry that is not an integer
fn json_citations(items: &[Value]) -> (Vec<usize>, Option<CitationError>) {
    let mut citations = Vec::with_capacity(items.len());
    for item in items {
        match json_citation(item) {
            Some(index) => citations.push(index),
            None => {
                tracing::warn!("Non-numeric citation {}, dropping rest of list", item);
                return (citations, Some(non_integer(item)));
            }
        }
    }
    (citations, None)
}

/// Same classification as the text parser: below 1 is 0, too large saturates
fn json_citation(item: &Value) -> Option<usize> {
    match item {
        Value::Number(number) => {
            if let Some(n) = number.as_u64() {
                return Some(usize::try_from(n).unwrap_or(usize::MAX));
            }
            if number.as_i64().is_some() {
                return Some(0);
            }
            let f = number.as_f64()?;
            (f.fract() == 0.0).then(|| if f < 1.0 { 0 } else { f as usize })
        }
        // a quoted "2" is not a number either
        _ => None,
    }
}

fn non_integer(item: &Value) -> CitationError {
    CitationError::malformed(MalformedCitation::NonInteger(item.to_string()))
}
