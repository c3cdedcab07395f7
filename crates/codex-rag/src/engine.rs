//! Citation-aware query engine
//!
//! Ties the pipeline together: retrieve passages for one document, split and
//! number them as sources, prompt the model, then parse and validate the
//! citations in its answer.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use futures::stream::{self, BoxStream, Stream, StreamExt};

use crate::config::{CitationPolicy, RagConfig};
use crate::error::{CitationError, Error, Result};
use crate::generation::{
    parse_stream, renumber, resolve, CitationParser, CitationPrompt, ParsedItem, ParserEvent,
    RawAnswer, ResponseSynthesizer, SynthesisMode, SynthesizerConfig,
};
use crate::ingestion::SentenceSplitter;
use crate::providers::LlmProvider;
use crate::retrieval::{RetrievalFilter, Retriever};
use crate::types::{CitationSummary, CitedResponse, SourceChunk, StreamEvent, NOT_FOUND_ANSWER};

/// Result of `CitationQueryEngine::query`
#[derive(Debug)]
pub enum QueryOutcome {
    Buffered(CitedResponse),
    Streaming(StreamingAnswer),
}

/// A streamed answer.
///
/// Yields `Text` and `Separator` events as the model produces them, then a
/// single `Completed` event once the model stream has ended cleanly. A model
/// error is yielded as an `Err` item and no `Completed` follows. Dropping the
/// stream cancels the model request.
pub struct StreamingAnswer {
    sources: Arc<Vec<SourceChunk>>,
    events: BoxStream<'static, Result<StreamEvent>>,
}

impl StreamingAnswer {
    /// Source chunks shown to the model, in citation order
    pub fn sources(&self) -> &[SourceChunk] {
        &self.sources
    }
}

impl Stream for StreamingAnswer {
    type Item = Result<StreamEvent>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.events.poll_next_unpin(cx)
    }
}

impl std::fmt::Debug for StreamingAnswer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingAnswer")
            .field("sources", &self.sources.len())
            .finish_non_exhaustive()
    }
}

/// Answers questions about one document with validated source citations
pub struct CitationQueryEngine {
    retriever: Arc<dyn Retriever>,
    synthesizer: ResponseSynthesizer,
    splitter: SentenceSplitter,
    policy: CitationPolicy,
}

impl CitationQueryEngine {
    /// Create an engine from configuration
    pub fn new(
        retriever: Arc<dyn Retriever>,
        llm: Arc<dyn LlmProvider>,
        config: &RagConfig,
    ) -> Result<Self> {
        let splitter = SentenceSplitter::new(config.citation.chunk_size, config.citation.chunk_overlap)?;
        Ok(Self::from_parts(
            retriever,
            ResponseSynthesizer::new(llm, SynthesizerConfig::from(config)),
            splitter,
            config.citation.policy,
        ))
    }

    pub fn from_parts(
        retriever: Arc<dyn Retriever>,
        synthesizer: ResponseSynthesizer,
        splitter: SentenceSplitter,
        policy: CitationPolicy,
    ) -> Self {
        Self {
            retriever,
            synthesizer,
            splitter,
            policy,
        }
    }

    pub fn policy(&self) -> CitationPolicy {
        self.policy
    }

    /// Name and model of the answering LLM
    pub fn model(&self) -> (&str, &str) {
        let llm = self.synthesizer.llm();
        (llm.name(), llm.model())
    }

    /// Answer in the requested mode
    pub async fn query(&self, query: &str, document_id: &str, mode: SynthesisMode) -> Result<QueryOutcome> {
        match mode {
            SynthesisMode::Buffered => Ok(QueryOutcome::Buffered(
                self.answer_with_citations(query, document_id).await?,
            )),
            SynthesisMode::Streaming => Ok(QueryOutcome::Streaming(
                self.stream_with_citations(query, document_id).await?,
            )),
        }
    }

    /// Answer and wait for the whole response.
    ///
    /// The answer text is returned even when the citation list is rejected;
    /// the reason is in `citation_error`.
    pub async fn answer_with_citations(&self, query: &str, document_id: &str) -> Result<CitedResponse> {
        let started = Instant::now();
        tracing::info!("Processing query for document {}: {}", document_id, query);

        let chunks = self.sources_for(query, document_id).await?;
        if chunks.is_empty() {
            return Ok(CitedResponse::not_found(started.elapsed().as_millis() as u64));
        }

        let prompt = CitationPrompt::build(&chunks, query);
        let (answer, fault) = match self.synthesizer.invoke(&prompt, SynthesisMode::Buffered).await? {
            RawAnswer::Buffered { answer, fault } => (answer, fault),
            RawAnswer::Streaming(_) => {
                return Err(Error::internal("Synthesizer streamed a buffered request"))
            }
        };

        let summary = summarize(answer.citations, fault, &chunks, self.policy);
        let processing_time_ms = started.elapsed().as_millis() as u64;

        tracing::info!(
            "Answered in {}ms with {} citations from {} sources",
            processing_time_ms,
            summary.citations.len(),
            chunks.len()
        );

        Ok(CitedResponse {
            answer: answer.answer,
            summary,
            chunks_retrieved: chunks.len(),
            processing_time_ms,
        })
    }

    /// Answer as a stream of text events followed by the citations
    pub async fn stream_with_citations(&self, query: &str, document_id: &str) -> Result<StreamingAnswer> {
        let started = Instant::now();
        tracing::info!("Streaming query for document {}: {}", document_id, query);

        let chunks = Arc::new(self.sources_for(query, document_id).await?);
        if chunks.is_empty() {
            let events = stream::iter(vec![
                Ok(StreamEvent::Text(NOT_FOUND_ANSWER.to_string())),
                Ok(StreamEvent::Completed(CitationSummary::default())),
            ]);
            return Ok(StreamingAnswer {
                sources: chunks,
                events: events.boxed(),
            });
        }

        let prompt = CitationPrompt::build(&chunks, query);
        let tokens = match self.synthesizer.invoke(&prompt, SynthesisMode::Streaming).await? {
            RawAnswer::Streaming(tokens) => tokens,
            RawAnswer::Buffered { .. } => {
                return Err(Error::internal("Synthesizer buffered a streaming request"))
            }
        };

        let parser = CitationParser::new(self.synthesizer.config().separator.clone());
        let policy = self.policy;
        let sources = Arc::clone(&chunks);

        let events = parse_stream(tokens, parser).map(move |item| {
            item.map(|item| match item {
                ParsedItem::Event(ParserEvent::Text(text)) => StreamEvent::Text(text),
                ParsedItem::Event(ParserEvent::Separator) => StreamEvent::Separator,
                ParsedItem::Finished(outcome) => {
                    let summary = summarize(outcome.citations, outcome.fault, &sources, policy);
                    tracing::info!(
                        "Streamed answer in {}ms with {} citations from {} sources",
                        started.elapsed().as_millis(),
                        summary.citations.len(),
                        sources.len()
                    );
                    StreamEvent::Completed(summary)
                }
            })
        });

        Ok(StreamingAnswer {
            sources: chunks,
            events: events.boxed(),
        })
    }

    async fn sources_for(&self, query: &str, document_id: &str) -> Result<Vec<SourceChunk>> {
        if !self.retriever.is_ready() {
            return Err(Error::IndexUnavailable("Index not found".into()));
        }

        let passages = self
            .retriever
            .retrieve(query, &RetrievalFilter::document(document_id))
            .await?;

        Ok(renumber(&passages, &self.splitter))
    }
}

/// Validate parsed citations against the sources.
///
/// A parser fault wins over an out-of-range index; either way the parsed
/// numbers are reported so callers can see what the model wrote.
fn summarize(
    citations: Vec<usize>,
    fault: Option<CitationError>,
    chunks: &[SourceChunk],
    policy: CitationPolicy,
) -> CitationSummary {
    match resolve(&citations, chunks, policy) {
        Ok(resolution) => {
            if let Some(fault) = &fault {
                tracing::warn!("Citation list is incomplete: {}", fault);
            }
            CitationSummary {
                citations,
                sources: resolution.resolved,
                rejected: resolution.rejected,
                citation_error: fault,
            }
        }
        Err(err) => {
            tracing::warn!("Rejecting citation list: {}", err);
            CitationSummary {
                citations,
                sources: Vec::new(),
                rejected: Vec::new(),
                citation_error: Some(fault.unwrap_or(err)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MalformedCitation;
    use crate::testing::{ScriptedLlm, StaticRetriever};

    const DOC: &str = "doc-1";

    fn engine(llm: Arc<ScriptedLlm>, policy: CitationPolicy) -> CitationQueryEngine {
        let mut config = RagConfig::default();
        config.citation.policy = policy;
        let retriever = Arc::new(StaticRetriever::new(DOC, &["Sky is red.", "Grass is green."]));
        CitationQueryEngine::new(retriever, llm, &config).unwrap()
    }

    async fn collect(answer: StreamingAnswer) -> Vec<Result<StreamEvent>> {
        answer.collect().await
    }

    fn source_texts(summary: &CitationSummary) -> Vec<&str> {
        summary.sources.iter().map(|s| s.text.as_str()).collect()
    }

    #[tokio::test]
    async fn test_buffered_answer_resolves_second_source() {
        let llm = Arc::new(ScriptedLlm::new("").with_json(r#"{"answer": "It is green.", "citations": [2]}"#));
        let response = engine(llm.clone(), CitationPolicy::Strict)
            .answer_with_citations("What color is the grass?", DOC)
            .await
            .unwrap();

        assert_eq!(response.answer, "It is green.");
        assert_eq!(response.summary.citations, vec![2]);
        assert_eq!(source_texts(&response.summary), vec!["Grass is green."]);
        assert_eq!(response.chunks_retrieved, 2);
        assert!(response.summary.citation_error.is_none());

        let prompt = &llm.prompts()[0];
        assert!(prompt.contains("Source 1:\nSky is red.\n"));
        assert!(prompt.contains("Source 2:\nGrass is green.\n"));
    }

    #[tokio::test]
    async fn test_out_of_range_keeps_answer_text() {
        for index in [0, 3] {
            let json = format!(r#"{{"answer": "Green.", "citations": [1, {}]}}"#, index);
            let llm = Arc::new(ScriptedLlm::new("").with_json(json));
            let response = engine(llm, CitationPolicy::Strict)
                .answer_with_citations("q", DOC)
                .await
                .unwrap();

            assert_eq!(response.answer, "Green.");
            assert!(response.summary.sources.is_empty());
            assert_eq!(
                response.summary.citation_error,
                Some(CitationError::OutOfRange { index, chunk_count: 2 })
            );
        }
    }

    #[tokio::test]
    async fn test_negative_json_citation_is_out_of_range() {
        let llm = Arc::new(
            ScriptedLlm::new("").with_json(r#"{"answer": "Water is wet in the evening.", "citations": [-1]}"#),
        );
        let response = engine(llm, CitationPolicy::Strict)
            .answer_with_citations("When is water wet?", DOC)
            .await
            .unwrap();

        assert_eq!(response.answer, "Water is wet in the evening.");
        assert_eq!(
            response.summary.citation_error,
            Some(CitationError::OutOfRange { index: 0, chunk_count: 2 })
        );
    }

    #[tokio::test]
    async fn test_lenient_policy_drops_bad_indices() {
        let llm = Arc::new(ScriptedLlm::new("").with_json(r#"{"answer": "Both.", "citations": [3, 1]}"#));
        let response = engine(llm, CitationPolicy::Lenient)
            .answer_with_citations("q", DOC)
            .await
            .unwrap();

        assert_eq!(source_texts(&response.summary), vec!["Sky is red."]);
        assert_eq!(response.summary.rejected, vec![3]);
        assert!(response.summary.citation_error.is_none());
    }

    #[tokio::test]
    async fn test_streaming_scenario() {
        let llm = Arc::new(
            ScriptedLlm::new("").with_tokens(&["The", " sky", " is", " red.", " [2,", "1]"]),
        );
        let answer = engine(llm, CitationPolicy::Strict)
            .stream_with_citations("What color is the sky?", DOC)
            .await
            .unwrap();
        assert_eq!(answer.sources().len(), 2);

        let events: Vec<StreamEvent> = collect(answer).await.into_iter().map(|e| e.unwrap()).collect();
        let text: String = events
            .iter()
            .map(|e| match e {
                StreamEvent::Text(t) => t.as_str(),
                StreamEvent::Separator => "\n",
                StreamEvent::Completed(_) => "",
            })
            .collect();
        assert_eq!(text, "The sky is red.\n");

        match events.last() {
            Some(StreamEvent::Completed(summary)) => {
                assert_eq!(summary.citations, vec![2, 1]);
                assert_eq!(source_texts(summary), vec!["Grass is green.", "Sky is red."]);
            }
            other => panic!("expected Completed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unterminated_stream_reports_malformed() {
        let llm = Arc::new(ScriptedLlm::new("").with_tokens(&["Sky.", " [1,", " 2"]));
        let answer = engine(llm, CitationPolicy::Strict)
            .stream_with_citations("q", DOC)
            .await
            .unwrap();

        let events = collect(answer).await;
        match events.last() {
            Some(Ok(StreamEvent::Completed(summary))) => {
                assert_eq!(summary.citations, vec![1]);
                assert_eq!(
                    summary.citation_error,
                    Some(CitationError::malformed(MalformedCitation::Unterminated))
                );
            }
            other => panic!("expected Completed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_stream_failure_has_no_completion() {
        let llm = Arc::new(ScriptedLlm::new("The sky is red. [1]").failing_after(2));
        let answer = engine(llm, CitationPolicy::Strict)
            .stream_with_citations("q", DOC)
            .await
            .unwrap();

        let events = collect(answer).await;
        assert!(matches!(events.last(), Some(Err(Error::ModelInvocation(_)))));
        assert!(!events
            .iter()
            .any(|e| matches!(e, Ok(StreamEvent::Completed(_)))));
    }

    #[tokio::test]
    async fn test_unavailable_index() {
        let llm: Arc<dyn LlmProvider> = Arc::new(ScriptedLlm::new(""));
        let engine = CitationQueryEngine::new(
            Arc::new(StaticRetriever::unavailable()),
            llm,
            &RagConfig::default(),
        )
        .unwrap();

        let err = engine.answer_with_citations("q", DOC).await.unwrap_err();
        assert!(matches!(err, Error::IndexUnavailable(_)));
    }

    #[tokio::test]
    async fn test_retrieval_error_propagates() {
        let llm: Arc<dyn LlmProvider> = Arc::new(ScriptedLlm::new(""));
        let engine =
            CitationQueryEngine::new(Arc::new(StaticRetriever::failing()), llm, &RagConfig::default())
                .unwrap();

        let err = engine.stream_with_citations("q", DOC).await.unwrap_err();
        assert!(matches!(err, Error::Retrieval(_)));
    }

    #[tokio::test]
    async fn test_no_sources_skips_the_model() {
        let llm = Arc::new(ScriptedLlm::new("should not be used"));
        let engine = engine(llm.clone(), CitationPolicy::Strict);

        let response = engine.answer_with_citations("q", "other-doc").await.unwrap();
        assert_eq!(response.answer, NOT_FOUND_ANSWER);
        assert_eq!(response.chunks_retrieved, 0);

        let events = collect(engine.stream_with_citations("q", "other-doc").await.unwrap()).await;
        assert!(matches!(events.last(), Some(Ok(StreamEvent::Completed(_)))));
        assert!(llm.prompts().is_empty());
    }

    #[tokio::test]
    async fn test_query_dispatches_on_mode() {
        let llm = Arc::new(ScriptedLlm::new("Red. [1]"));
        let engine = engine(llm, CitationPolicy::Strict);

        assert!(matches!(
            engine.query("q", DOC, SynthesisMode::Buffered).await.unwrap(),
            QueryOutcome::Buffered(_)
        ));
        assert!(matches!(
            engine.query("q", DOC, SynthesisMode::Streaming).await.unwrap(),
            QueryOutcome::Streaming(_)
        ));
    }

    #[test]
    fn test_engine_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<CitationQueryEngine>();
    }
}
