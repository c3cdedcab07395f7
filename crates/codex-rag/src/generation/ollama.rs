//! Ollama HTTP client for generation and embeddings

use std::collections::VecDeque;
use std::fmt;
use std::pin::Pin;
use std::time::Duration;

use futures::stream::{self, Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;
use crate::error::{Error, Result};
use crate::providers::llm::TokenStream;

/// Ollama API client
pub struct OllamaClient {
    /// HTTP client
    client: Client,
    /// Configuration
    config: LlmConfig,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'static str>,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
    num_ctx: usize,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

impl OllamaClient {
    /// Create a new Ollama client
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .pool_max_idle_per_host(5)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    /// Check if Ollama is available
    pub async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/api/tags", self.config.base_url);

        match self.client.get(&url).send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    /// Generate an embedding
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/api/embeddings", self.config.base_url);
        let request = EmbedRequest {
            model: &self.config.embed_model,
            prompt: text,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::embedding(format!("Embedding request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::embedding(format!(
                "Embedding failed: HTTP {}",
                response.status()
            )));
        }

        let embed_response: EmbedResponse = response
            .json()
            .await
            .map_err(|e| Error::embedding(format!("Failed to parse embedding response: {}", e)))?;

        Ok(embed_response.embedding)
    }

    /// Generate a complete response; `json` sets Ollama's `format: "json"`
    pub async fn generate(&self, prompt: &str, json: bool) -> Result<String> {
        tracing::info!(
            "Generating answer with model: {} ({} prompt chars)",
            self.config.generate_model,
            prompt.len()
        );

        let response = self
            .client
            .post(self.generate_url())
            .json(&self.generate_request(prompt, false, json))
            .send()
            .await
            .map_err(|e| Error::model(format!("Generation request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::model(format!(
                "Generation failed: HTTP {} - {}",
                status, body
            )));
        }

        let generate_response: GenerateResponse = response
            .json()
            .await
            .map_err(|e| Error::model(format!("Failed to parse generation response: {}", e)))?;

        Ok(generate_response.response)
    }

    /// Generate a streaming response, one item per model token
    pub async fn generate_stream(&self, prompt: &str) -> Result<TokenStream> {
        tracing::info!("Streaming answer with model: {}", self.config.generate_model);

        let response = self
            .client
            .post(self.generate_url())
            .json(&self.generate_request(prompt, true, false))
            .send()
            .await
            .map_err(|e| Error::model(format!("Stream request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::model(format!(
                "Stream failed: HTTP {}",
                response.status()
            )));
        }

        Ok(decode_ndjson(response.bytes_stream()))
    }

    fn generate_url(&self) -> String {
        format!("{}/api/generate", self.config.base_url)
    }

    fn generate_request<'a>(&'a self, prompt: &'a str, stream: bool, json: bool) -> GenerateRequest<'a> {
        GenerateRequest {
            model: &self.config.generate_model,
            prompt,
            stream,
            format: json.then_some("json"),
            options: GenerateOptions {
                temperature: self.config.temperature,
                num_ctx: self.config.context_size,
            },
        }
    }
}

struct NdjsonState<S> {
    body: Pin<Box<S>>,
    buffer: Vec<u8>,
    pending: VecDeque<Result<String>>,
    finished: bool,
}

impl<S> NdjsonState<S> {
    fn drain_lines(&mut self) {
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            self.decode_line(&line);
            if self.finished {
                self.buffer.clear();
                return;
            }
        }
    }

    fn decode_line(&mut self, line: &[u8]) {
        let line = String::from_utf8_lossy(line);
        let line = line.trim();
        if line.is_empty() {
            return;
        }

        match serde_json::from_str::<StreamChunk>(line) {
            Ok(StreamChunk { error: Some(message), .. }) => {
                self.fail(format!("Ollama reported: {}", message));
            }
            Ok(chunk) => {
                if !chunk.response.is_empty() {
                    self.pending.push_back(Ok(chunk.response));
                }
                if chunk.done {
                    self.finished = true;
                }
            }
            Err(e) => self.fail(format!("Malformed stream line: {}", e)),
        }
    }

    fn fail(&mut self, message: String) {
        self.pending.push_back(Err(Error::model(message)));
        self.finished = true;
    }
}

/// Turn an NDJSON byte stream from `/api/generate` into tokens.
///
/// Lines may be split across byte chunks. The stream ends at the first
/// `done: true` line, at the first error, or when the body ends.
pub(crate) fn decode_ndjson<S, B, E>(body: S) -> TokenStream
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send,
    E: fmt::Display + Send,
{
    let state = NdjsonState {
        body: Box::pin(body),
        buffer: Vec::new(),
        pending: VecDeque::new(),
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                return Some((item, state));
            }
            if state.finished {
                return None;
            }

            match state.body.next().await {
                Some(Ok(bytes)) => {
                    state.buffer.extend_from_slice(bytes.as_ref());
                    state.drain_lines();
                }
                Some(Err(e)) => state.fail(format!("Stream error: {}", e)),
                None => {
                    let rest = std::mem::take(&mut state.buffer);
                    state.decode_line(&rest);
                    state.finished = true;
                }
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(chunks: &[&str]) -> impl Stream<Item = std::result::Result<Vec<u8>, String>> {
        let chunks: Vec<_> = chunks.iter().map(|c| Ok(c.as_bytes().to_vec())).collect();
        stream::iter(chunks)
    }

    async fn tokens(chunks: &[&str]) -> Vec<Result<String>> {
        decode_ndjson(body(chunks)).collect().await
    }

    #[tokio::test]
    async fn test_decodes_one_token_per_line() {
        let out = tokens(&[
            "{\"response\":\"The\",\"done\":false}\n{\"response\":\" sky\",\"done\":false}\n",
            "{\"response\":\"\",\"done\":true}\n",
        ])
        .await;

        let out: Vec<String> = out.into_iter().map(|t| t.unwrap()).collect();
        assert_eq!(out, vec!["The", " sky"]);
    }

    #[tokio::test]
    async fn test_lines_split_across_chunks() {
        let out = tokens(&["{\"respo", "nse\":\" [2,\",\"done\":false}\n{\"response\":\"1]\"", ",\"done\":false}\n"])
            .await;

        let out: Vec<String> = out.into_iter().map(|t| t.unwrap()).collect();
        assert_eq!(out, vec![" [2,", "1]"]);
    }

    #[tokio::test]
    async fn test_stops_after_done() {
        let out = tokens(&[
            "{\"response\":\"a\",\"done\":true}\n{\"response\":\"b\",\"done\":false}\n",
        ])
        .await;
        assert_eq!(out.len(), 1);
    }

    #[tokio::test]
    async fn test_error_line_is_model_error() {
        let out = tokens(&["{\"response\":\"a\"}\n", "{\"error\":\"model not found\"}\n"]).await;
        assert_eq!(out.len(), 2);
        assert!(matches!(&out[1], Err(Error::ModelInvocation(m)) if m.contains("model not found")));
    }

    #[tokio::test]
    async fn test_transport_error_ends_stream() {
        let body = stream::iter(vec![
            Ok(b"{\"response\":\"a\"}\n".to_vec()),
            Err("connection reset".to_string()),
            Ok(b"{\"response\":\"b\"}\n".to_vec()),
        ]);

        let out: Vec<Result<String>> = decode_ndjson(body).collect().await;
        assert_eq!(out.len(), 2);
        assert!(matches!(out[1], Err(Error::ModelInvocation(_))));
    }

    #[tokio::test]
    async fn test_trailing_line_without_newline() {
        let out = tokens(&["{\"response\":\"end\"}"]).await;
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].as_ref().unwrap(), "end");
    }

    #[test]
    fn test_json_format_only_when_requested() {
        let client = OllamaClient::new(&LlmConfig::default()).unwrap();

        let plain = serde_json::to_value(client.generate_request("p", false, false)).unwrap();
        assert!(plain.get("format").is_none());
        assert_eq!(plain["stream"], false);

        let json = serde_json::to_value(client.generate_request("p", false, true)).unwrap();
        assert_eq!(json["format"], "json");
        assert_eq!(json["options"]["num_ctx"], 4096);
    }
}
