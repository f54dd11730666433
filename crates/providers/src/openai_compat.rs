//! OpenAI-compatible provider implementation.
//!
//! Works with: OpenAI, OpenRouter, Ollama, vLLM, Together AI, Groq and any
//! endpoint exposing `/v1/chat/completions` and `/v1/embeddings`.
//!
//! Supports:
//! - Streaming chat completions (SSE)
//! - Embeddings (used by the retriever to embed queries)
//! - Health checks

use async_trait::async_trait;
use futures::StreamExt;
use ragline_core::error::ProviderError;
use ragline_core::message::{Message, Role};
use ragline_core::provider::*;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, trace, warn};

/// An OpenAI-compatible LLM provider.
///
/// One instance is built at startup and shared by every query. The
/// underlying `reqwest::Client` pools connections and is safe to use from
/// many tasks at once; per-request settings travel in [`ProviderRequest`].
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// Create a new OpenAI-compatible provider.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::NotConfigured(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        })
    }

    /// Create an OpenAI provider (convenience constructor).
    pub fn openai(api_key: impl Into<String>) -> Result<Self, ProviderError> {
        Self::new(
            "openai",
            "https://api.openai.com/v1",
            api_key,
            Duration::from_secs(120),
        )
    }

    /// Create an Ollama provider (convenience constructor).
    pub fn ollama(base_url: Option<&str>) -> Result<Self, ProviderError> {
        Self::new(
            "ollama",
            base_url.unwrap_or("http://localhost:11434/v1"),
            "ollama", // Ollama doesn't need a real key
            Duration::from_secs(120),
        )
    }

    /// The base URL requests are sent to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Convert our Message types to OpenAI API format.
    fn to_api_messages(messages: &[Message]) -> Vec<ApiMessage> {
        messages
            .iter()
            .map(|m| ApiMessage {
                role: match m.role {
                    Role::User => "user".into(),
                    Role::Assistant => "assistant".into(),
                    Role::System => "system".into(),
                },
                content: m.content.clone(),
            })
            .collect()
    }

    /// Build the JSON body of a streaming chat completion.
    fn stream_body(request: &ProviderRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model,
            "messages": Self::to_api_messages(&request.messages),
            "temperature": request.temperature,
            "stream": true,
            "stream_options": { "include_usage": true },
        });

        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        if !request.stop.is_empty() {
            body["stop"] = serde_json::json!(request.stop);
        }

        body
    }

    /// Map non-200 responses onto provider errors.
    async fn check_status(
        &self,
        response: reqwest::Response,
    ) -> Result<reqwest::Response, ProviderError> {
        let status = response.status().as_u16();

        if status == 429 {
            return Err(ProviderError::RateLimited {
                retry_after_secs: 5,
            });
        }

        if status == 401 || status == 403 {
            return Err(ProviderError::AuthenticationFailed(
                "Invalid API key or insufficient permissions".into(),
            ));
        }

        if status == 404 {
            let error_body = response.text().await.unwrap_or_default();
            return Err(ProviderError::ModelNotFound(error_body));
        }

        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(provider = %self.name, status, body = %error_body, "Provider returned error");
            return Err(ProviderError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        Ok(response)
    }
}

fn network_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout(e.to_string())
    } else {
        ProviderError::Network(e.to_string())
    }
}

#[async_trait]
impl ragline_core::Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await
            .map_err(network_error)?;

        Ok(response.status().is_success())
    }

    async fn embed(
        &self,
        request: EmbeddingRequest,
    ) -> std::result::Result<EmbeddingResponse, ProviderError> {
        let url = format!("{}/embeddings", self.base_url);

        let body = serde_json::json!({
            "model": request.model,
            "input": request.inputs,
            "encoding_format": "float",
        });

        debug!(
            provider = %self.name,
            model = %request.model,
            count = request.inputs.len(),
            "Sending embedding request"
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(network_error)?;

        let response = self.check_status(response).await?;

        let api_resp: EmbeddingApiResponse =
            response.json().await.map_err(|e| ProviderError::ApiError {
                status_code: 200,
                message: format!("Failed to parse embedding response: {e}"),
            })?;

        let embeddings = api_resp.data.into_iter().map(|d| d.embedding).collect();

        let usage = api_resp.usage.map(|u| Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: 0,
            total_tokens: u.total_tokens,
        });

        Ok(EmbeddingResponse {
            embeddings,
            model: api_resp.model,
            usage,
        })
    }

    async fn stream(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ChunkReceiver, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = Self::stream_body(&request);

        debug!(
            provider = %self.name,
            model = %request.model,
            temperature = request.temperature,
            "Sending streaming request"
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .header("Accept", "text/event-stream")
            .json(&body)
            .send()
            .await
            .map_err(network_error)?;

        let response = self.check_status(response).await?;

        let (tx, rx) = tokio::sync::mpsc::channel(64);
        let provider_name = self.name.clone();

        // Read the SSE byte stream. The response is owned by this task, so it
        // is released as soon as the task returns.
        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut lines = SseLineBuffer::default();
            let mut usage = None;

            while let Some(chunk_result) = byte_stream.next().await {
                let bytes = match chunk_result {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx
                            .send(Err(ProviderError::StreamInterrupted(e.to_string())))
                            .await;
                        return;
                    }
                };

                for line in lines.push(&bytes) {
                    match parse_sse_line(&line) {
                        Ok(SseFrame::Ignore) => {}
                        Ok(SseFrame::Done) => {
                            let _ = tx.send(Ok(StreamChunk::finished(usage))).await;
                            return;
                        }
                        Ok(SseFrame::Payload(payload)) => {
                            if let Some(api_usage) = payload.usage {
                                usage = Some(Usage {
                                    prompt_tokens: api_usage.prompt_tokens,
                                    completion_tokens: api_usage.completion_tokens,
                                    total_tokens: api_usage.total_tokens,
                                });
                            }

                            let content = payload
                                .choices
                                .into_iter()
                                .next()
                                .and_then(|c| c.delta.content)
                                .filter(|c| !c.is_empty());

                            if let Some(content) = content {
                                if tx.send(Ok(StreamChunk::text(content))).await.is_err() {
                                    trace!(provider = %provider_name, "Stream receiver dropped");
                                    return;
                                }
                            }
                        }
                        Err(e) => {
                            warn!(provider = %provider_name, error = %e, "Aborting stream");
                            let _ = tx.send(Err(e)).await;
                            return;
                        }
                    }
                }
            }

            // Stream ended without [DONE]
            let _ = tx.send(Ok(StreamChunk::finished(usage))).await;
        });

        Ok(rx)
    }
}

// --- SSE framing ---

/// Splits an incoming byte stream into complete lines.
///
/// Bytes are held until a newline arrives, so a multi-byte character split
/// across network chunks is decoded whole.
#[derive(Debug, Default)]
struct SseLineBuffer {
    buffer: Vec<u8>,
}

impl SseLineBuffer {
    /// Append bytes and drain every complete line.
    fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);

        let mut lines = Vec::new();
        while let Some(line_end) = self.buffer.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=line_end).collect();
            let line = String::from_utf8_lossy(&raw[..line_end]);
            lines.push(line.trim_end_matches('\r').to_string());
        }
        lines
    }
}

/// One interpreted SSE line.
#[derive(Debug)]
enum SseFrame {
    /// Blank lines, comments, and non-data fields
    Ignore,
    /// The `[DONE]` sentinel
    Done,
    Payload(StreamResponse),
}

fn parse_sse_line(line: &str) -> Result<SseFrame, ProviderError> {
    if line.is_empty() || line.starts_with(':') {
        return Ok(SseFrame::Ignore);
    }

    let Some(data) = line.strip_prefix("data:") else {
        return Ok(SseFrame::Ignore);
    };
    let data = data.trim();

    if data == "[DONE]" {
        return Ok(SseFrame::Done);
    }

    let payload: StreamResponse = serde_json::from_str(data).map_err(|e| {
        ProviderError::StreamInterrupted(format!("malformed stream chunk: {e}"))
    })?;

    if let Some(error) = payload.error {
        return Err(ProviderError::ApiError {
            status_code: 200,
            message: error.message,
        });
    }

    Ok(SseFrame::Payload(payload))
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

// --- Embedding API types ---

#[derive(Debug, Deserialize)]
struct EmbeddingApiResponse {
    data: Vec<EmbeddingData>,
    model: String,
    usage: Option<EmbeddingApiUsage>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingApiUsage {
    prompt_tokens: u32,
    total_tokens: u32,
}

// --- Streaming SSE types ---

/// A single SSE `data: {...}` chunk from a streaming response.
#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
    #[serde(default)]
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
    #[serde(default)]
    #[allow(dead_code)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragline_core::Provider;

    #[test]
    fn openai_constructor() {
        let provider = OpenAiCompatProvider::openai("sk-test").unwrap();
        assert_eq!(provider.name(), "openai");
        assert!(provider.base_url().contains("api.openai.com"));
    }

    #[test]
    fn ollama_constructor() {
        let provider = OpenAiCompatProvider::ollama(None).unwrap();
        assert_eq!(provider.name(), "ollama");
        assert!(provider.base_url().contains("localhost:11434"));
    }

    #[test]
    fn trailing_slash_trimmed() {
        let provider =
            OpenAiCompatProvider::new("x", "http://host/v1/", "k", Duration::from_secs(5)).unwrap();
        assert_eq!(provider.base_url(), "http://host/v1");
    }

    #[test]
    fn message_conversion() {
        let messages = vec![Message::system("You are helpful"), Message::user("Hello")];
        let api_messages = OpenAiCompatProvider::to_api_messages(&messages);
        assert_eq!(api_messages.len(), 2);
        assert_eq!(api_messages[0].role, "system");
        assert_eq!(api_messages[1].role, "user");
    }

    #[test]
    fn stream_body_carries_temperature_and_budget() {
        let body = OpenAiCompatProvider::stream_body(&ProviderRequest {
            model: "gpt-4o-mini".into(),
            messages: vec![Message::user("hi")],
            temperature: 0.0,
            max_tokens: Some(500),
            stop: vec![],
        });
        assert_eq!(body["temperature"], serde_json::json!(0.0));
        assert_eq!(body["max_tokens"], serde_json::json!(500));
        assert_eq!(body["stream"], serde_json::json!(true));
        assert!(body.get("stop").is_none());
    }

    // --- SSE parsing tests ---

    #[test]
    fn line_buffer_handles_split_lines() {
        let mut buf = SseLineBuffer::default();
        assert!(buf.push(b"data: {\"choi").is_empty());
        let lines = buf.push(b"ces\":[]}\r\n\ndata: [DONE]\n");
        assert_eq!(lines, vec!["data: {\"choices\":[]}", "", "data: [DONE]"]);
    }

    #[test]
    fn line_buffer_keeps_split_multibyte_chars() {
        let mut buf = SseLineBuffer::default();
        let text = "data: café\n".as_bytes();
        let split = text.len() - 2;
        assert!(buf.push(&text[..split]).is_empty());
        assert_eq!(buf.push(&text[split..]), vec!["data: café"]);
    }

    #[test]
    fn parse_content_delta() {
        let frame =
            parse_sse_line(r#"data: {"choices":[{"delta":{"content":"Hello"},"finish_reason":null}]}"#)
                .unwrap();
        match frame {
            SseFrame::Payload(p) => {
                assert_eq!(p.choices[0].delta.content.as_deref(), Some("Hello"))
            }
            other => panic!("expected payload, got {other:?}"),
        }
    }

    #[test]
    fn parse_done_sentinel() {
        assert!(matches!(parse_sse_line("data: [DONE]").unwrap(), SseFrame::Done));
    }

    #[test]
    fn comments_and_blank_lines_ignored() {
        assert!(matches!(parse_sse_line("").unwrap(), SseFrame::Ignore));
        assert!(matches!(parse_sse_line(": keep-alive").unwrap(), SseFrame::Ignore));
        assert!(matches!(parse_sse_line("event: message").unwrap(), SseFrame::Ignore));
    }

    #[test]
    fn malformed_chunk_is_stream_error() {
        let err = parse_sse_line("data: {not json").unwrap_err();
        assert!(matches!(err, ProviderError::StreamInterrupted(_)));
    }

    #[test]
    fn error_payload_is_api_error() {
        let err = parse_sse_line(r#"data: {"error":{"message":"context length exceeded"}}"#)
            .unwrap_err();
        assert!(err.to_string().contains("context length exceeded"));
    }

    #[test]
    fn parse_stream_usage() {
        let frame = parse_sse_line(
            r#"data: {"choices":[],"usage":{"prompt_tokens":10,"completion_tokens":5,"total_tokens":15}}"#,
        )
        .unwrap();
        let SseFrame::Payload(p) = frame else {
            panic!("expected payload");
        };
        let usage = p.usage.unwrap();
        assert_eq!(usage.prompt_tokens, 10);
        assert_eq!(usage.total_tokens, 15);
    }

    #[test]
    fn parse_embedding_response() {
        let data = r#"{
            "data": [
                {"embedding": [0.1, 0.2, 0.3], "index": 0},
                {"embedding": [0.4, 0.5, 0.6], "index": 1}
            ],
            "model": "text-embedding-3-small",
            "usage": {"prompt_tokens": 8, "total_tokens": 8}
        }"#;
        let parsed: EmbeddingApiResponse = serde_json::from_str(data).unwrap();
        assert_eq!(parsed.data.len(), 2);
        assert_eq!(parsed.data[1].embedding, vec![0.4, 0.5, 0.6]);
        assert_eq!(parsed.usage.unwrap().prompt_tokens, 8);
    }
}
