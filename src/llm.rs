//! LLM API Client
//!
//! OpenAI-compatible chat completions client with token streaming.
//! The pipeline only sees the [`TextGenerator`] trait, so tests can swap in
//! a scripted generator.

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::pin::Pin;
use tracing::{debug, info};

use crate::config::Config;

/// Errors from the text-generation service
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("LLM_API_KEY not set")]
    MissingApiKey,

    #[error("HTTP request failed: {0}")]
    Transport(String),

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Stream read error: {0}")]
    Stream(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Request timed out after {0} seconds")]
    Timeout(u64),
}

/// Ordered token stream from a streamed completion
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String, LlmError>> + Send>>;

/// Message in a chat exchange
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Opaque text-generation service
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Start a streamed completion. Tokens arrive in generation order.
    async fn stream_chat(&self, messages: &[ChatMessage]) -> Result<TokenStream, LlmError>;

    /// Run a non-streaming completion and return the full text.
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, LlmError>;
}

/// API request
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    max_tokens: usize,
    messages: &'a [ChatMessage],
    stream: bool,
}

/// Non-streaming API response
#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ResponseChoice>,
}

#[derive(Debug, Deserialize)]
struct ResponseChoice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// One `data:` payload of a streamed response
#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Option<Delta>,
}

#[derive(Debug, Deserialize)]
struct Delta {
    content: Option<String>,
}

/// OpenAI-compatible client
#[derive(Clone)]
pub struct OpenAiClient {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    model: String,
    max_tokens: usize,
}

impl OpenAiClient {
    pub fn new(api_key: Option<&str>, base_url: &str, model: &str, max_tokens: usize) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.map(|s| s.to_string()),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            max_tokens,
        }
    }

    /// Create from config
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.llm_api_key.as_deref(),
            &config.llm_base_url,
            &config.llm_model,
            config.max_tokens,
        )
    }

    /// Check if API key is configured
    pub fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    async fn post(&self, messages: &[ChatMessage], stream: bool) -> Result<reqwest::Response, LlmError> {
        let api_key = self.api_key.as_ref().ok_or(LlmError::MissingApiKey)?;

        let request = ChatRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            messages,
            stream,
        };

        debug!(
            "Calling LLM API: model={}, messages={}, stream={}",
            self.model,
            messages.len(),
            stream
        );

        let response = self
            .client
            .post(self.endpoint())
            .header("Authorization", format!("Bearer {}", api_key))
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status,
                message: truncate(&text, 200),
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl TextGenerator for OpenAiClient {
    async fn stream_chat(&self, messages: &[ChatMessage]) -> Result<TokenStream, LlmError> {
        let response = self.post(messages, true).await?;
        let bytes = response
            .bytes_stream()
            .map(|chunk| chunk.map(|b| b.to_vec()))
            .boxed();

        Ok(Box::pin(sse_tokens(bytes)))
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        let response = self.post(messages, false).await?;
        let result: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::MalformedResponse(e.to_string()))?;

        let content = result
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| LlmError::MalformedResponse("no message content".to_string()))?;

        info!("LLM completion: model={}, chars={}", self.model, content.len());
        Ok(content)
    }
}

/// Incremental SSE decoder over a byte stream
struct SseDecoder {
    bytes: BoxStream<'static, reqwest::Result<Vec<u8>>>,
    buffer: Vec<u8>,
    pending: VecDeque<Result<String, LlmError>>,
    finished: bool,
}

impl SseDecoder {
    /// Move every complete line out of the buffer
    fn drain_lines(&mut self) {
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            if self.finished {
                self.buffer.clear();
                return;
            }
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            let Some(data) = line.trim().strip_prefix("data:") else {
                continue;
            };
            let data = data.trim();
            if data == "[DONE]" {
                self.finished = true;
                continue;
            }
            match parse_stream_chunk(data) {
                Ok(Some(token)) => self.pending.push_back(Ok(token)),
                Ok(None) => {}
                Err(e) => {
                    self.pending.push_back(Err(e));
                    self.finished = true;
                }
            }
        }
    }
}

fn sse_tokens(
    bytes: BoxStream<'static, reqwest::Result<Vec<u8>>>,
) -> impl Stream<Item = Result<String, LlmError>> + Send {
    let decoder = SseDecoder {
        bytes,
        buffer: Vec::new(),
        pending: VecDeque::new(),
        finished: false,
    };

    stream::unfold(decoder, |mut dec| async move {
        loop {
            if let Some(item) = dec.pending.pop_front() {
                return Some((item, dec));
            }
            if dec.finished {
                return None;
            }
            match dec.bytes.next().await {
                Some(Ok(chunk)) => {
                    dec.buffer.extend_from_slice(&chunk);
                    dec.drain_lines();
                }
                Some(Err(e)) => {
                    dec.finished = true;
                    return Some((Err(LlmError::Stream(e.to_string())), dec));
                }
                None => {
                    // Flush a trailing line without newline, then stop
                    dec.buffer.push(b'\n');
                    dec.drain_lines();
                    dec.finished = true;
                }
            }
        }
    })
}

/// Parse one `data:` payload. `Ok(None)` for chunks without content.
fn parse_stream_chunk(data: &str) -> Result<Option<String>, LlmError> {
    let chunk: StreamChunk = serde_json::from_str(data)
        .map_err(|e| LlmError::MalformedResponse(format!("{}: {}", e, truncate(data, 100))))?;

    if let Some(error) = chunk.error {
        return Err(LlmError::Api {
            status: 200,
            message: truncate(&error.to_string(), 200),
        });
    }

    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta)
        .and_then(|d| d.content)
        .filter(|c| !c.is_empty()))
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_chars).collect();
        format!("{}...", head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn byte_stream(chunks: Vec<&'static str>) -> BoxStream<'static, reqwest::Result<Vec<u8>>> {
        stream::iter(chunks.into_iter().map(|c| Ok(c.as_bytes().to_vec()))).boxed()
    }

    #[test]
    fn test_parse_stream_chunk_content() {
        let data = r#"{"choices":[{"delta":{"content":"Hello"}}]}"#;
        assert_eq!(parse_stream_chunk(data).unwrap(), Some("Hello".to_string()));
    }

    #[test]
    fn test_parse_stream_chunk_skips_empty() {
        assert_eq!(parse_stream_chunk(r#"{"choices":[]}"#).unwrap(), None);
        assert_eq!(
            parse_stream_chunk(r#"{"choices":[{"delta":{"role":"assistant"}}]}"#).unwrap(),
            None
        );
    }

    #[test]
    fn test_parse_stream_chunk_malformed() {
        assert!(matches!(
            parse_stream_chunk("{not json"),
            Err(LlmError::MalformedResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_sse_tokens_split_across_chunks() {
        let bytes = byte_stream(vec![
            "data: {\"choices\":[{\"delta\":{\"content\":\"---\\n\"}}]}\n\ndata: {\"choi",
            "ces\":[{\"delta\":{\"content\":\"name\"}}]}\n\n",
            ": keep-alive\n\n",
            "data: [DONE]\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"ignored\"}}]}\n\n",
        ]);

        let tokens: Vec<String> = sse_tokens(bytes)
            .map(|t| t.unwrap())
            .collect()
            .await;

        assert_eq!(tokens, vec!["---\n".to_string(), "name".to_string()]);
    }

    #[tokio::test]
    async fn test_sse_tokens_without_done_marker() {
        let bytes = byte_stream(vec!["data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}"]);
        let tokens: Vec<_> = sse_tokens(bytes).collect().await;
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].as_ref().unwrap(), "a");
    }

    #[tokio::test]
    async fn test_sse_tokens_malformed_ends_stream() {
        let bytes = byte_stream(vec![
            "data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n",
            "data: garbage\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"b\"}}]}\n",
        ]);
        let items: Vec<_> = sse_tokens(bytes).collect().await;
        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        assert!(items[1].is_err());
    }

    #[tokio::test]
    async fn test_missing_api_key() {
        let client = OpenAiClient::new(None, "http://localhost:1/v1", "test", 16);
        assert!(!client.is_available());
        let result = client.complete(&[ChatMessage::user("hi")]).await;
        assert!(matches!(result, Err(LlmError::MissingApiKey)));
    }

    #[test]
    fn test_endpoint_trims_slash() {
        let client = OpenAiClient::new(Some("k"), "https://api.example.com/v1/", "m", 16);
        assert_eq!(client.endpoint(), "https://api.example.com/v1/chat/completions");
    }
}
