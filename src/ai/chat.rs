//! Chat completion client for OpenAI-compatible providers.
//!
//! Two modes: a buffered [`ChatApi::complete`] call and a streaming
//! [`ChatApi::complete_stream`] that forwards delta fragments through an
//! mpsc channel as they arrive. Provider responses are loosely-typed JSON;
//! fields are read through optional accessors so a schema change degrades
//! into an upstream error instead of a panic.

use crate::ai::errors::AiError;
use crate::config::CompletionConfig;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::mpsc;

/// Buffer size for the streaming fragment channel.
const STREAM_CHANNEL_CAPACITY: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChatOptions {
    /// Overrides the configured model when set
    pub model: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            model: None,
            max_tokens: 500,
            temperature: 0.7,
        }
    }
}

/// A stream of completion fragments. Closed channel means end-of-stream;
/// an `Err` item is terminal. Not restartable: retry means a new request.
pub type FragmentStream = mpsc::Receiver<Result<String, AiError>>;

#[async_trait]
pub trait ChatApi: Send + Sync {
    /// Request a completion and wait for the full response text.
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        opts: ChatOptions,
    ) -> Result<String, AiError>;

    /// Request a streaming completion. Fragments arrive in provider order.
    /// Dropping the returned receiver tears down the upstream request.
    async fn complete_stream(
        &self,
        messages: Vec<ChatMessage>,
        opts: ChatOptions,
    ) -> Result<FragmentStream, AiError>;
}

pub struct HttpChatClient {
    http: reqwest::Client,
    config: CompletionConfig,
}

impl HttpChatClient {
    pub fn new(config: CompletionConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.config.api_key.is_empty()
    }

    fn request_body(&self, messages: &[ChatMessage], opts: &ChatOptions, stream: bool) -> Value {
        let model = opts.model.as_deref().unwrap_or(&self.config.model);
        let mut body = json!({
            "model": model,
            "messages": messages,
            "max_tokens": opts.max_tokens,
            "temperature": opts.temperature,
        });
        if stream {
            body["stream"] = Value::Bool(true);
        }
        body
    }

    async fn send(
        &self,
        messages: &[ChatMessage],
        opts: &ChatOptions,
        stream: bool,
    ) -> Result<reqwest::Response, AiError> {
        if !self.is_configured() {
            return Err(AiError::NotConfigured("completion"));
        }

        let url = format!("{}/chat/completions", self.config.base_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .timeout(Duration::from_millis(self.config.timeout_ms))
            .json(&self.request_body(messages, opts, stream))
            .send()
            .await
            .map_err(|err| AiError::upstream(format!("completion request failed: {err}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            log::error!("completion API error: status={status} body={body}");
            return Err(AiError::upstream(upstream_error_message(&body)));
        }

        Ok(response)
    }
}

#[async_trait]
impl ChatApi for HttpChatClient {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        opts: ChatOptions,
    ) -> Result<String, AiError> {
        let response = self.send(&messages, &opts, false).await?;

        let body: Value = response
            .json()
            .await
            .map_err(|err| AiError::upstream(format!("completion response unreadable: {err}")))?;

        body.get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|v| v.as_str())
            .map(str::to_owned)
            .ok_or_else(|| AiError::upstream("completion response had no message content"))
    }

    async fn complete_stream(
        &self,
        messages: Vec<ChatMessage>,
        opts: ChatOptions,
    ) -> Result<FragmentStream, AiError> {
        let mut response = self.send(&messages, &opts, true).await?;

        let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);

        tokio::spawn(async move {
            let mut lines = SseLineBuffer::default();

            loop {
                let chunk = match response.chunk().await {
                    Ok(Some(chunk)) => chunk,
                    // natural end of the response body
                    Ok(None) => break,
                    Err(err) => {
                        let _ = tx
                            .send(Err(AiError::upstream(format!("stream read failed: {err}"))))
                            .await;
                        return;
                    }
                };

                for line in lines.push(&chunk) {
                    match parse_sse_line(&line) {
                        Some(SseChunk::Done) => return,
                        Some(SseChunk::Delta(fragment)) => {
                            // receiver dropped: subscriber is gone, stop
                            // polling so the upstream request is torn down
                            if tx.send(Ok(fragment)).await.is_err() {
                                return;
                            }
                        }
                        None => {}
                    }
                }
            }
        });

        Ok(rx)
    }
}

/// One parsed server-sent-event data line from the completion stream.
#[derive(Debug, PartialEq)]
pub enum SseChunk {
    /// Explicit `[DONE]` end marker
    Done,
    /// A non-empty delta text fragment
    Delta(String),
}

/// Parse a single SSE line. Returns `None` for comments, empty deltas,
/// unparsable payloads and anything that is not a `data:` line; a broken
/// frame mid-stream is skipped rather than treated as fatal.
pub fn parse_sse_line(line: &str) -> Option<SseChunk> {
    let data = line.strip_prefix("data: ").or_else(|| line.strip_prefix("data:"))?;
    let data = data.trim();

    if data == "[DONE]" {
        return Some(SseChunk::Done);
    }

    let parsed: Value = serde_json::from_str(data).ok()?;
    let fragment = parsed
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("delta"))
        .and_then(|d| d.get("content"))
        .and_then(|v| v.as_str())?;

    if fragment.is_empty() {
        None
    } else {
        Some(SseChunk::Delta(fragment.to_string()))
    }
}

/// Splits raw body chunks into complete lines, holding back a trailing
/// partial line until the rest of it arrives.
#[derive(Default)]
pub struct SseLineBuffer {
    pending: String,
}

impl SseLineBuffer {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.push_str(&String::from_utf8_lossy(chunk));

        let mut lines = vec![];
        while let Some(pos) = self.pending.find('\n') {
            let line = self.pending[..pos].trim_end_matches('\r').to_string();
            self.pending.drain(..=pos);
            if !line.trim().is_empty() {
                lines.push(line);
            }
        }
        lines
    }
}

/// Extract the provider's error message from an error body, falling back to
/// a generic message when the body is not the expected shape.
fn upstream_error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .as_ref()
        .and_then(|v| v.get("error"))
        .and_then(|e| e.get("message"))
        .and_then(|m| m.as_str())
        .map(str::to_owned)
        .unwrap_or_else(|| "completion request failed".to_string())
}
