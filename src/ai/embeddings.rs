//! Embedding client for OpenAI-compatible `/embeddings` endpoints.
//!
//! Unlike the completion client, upstream failures here are deliberately
//! collapsed into a generic "vector generation failed" message: embedding
//! calls run in background tasks and during interactive search, and the
//! provider's error bodies are logged rather than surfaced.

use crate::ai::errors::AiError;
use crate::ai::prompts::truncate_chars;
use crate::config::EmbeddingConfig;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

/// Maximum input length for embedding requests, in characters.
pub const MAX_EMBED_INPUT_CHARS: usize = 8000;

const GENERIC_FAILURE: &str = "vector generation failed";

#[async_trait]
pub trait EmbeddingApi: Send + Sync {
    /// Convert text into one fixed-length vector. Input longer than
    /// [`MAX_EMBED_INPUT_CHARS`] is truncated before dispatch.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, AiError>;
}

pub struct HttpEmbeddingClient {
    http: reqwest::Client,
    config: EmbeddingConfig,
}

impl HttpEmbeddingClient {
    pub fn new(config: EmbeddingConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.config.api_key.is_empty()
    }
}

#[async_trait]
impl EmbeddingApi for HttpEmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, AiError> {
        if !self.is_configured() {
            return Err(AiError::NotConfigured("embedding"));
        }

        let input = truncate_chars(text, MAX_EMBED_INPUT_CHARS);
        let url = format!("{}/embeddings", self.config.base_url);

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .timeout(Duration::from_millis(self.config.timeout_ms))
            .json(&json!({
                "model": self.config.model,
                "input": input,
            }))
            .send()
            .await
            .map_err(|err| {
                log::error!("embedding request failed: {err}");
                AiError::upstream(GENERIC_FAILURE)
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            log::error!("embedding API error: status={status} body={body}");
            return Err(AiError::upstream(GENERIC_FAILURE));
        }

        let body: Value = response.json().await.map_err(|err| {
            log::error!("embedding response unreadable: {err}");
            AiError::upstream(GENERIC_FAILURE)
        })?;

        parse_embedding(&body).ok_or_else(|| {
            log::error!("embedding response had no vector");
            AiError::upstream(GENERIC_FAILURE)
        })
    }
}

/// Pull `data[0].embedding` out of a provider response.
fn parse_embedding(body: &Value) -> Option<Vec<f32>> {
    let values = body
        .get("data")?
        .get(0)?
        .get("embedding")?
        .as_array()?;

    values
        .iter()
        .map(|v| v.as_f64().map(|f| f as f32))
        .collect()
}
