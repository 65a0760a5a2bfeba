//! Content enrichment: summary generation, tag extraction, proofreading.
//!
//! Each operation validates and truncates its input, renders the matching
//! prompt template and dispatches one buffered completion. Post-processing
//! is minimal and deterministic; anything structural (e.g. proofreading
//! preserving markdown) is a prompt-level contract.

use crate::ai::chat::{ChatApi, ChatMessage, ChatOptions};
use crate::ai::errors::AiError;
use crate::ai::prompts;
use std::sync::Arc;

/// Minimum trimmed content length for summary generation.
pub const MIN_SUMMARY_INPUT_CHARS: usize = 50;
/// Content is truncated to this many characters before summarization.
pub const MAX_SUMMARY_INPUT_CHARS: usize = 3000;

/// Minimum trimmed content length for tag extraction.
const MIN_TAGS_INPUT_CHARS: usize = 20;
const MAX_TAGS_INPUT_CHARS: usize = 2000;

/// Content shorter than this is returned untouched by proofreading.
const MIN_PROOFREAD_INPUT_CHARS: usize = 10;
const MAX_PROOFREAD_OUTPUT_TOKENS: u32 = 4000;

#[derive(Clone)]
pub struct EnrichmentService {
    chat: Arc<dyn ChatApi>,
}

impl EnrichmentService {
    pub fn new(chat: Arc<dyn ChatApi>) -> Self {
        Self { chat }
    }

    /// Generate a short summary of `content`.
    ///
    /// Fails with a validation error for content under
    /// [`MIN_SUMMARY_INPUT_CHARS`] trimmed characters.
    pub async fn summarize(&self, content: &str) -> Result<String, AiError> {
        if content.trim().chars().count() < MIN_SUMMARY_INPUT_CHARS {
            return Err(AiError::validation(
                "content is too short to summarize (minimum 50 characters)",
            ));
        }

        let truncated = prompts::truncate_chars(content, MAX_SUMMARY_INPUT_CHARS);
        let prompt = prompts::render(prompts::SUMMARY, &[("content", truncated)]);

        let response = self
            .chat
            .complete(
                vec![ChatMessage::user(prompt)],
                ChatOptions {
                    max_tokens: 200,
                    temperature: 0.5,
                    ..Default::default()
                },
            )
            .await?;

        Ok(response.trim().to_string())
    }

    /// Extract a comma-separated tag string from an article.
    ///
    /// Output is normalized: full-width commas become plain commas and all
    /// whitespace is stripped. Tag order is whatever the model returned;
    /// no deduplication.
    pub async fn extract_tags(
        &self,
        title: Option<&str>,
        content: &str,
    ) -> Result<String, AiError> {
        if content.trim().chars().count() < MIN_TAGS_INPUT_CHARS {
            return Err(AiError::validation(
                "content is too short to extract tags (minimum 20 characters)",
            ));
        }

        let truncated = prompts::truncate_chars(content, MAX_TAGS_INPUT_CHARS);
        let title = match title {
            Some(t) if !t.trim().is_empty() => t,
            _ => "untitled",
        };
        let prompt = prompts::render(prompts::TAGS, &[("title", title), ("content", truncated)]);

        let response = self
            .chat
            .complete(
                vec![ChatMessage::user(prompt)],
                ChatOptions {
                    max_tokens: 100,
                    temperature: 0.3,
                    ..Default::default()
                },
            )
            .await?;

        Ok(normalize_tags(&response))
    }

    /// Fix spelling and grammar, leaving structure alone.
    ///
    /// Content under [`MIN_PROOFREAD_INPUT_CHARS`] trimmed characters is
    /// returned unchanged without a provider call.
    pub async fn proofread(&self, content: &str) -> Result<String, AiError> {
        if content.trim().chars().count() < MIN_PROOFREAD_INPUT_CHARS {
            return Ok(content.to_string());
        }

        let max_tokens =
            (content.chars().count() as u64 * 2).min(MAX_PROOFREAD_OUTPUT_TOKENS as u64) as u32;
        let prompt = prompts::render(prompts::PROOFREAD, &[("content", content)]);

        let response = self
            .chat
            .complete(
                vec![ChatMessage::user(prompt)],
                ChatOptions {
                    max_tokens,
                    temperature: 0.3,
                    ..Default::default()
                },
            )
            .await?;

        Ok(response.trim().to_string())
    }
}

/// Normalize a model-produced tag string: full-width commas to plain commas,
/// then drop every whitespace character. Empty segments are preserved.
fn normalize_tags(raw: &str) -> String {
    raw.trim()
        .replace('，', ",")
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect()
}
