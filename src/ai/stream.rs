//! Streaming summary session.
//!
//! One session per open connection: requests a streaming completion,
//! forwards each fragment to the subscriber in arrival order while
//! accumulating the full text, and persists the accumulated summary once
//! the upstream stream ends cleanly. A previously cached summary
//! short-circuits the whole pipeline unless regeneration was requested.
//!
//! Transport is an mpsc channel. Cancellation is propagated by channel
//! closure: when the subscriber goes away our send fails and the session
//! returns, which drops the upstream fragment receiver and tears down the
//! in-flight provider request. Nothing is persisted on error or cancel.

use crate::ai::chat::{ChatApi, ChatMessage, ChatOptions};
use crate::ai::enrich::{MAX_SUMMARY_INPUT_CHARS, MIN_SUMMARY_INPUT_CHARS};
use crate::ai::prompts;
use crate::articles::ArticleStore;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Events pushed to the subscriber. Every session terminates with exactly
/// one `Done`, `Cached` or `Error`; no events follow a terminal one.
#[derive(Debug, Clone, PartialEq)]
pub enum SummaryEvent {
    /// Incremental fragment, in upstream order
    Delta(String),
    /// Cached summary served without touching the provider
    Cached(String),
    /// Stream finished; carries the full accumulated text
    Done(String),
    Error(String),
}

impl SummaryEvent {
    /// Wire shape consumed by the SSE endpoint.
    pub fn to_json(&self) -> Value {
        match self {
            SummaryEvent::Delta(content) => json!({ "content": content, "done": false }),
            SummaryEvent::Cached(content) => {
                json!({ "content": content, "done": true, "cached": true })
            }
            SummaryEvent::Done(summary) => json!({ "done": true, "summary": summary }),
            SummaryEvent::Error(message) => json!({ "error": message }),
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, SummaryEvent::Delta(_))
    }
}

/// Drive one summary session to completion.
///
/// The subscriber listens on the receiving half of `tx`. Dropping that
/// receiver cancels the session: accumulated text is discarded and the
/// upstream request is torn down.
pub async fn run_summary_session(
    chat: Arc<dyn ChatApi>,
    store: Arc<dyn ArticleStore>,
    article_id: u64,
    regenerate: bool,
    tx: mpsc::Sender<SummaryEvent>,
) {
    let article = match store.get(article_id) {
        Ok(Some(article)) => article,
        Ok(None) => {
            let _ = tx.send(SummaryEvent::Error("article not found".into())).await;
            return;
        }
        Err(err) => {
            log::error!("summary stream: failed to load article {article_id}: {err}");
            let _ = tx.send(SummaryEvent::Error("storage error".into())).await;
            return;
        }
    };

    // cost-avoidance short-circuit: serve the cache unless asked not to
    if !regenerate {
        if let Some(cached) = article.ai_summary.as_deref().filter(|s| !s.is_empty()) {
            let _ = tx.send(SummaryEvent::Cached(cached.to_string())).await;
            return;
        }
    }

    if article.content.trim().chars().count() < MIN_SUMMARY_INPUT_CHARS {
        let _ = tx
            .send(SummaryEvent::Error(
                "article content is too short to summarize".into(),
            ))
            .await;
        return;
    }

    let truncated = prompts::truncate_chars(&article.content, MAX_SUMMARY_INPUT_CHARS);
    let prompt = prompts::render(prompts::SUMMARY, &[("content", truncated)]);

    let mut fragments = match chat
        .complete_stream(
            vec![ChatMessage::user(prompt)],
            ChatOptions {
                max_tokens: 200,
                temperature: 0.5,
                ..Default::default()
            },
        )
        .await
    {
        Ok(fragments) => fragments,
        Err(err) => {
            let _ = tx.send(SummaryEvent::Error(err.to_string())).await;
            return;
        }
    };

    let mut accumulated = String::new();

    loop {
        match fragments.recv().await {
            Some(Ok(fragment)) => {
                accumulated.push_str(&fragment);
                if tx.send(SummaryEvent::Delta(fragment)).await.is_err() {
                    // subscriber disconnected: drop `fragments` to tear
                    // down the upstream request, discard the buffer
                    log::debug!("summary stream for article {article_id} cancelled");
                    return;
                }
            }
            Some(Err(err)) => {
                log::error!("summary stream for article {article_id} failed: {err}");
                let _ = tx.send(SummaryEvent::Error(err.to_string())).await;
                return;
            }
            // upstream end-of-stream
            None => break,
        }
    }

    let summary = accumulated.trim().to_string();
    if !summary.is_empty() {
        // the only cache write path in this component; last write wins
        // against a concurrent edit, summaries are advisory
        if let Err(err) = store.save_summary(article_id, &summary) {
            log::error!("failed to persist summary for article {article_id}: {err}");
        }
    }

    let _ = tx.send(SummaryEvent::Done(summary)).await;
}
