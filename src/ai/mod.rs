//! AI enrichment and semantic search for articles.
//!
//! Remote providers only: completions and embeddings are fetched from
//! OpenAI-compatible HTTP endpoints configured in [`crate::config`].
//!
//! # Architecture
//!
//! - `chat`: buffered + streaming completion client
//! - `embeddings`: text-to-vector client
//! - `similarity`: pure cosine similarity
//! - `prompts`: templates and placeholder substitution
//! - `enrich`: summary / tags / proofreading operations
//! - `search`: threshold-filtered linear-scan semantic search
//! - `stream`: per-connection streaming summary session

pub mod chat;
pub mod embeddings;
pub mod enrich;
mod errors;
pub mod prompts;
pub mod search;
pub mod similarity;
pub mod stream;

pub use chat::{ChatApi, ChatMessage, ChatOptions, HttpChatClient};
pub use embeddings::{EmbeddingApi, HttpEmbeddingClient};
pub use enrich::EnrichmentService;
pub use errors::AiError;
pub use search::{encode_embedding, ScoredArticle, SemanticSearch};
pub use similarity::cosine_similarity;
pub use stream::{run_summary_session, SummaryEvent};
