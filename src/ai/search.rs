//! Semantic search over stored article embeddings.
//!
//! Brute-force linear scan: one query embedding per search, cosine scoring
//! against every candidate that carries a stored vector. No index is
//! maintained; the corpus of a personal blog is small enough that O(n)
//! per query is the simplest correct design.

use crate::ai::embeddings::EmbeddingApi;
use crate::ai::errors::AiError;
use crate::ai::similarity::cosine_similarity;
use crate::articles::Article;
use serde::Serialize;
use std::sync::Arc;

/// An article that passed the similarity threshold, with its score.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredArticle {
    #[serde(flatten)]
    pub article: Article,
    pub similarity: f32,
}

#[derive(Clone)]
pub struct SemanticSearch {
    embedder: Arc<dyn EmbeddingApi>,
}

impl SemanticSearch {
    pub fn new(embedder: Arc<dyn EmbeddingApi>) -> Self {
        Self { embedder }
    }

    /// Score `candidates` against `query`, keeping results strictly above
    /// `threshold`, sorted by descending similarity (candidate order breaks
    /// ties).
    ///
    /// Candidates without a stored embedding, or with one that no longer
    /// deserializes, are silently skipped. An upstream failure computing the
    /// query embedding is returned to the caller, who is expected to fall
    /// back to keyword search.
    pub async fn search(
        &self,
        query: &str,
        candidates: &[Article],
        threshold: f32,
    ) -> Result<Vec<ScoredArticle>, AiError> {
        let query_embedding = self.embedder.embed(query).await?;

        let mut results: Vec<ScoredArticle> = candidates
            .iter()
            .filter_map(|article| {
                let stored = decode_embedding(article.embedding.as_deref()?)?;
                let similarity = cosine_similarity(&query_embedding, &stored);
                if similarity > threshold {
                    Some(ScoredArticle {
                        article: article.clone(),
                        similarity,
                    })
                } else {
                    None
                }
            })
            .collect();

        // stable sort keeps candidate order for equal scores
        results.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        Ok(results)
    }
}

/// Decode a persisted embedding. Malformed values are discarded, not errors:
/// a candidate with a corrupt vector simply drops out of semantic results.
fn decode_embedding(raw: &str) -> Option<Vec<f32>> {
    serde_json::from_str(raw).ok()
}

/// Serialize an embedding for persistence on an article row.
pub fn encode_embedding(vector: &[f32]) -> String {
    serde_json::to_string(vector).expect("vec of floats always serializes")
}
