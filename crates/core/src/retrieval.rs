//! Retriever trait: the abstraction over knowledge-base search.
//!
//! A Retriever turns a query string into passages ranked by relevance.
//! Results are ordered by descending score **by contract**: the engine reads
//! `results[0]` as the top score and truncates from the front, and never
//! re-sorts.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::error::RetrievalError;

/// A single retrieved passage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievalResult {
    /// The raw passage text
    pub content: String,

    /// Similarity score in [0, 1], higher = more relevant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,

    /// Identifier of the stored chunk
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_id: Option<String>,

    /// Arbitrary metadata carried from ingestion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
}

impl RetrievalResult {
    /// A scored passage without an identifier.
    pub fn new(content: impl Into<String>, score: f64) -> Self {
        Self {
            content: content.into(),
            score: Some(score),
            chunk_id: None,
            metadata: None,
        }
    }

    /// Attach a chunk identifier.
    pub fn with_chunk_id(mut self, id: impl Into<String>) -> Self {
        self.chunk_id = Some(id.into());
        self
    }
}

/// The score of the first (best) result, if there is one and it is scored.
pub fn top_score(results: &[RetrievalResult]) -> Option<f64> {
    results.first().and_then(|r| r.score)
}

/// Index statistics reported by a retriever.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievalStats {
    pub total_documents: usize,
    pub total_chunks: usize,
    pub chunks_with_embeddings: usize,
}

/// The Retriever collaborator.
///
/// Instances are shared across concurrent queries.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Search the knowledge base. May return an empty list.
    async fn search(&self, query: &str) -> Result<Vec<RetrievalResult>, RetrievalError>;

    /// Report what the index holds.
    async fn stats(&self) -> Result<RetrievalStats, RetrievalError> {
        Ok(RetrievalStats::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn top_score_of_empty_is_none() {
        assert_eq!(top_score(&[]), None);
    }

    #[test]
    fn top_score_reads_first_result_only() {
        let results = vec![RetrievalResult::new("a", 0.42), RetrievalResult::new("b", 0.99)];
        assert_eq!(top_score(&results), Some(0.42));
    }

    #[test]
    fn unscored_first_result_has_no_top_score() {
        let results = vec![RetrievalResult {
            content: "x".into(),
            score: None,
            chunk_id: None,
            metadata: None,
        }];
        assert_eq!(top_score(&results), None);
    }

    #[test]
    fn retrieval_result_uses_camel_case() {
        let json = serde_json::to_string(&RetrievalResult::new("c", 0.5).with_chunk_id("abc")).unwrap();
        assert!(json.contains(r#""chunkId":"abc""#));
        assert!(!json.contains("metadata"));
    }
}
