//! Embedding-backed retriever.

use std::sync::Arc;
use async_trait::async_trait;
use ragline_config::AppConfig;
use ragline_core::provider::{EmbeddingRequest, Provider};
use ragline_core::{RetrievalError, RetrievalResult, RetrievalStats, Retriever};
use tracing::debug;

use crate::index::VectorIndex;

/// Embeds the query with the provider, then ranks the index.
pub struct EmbeddingRetriever {
    provider: Arc<dyn Provider>,
    embedding_model: String,
    index: Arc<VectorIndex>,
    top_k: usize,
}

impl EmbeddingRetriever {
    pub fn new(
        provider: Arc<dyn Provider>,
        embedding_model: impl Into<String>,
        index: Arc<VectorIndex>,
        top_k: usize,
    ) -> Self {
        Self {
            provider,
            embedding_model: embedding_model.into(),
            index,
            top_k,
        }
    }

    /// Load the index named in the config and wire it to `provider`.
    /// A missing snapshot gives an empty index.
    pub fn from_config(
        config: &AppConfig,
        provider: Arc<dyn Provider>,
    ) -> Result<Self, RetrievalError> {
        let index = VectorIndex::load_or_empty(
            &config.retrieval.index_path,
            config.vector.dimensions,
            config.vector.similarity_metric,
        )?;

        Ok(Self::new(
            provider,
            config.llm.embedding_model.clone(),
            Arc::new(index),
            config.retrieval.top_k,
        ))
    }

    async fn embed_query(&self, query: &str) -> Result<Vec<f32>, RetrievalError> {
        let response = self
            .provider
            .embed(EmbeddingRequest {
                model: self.embedding_model.clone(),
                inputs: vec![query.to_string()],
            })
            .await
            .map_err(|e| RetrievalError::EmbeddingFailed(e.to_string()))?;

        response
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| RetrievalError::EmbeddingFailed("provider returned no embedding".into()))
    }
}

#[async_trait]
impl Retriever for EmbeddingRetriever {
    async fn search(&self, query: &str) -> Result<Vec<RetrievalResult>, RetrievalError> {
        let embedding = self.embed_query(query).await?;
        let results = self.index.search(&embedding, self.top_k)?;

        debug!(
            results = results.len(),
            top_score = results.first().and_then(|r| r.score).unwrap_or(0.0),
            "Vector search complete"
        );

        Ok(results)
    }

    async fn stats(&self) -> Result<RetrievalStats, RetrievalError> {
        Ok(self.index.stats())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::IndexedChunk;
    use ragline_config::SimilarityMetric;
    use ragline_core::ProviderError;
    use ragline_core::provider::{ChunkReceiver, EmbeddingResponse, ProviderRequest};

    /// Returns a fixed embedding for every input, or fails.
    struct FixedEmbedder {
        embedding: Option<Vec<f32>>,
    }

    #[async_trait]
    impl Provider for FixedEmbedder {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn stream(&self, _request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
            Err(ProviderError::NotConfigured("embedding only".into()))
        }

        async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse, ProviderError> {
            match &self.embedding {
                Some(e) => Ok(EmbeddingResponse {
                    embeddings: request.inputs.iter().map(|_| e.clone()).collect(),
                    model: request.model,
                    usage: None,
                }),
                None => Err(ProviderError::Network("connection refused".into())),
            }
        }
    }

    fn index() -> Arc<VectorIndex> {
        let chunk = |id: &str, e: Vec<f32>| IndexedChunk {
            id: id.into(),
            document_id: "doc".into(),
            chunk_index: 0,
            content: id.to_uppercase(),
            embedding: Some(e),
            metadata: serde_json::Map::new(),
        };
        Arc::new(
            VectorIndex::new(
                vec![chunk("pricing", vec![1.0, 0.0]), chunk("support", vec![0.0, 1.0])],
                2,
                SimilarityMetric::Cosine,
            )
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn search_returns_ranked_results() {
        let retriever = EmbeddingRetriever::new(
            Arc::new(FixedEmbedder {
                embedding: Some(vec![0.9, 0.1]),
            }),
            "text-embedding-3-small",
            index(),
            5,
        );

        let results = retriever.search("how much is pro?").await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].content, "PRICING");
        assert!(results[0].score > results[1].score);
    }

    #[tokio::test]
    async fn embedding_failure_is_retrieval_error() {
        let retriever =
            EmbeddingRetriever::new(Arc::new(FixedEmbedder { embedding: None }), "m", index(), 5);

        let err = retriever.search("anything").await.unwrap_err();
        assert!(matches!(err, RetrievalError::EmbeddingFailed(ref m) if m.contains("connection refused")));
    }

    #[tokio::test]
    async fn stats_come_from_index() {
        let retriever = EmbeddingRetriever::new(
            Arc::new(FixedEmbedder { embedding: None }),
            "m",
            index(),
            5,
        );
        let stats = retriever.stats().await.unwrap();
        assert_eq!(stats.total_chunks, 2);
        assert_eq!(stats.total_documents, 1);
    }
}
