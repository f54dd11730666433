//! In-memory vector index loaded from a JSON snapshot.

use std::collections::HashSet;
use std::path::Path;
use ragline_config::SimilarityMetric;
use ragline_core::{RetrievalError, RetrievalResult, RetrievalStats};
use serde::{Deserialize, Serialize};

use crate::similarity;

/// One stored chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexedChunk {
    pub id: String,
    pub document_id: String,
    #[serde(default)]
    pub chunk_index: usize,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// The on-disk snapshot format.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexSnapshot {
    #[serde(default)]
    pub chunks: Vec<IndexedChunk>,
}

/// An immutable set of embedded chunks.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    chunks: Vec<IndexedChunk>,
    dimensions: usize,
    metric: SimilarityMetric,
}

impl VectorIndex {
    /// Build an index, rejecting chunks whose embedding has the wrong size.
    pub fn new(
        chunks: Vec<IndexedChunk>,
        dimensions: usize,
        metric: SimilarityMetric,
    ) -> Result<Self, RetrievalError> {
        for chunk in &chunks {
            if let Some(embedding) = &chunk.embedding {
                if embedding.len() != dimensions {
                    return Err(RetrievalError::DimensionMismatch {
                        expected: dimensions,
                        actual: embedding.len(),
                    });
                }
            }
        }

        Ok(Self {
            chunks,
            dimensions,
            metric,
        })
    }

    /// Load a snapshot file.
    pub fn load(
        path: &Path,
        dimensions: usize,
        metric: SimilarityMetric,
    ) -> Result<Self, RetrievalError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            RetrievalError::IndexUnavailable(format!("{}: {e}", path.display()))
        })?;

        let snapshot: IndexSnapshot = serde_json::from_str(&content).map_err(|e| {
            RetrievalError::IndexUnavailable(format!("{}: {e}", path.display()))
        })?;

        let index = Self::new(snapshot.chunks, dimensions, metric)?;
        tracing::info!(
            path = %path.display(),
            chunks = index.len(),
            "Vector index loaded"
        );
        Ok(index)
    }

    /// Like [`load`](Self::load), but a missing file yields an empty index.
    pub fn load_or_empty(
        path: &Path,
        dimensions: usize,
        metric: SimilarityMetric,
    ) -> Result<Self, RetrievalError> {
        if !path.exists() {
            tracing::warn!(path = %path.display(), "No index snapshot found, starting empty");
            return Self::new(Vec::new(), dimensions, metric);
        }
        Self::load(path, dimensions, metric)
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Rank chunks against `query_embedding`, best first, at most `limit`.
    pub fn search(
        &self,
        query_embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<RetrievalResult>, RetrievalError> {
        if query_embedding.len() != self.dimensions {
            return Err(RetrievalError::DimensionMismatch {
                expected: self.dimensions,
                actual: query_embedding.len(),
            });
        }

        let mut scored: Vec<(f64, &IndexedChunk)> = self
            .chunks
            .iter()
            .filter_map(|chunk| {
                let emb = chunk.embedding.as_ref()?;
                Some((similarity::score(self.metric, emb, query_embedding), chunk))
            })
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);

        Ok(scored
            .into_iter()
            .map(|(score, chunk)| {
                let mut metadata = chunk.metadata.clone();
                metadata.insert("documentId".into(), chunk.document_id.clone().into());
                metadata.insert("chunkIndex".into(), chunk.chunk_index.into());
                RetrievalResult {
                    content: chunk.content.clone(),
                    score: Some(score),
                    chunk_id: Some(chunk.id.clone()),
                    metadata: Some(metadata),
                }
            })
            .collect())
    }

    pub fn stats(&self) -> RetrievalStats {
        let documents: HashSet<&str> = self.chunks.iter().map(|c| c.document_id.as_str()).collect();
        RetrievalStats {
            total_documents: documents.len(),
            total_chunks: self.chunks.len(),
            chunks_with_embeddings: self.chunks.iter().filter(|c| c.embedding.is_some()).count(),
        }
    }
}
