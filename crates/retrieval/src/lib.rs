//! Knowledge-base retrieval for Ragline.
//!
//! Ingestion (chunking and embedding documents) happens elsewhere and writes
//! a JSON snapshot. This crate loads that snapshot into an immutable
//! [`VectorIndex`] and answers queries by embedding them through the
//! configured provider and ranking chunks by similarity.

pub mod index;
pub mod retriever;
pub mod similarity;

pub use index::{IndexSnapshot, IndexedChunk, VectorIndex};
pub use retriever::EmbeddingRetriever;
pub use similarity::{cosine_similarity, score};
