//! # Ragline Core
//!
//! Domain types, collaborator traits, and error definitions for the Ragline
//! knowledge-base answer engine. This crate has **no framework dependencies**:
//! it defines the model every other crate builds against.
//!
//! The two external collaborators of the engine live here as traits:
//! - [`Retriever`] finds ranked knowledge-base passages for a query
//! - [`Provider`] streams generated text for a prompt
//!
//! Implementations live in `ragline-retrieval` and `ragline-providers`, and
//! tests substitute scripted doubles.

pub mod error;
pub mod message;
pub mod provider;
pub mod query;
pub mod retrieval;

// Re-export key types at crate root for ergonomics
pub use error::{Error, ProviderError, Result, RetrievalError};
pub use message::{Message, Role};
pub use provider::{ChunkReceiver, EmbeddingRequest, EmbeddingResponse, Provider, ProviderRequest, StreamChunk, Usage};
pub use query::{ChatQuery, QueryError};
pub use retrieval::{RetrievalResult, RetrievalStats, Retriever, top_score};
