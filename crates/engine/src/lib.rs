//! The Ragline answer engine.
//!
//! A query flows through four stages:
//!
//! 1. **Retrieve** ranked passages through the [`Retriever`](ragline_core::Retriever)
//! 2. **Select** a strategy from the query's mode
//! 3. **Prompt**: the strategy renders context and picks a template
//! 4. **Generate**: the driver streams tokens, then a citation and `end`
//!
//! Every stage runs on its own task and hands events downstream over a
//! bounded channel. Dropping the final [`EventStream`] unwinds the chain.

pub mod context;
pub mod driver;
pub mod orchestrator;
pub mod prompts;
pub mod strategy;
pub mod stream_event;

#[cfg(test)]
mod test_helpers;

pub use driver::{GenerationDriver, GenerationRequest, GenerationSettings};
pub use orchestrator::{ChatOrchestrator, RETRIEVAL_FAILED_MESSAGE};
pub use prompts::REFUSAL_PHRASE;
pub use strategy::{HybridRoute, HybridStrategy, ResponseStrategy, StrategySelector, StrictKbStrategy};
pub use stream_event::{
    AggregatedResponse, Citation, CitationSource, EventStream, ProtocolError, SequenceValidator,
    StreamEvent, WireEvent, aggregate,
};
