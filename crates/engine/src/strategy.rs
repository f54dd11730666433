//! Response strategies and the selector that picks between them.
//!
//! `StrictKbStrategy` answers only from the knowledge base and refuses when
//! retrieval is weak. `HybridStrategy` routes on the top retrieval score
//! between a knowledge-base answer, a blended answer and a general-knowledge
//! answer.

use std::sync::Arc;
use ragline_config::ConfidenceThresholds;
use ragline_core::retrieval::{RetrievalResult, top_score};
use tokio::sync::mpsc;
use tracing::debug;

use crate::context::{self, HYBRID_MAX_CHUNKS, STRICT_MAX_CHUNKS};
use crate::driver::{GenerationDriver, GenerationRequest};
use crate::prompts::{self, AUGMENTED_TEMPLATE, GENERAL_TEMPLATE, REFUSAL_PHRASE, STRICT_TEMPLATE};
use crate::stream_event::{Citation, CitationSource, EventStream, StreamEvent};

/// Citation note attached to a refusal.
pub const NO_CONTEXT_NOTE: &str = "no relevant context found";

/// A way of answering a query from its retrieval results.
pub trait ResponseStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Produce the event stream for `query`. `results` are best first.
    fn respond(&self, query: &str, results: &[RetrievalResult]) -> EventStream;
}

/// Knowledge-base-only answering.
pub struct StrictKbStrategy {
    driver: Arc<GenerationDriver>,
    threshold: f64,
}

impl StrictKbStrategy {
    pub fn new(driver: Arc<GenerationDriver>, threshold: f64) -> Self {
        Self { driver, threshold }
    }
}

impl ResponseStrategy for StrictKbStrategy {
    fn name(&self) -> &'static str {
        "strict_kb"
    }

    fn respond(&self, query: &str, results: &[RetrievalResult]) -> EventStream {
        let top = results.first().map(|r| r.score.unwrap_or(0.0));

        match top {
            Some(top) if top >= self.threshold => {
                debug!(top, threshold = self.threshold, "Strict: answering from knowledge base");
                let context = context::build(results, STRICT_MAX_CHUNKS);
                self.driver.stream(GenerationRequest {
                    prompt: prompts::render(STRICT_TEMPLATE, &context, query),
                    citation_source: CitationSource::InternalDocs,
                    confidence: Some(top),
                    temperature_override: Some(0.0),
                })
            }
            _ => {
                debug!(?top, threshold = self.threshold, "Strict: refusing");
                refusal()
            }
        }
    }
}

/// The fixed refusal sequence. No generation takes place.
fn refusal() -> EventStream {
    let (tx, rx) = mpsc::channel(3);
    let events = [
        StreamEvent::token(REFUSAL_PHRASE),
        StreamEvent::Citation(
            Citation::new(CitationSource::InternalDocs, Some(0.0)).with_notes(NO_CONTEXT_NOTE),
        ),
        StreamEvent::end(),
    ];
    for event in events {
        // Capacity covers all three, so this never waits.
        let _ = tx.try_send(event);
    }
    rx
}

/// Which path a hybrid query takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HybridRoute {
    /// Confident retrieval: answer like the strict strategy.
    KnowledgeBase,
    /// Partial match: blend context with general knowledge.
    Augmented,
    /// Weak or no match: general knowledge.
    General,
}

impl HybridRoute {
    /// Route on the top score. Boundaries go to the stricter path.
    pub fn for_score(top: f64, thresholds: &ConfidenceThresholds) -> Self {
        if top >= thresholds.high {
            Self::KnowledgeBase
        } else if top >= thresholds.low {
            Self::Augmented
        } else {
            Self::General
        }
    }
}

/// Knowledge base when confident, general knowledge otherwise.
pub struct HybridStrategy {
    driver: Arc<GenerationDriver>,
    thresholds: ConfidenceThresholds,
}

impl HybridStrategy {
    pub fn new(driver: Arc<GenerationDriver>, thresholds: ConfidenceThresholds) -> Self {
        Self { driver, thresholds }
    }
}

impl ResponseStrategy for HybridStrategy {
    fn name(&self) -> &'static str {
        "hybrid"
    }

    fn respond(&self, query: &str, results: &[RetrievalResult]) -> EventStream {
        let top = top_score(results);
        let route = HybridRoute::for_score(top.unwrap_or(0.0), &self.thresholds);
        debug!(
            ?top,
            high = self.thresholds.high,
            low = self.thresholds.low,
            ?route,
            "Hybrid: routed"
        );

        let context = context::build(results, HYBRID_MAX_CHUNKS);
        let request = match route {
            HybridRoute::KnowledgeBase => GenerationRequest {
                prompt: prompts::render(STRICT_TEMPLATE, &context, query),
                citation_source: CitationSource::InternalDocs,
                confidence: top,
                temperature_override: None,
            },
            HybridRoute::Augmented => GenerationRequest {
                prompt: prompts::render(AUGMENTED_TEMPLATE, &context, query),
                citation_source: CitationSource::Hybrid,
                confidence: top,
                temperature_override: None,
            },
            HybridRoute::General => GenerationRequest {
                prompt: prompts::render(GENERAL_TEMPLATE, &context, query),
                citation_source: CitationSource::GeneralLlm,
                confidence: Some(top.unwrap_or(0.0)),
                temperature_override: None,
            },
        };

        self.driver.stream(request)
    }
}

/// Picks the strategy for a query's mode.
pub struct StrategySelector {
    strict: StrictKbStrategy,
    hybrid: HybridStrategy,
}

impl StrategySelector {
    pub fn new(driver: Arc<GenerationDriver>, thresholds: ConfidenceThresholds) -> Self {
        Self {
            strict: StrictKbStrategy::new(Arc::clone(&driver), thresholds.strict_kb),
            hybrid: HybridStrategy::new(driver, thresholds),
        }
    }

    /// `false` selects strict knowledge-base answering, `true` hybrid.
    /// Results don't influence the choice; any list, including an empty
    /// one, is valid.
    pub fn select(&self, use_general_llm: bool, _results: &[RetrievalResult]) -> &dyn ResponseStrategy {
        if use_general_llm {
            &self.hybrid
        } else {
            &self.strict
        }
    }
}
