//! Per-query entry point: retrieve, pick a strategy, stream its events.

use std::sync::Arc;
use ragline_config::AppConfig;
use ragline_core::provider::Provider;
use ragline_core::query::ChatQuery;
use ragline_core::retrieval::{RetrievalStats, Retriever};
use ragline_core::RetrievalError;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::driver::{EVENT_CHANNEL_CAPACITY, GenerationDriver, GenerationSettings};
use crate::strategy::StrategySelector;
use crate::stream_event::{EventStream, StreamEvent};

/// What the caller sees when retrieval fails. The underlying error is logged.
pub const RETRIEVAL_FAILED_MESSAGE: &str =
    "An error occurred while processing your query. Please try again.";

/// Answers chat queries. Cheap to share; holds no per-query state.
pub struct ChatOrchestrator {
    retriever: Arc<dyn Retriever>,
    selector: Arc<StrategySelector>,
}

impl ChatOrchestrator {
    pub fn new(retriever: Arc<dyn Retriever>, selector: StrategySelector) -> Self {
        Self {
            retriever,
            selector: Arc::new(selector),
        }
    }

    /// Wire the engine from configuration and the two collaborators.
    pub fn from_config(
        config: &AppConfig,
        provider: Arc<dyn Provider>,
        retriever: Arc<dyn Retriever>,
    ) -> Self {
        let driver = Arc::new(GenerationDriver::new(
            provider,
            GenerationSettings::from_config(config),
        ));
        let selector = StrategySelector::new(driver, config.retrieval.thresholds);
        Self::new(retriever, selector)
    }

    /// Answer `query`. The query is assumed valid.
    ///
    /// Retrieval runs first; its failure becomes one generic `error` event.
    /// Otherwise the chosen strategy's events are forwarded unchanged.
    /// Dropping the returned stream cancels whatever stage is running.
    pub fn handle_query(&self, query: &ChatQuery) -> EventStream {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let retriever = Arc::clone(&self.retriever);
        let selector = Arc::clone(&self.selector);
        let text = query.query.clone();
        let use_general_llm = query.use_general_llm;

        info!(
            query = %preview(&text),
            use_general_llm,
            history = query.history_len(),
            "Handling query"
        );

        tokio::spawn(async move {
            let outcome = tokio::select! {
                outcome = retriever.search(&text) => outcome,
                _ = tx.closed() => {
                    debug!("Consumer went away during retrieval");
                    return;
                }
            };

            let results = match outcome {
                Ok(results) => results,
                Err(e) => {
                    error!(error = %e, "Retrieval failed");
                    let _ = tx.send(StreamEvent::error(RETRIEVAL_FAILED_MESSAGE)).await;
                    return;
                }
            };

            if tx.is_closed() {
                debug!("Consumer went away before generation");
                return;
            }

            let strategy = selector.select(use_general_llm, &results);
            info!(strategy = strategy.name(), results = results.len(), "Strategy selected");

            // Returning drops `events`, which cancels the strategy's generation.
            let mut events = strategy.respond(&text, &results);
            loop {
                let event = tokio::select! {
                    event = events.recv() => match event {
                        Some(event) => event,
                        None => return,
                    },
                    _ = tx.closed() => {
                        debug!("Consumer went away during generation");
                        return;
                    }
                };
                if tx.send(event).await.is_err() {
                    return;
                }
            }
        });

        rx
    }

    /// Index statistics for health reporting.
    pub async fn stats(&self) -> Result<RetrievalStats, RetrievalError> {
        self.retriever.stats().await
    }
}

fn preview(text: &str) -> String {
    const LIMIT: usize = 50;
    match text.char_indices().nth(LIMIT) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
