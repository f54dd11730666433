//! Generation driver: turns a prompt into a token event stream.
//!
//! The driver owns one shared provider client and one shared set of default
//! generation settings. A request that overrides the temperature gets its
//! own settings value for that call only; the shared default is never
//! touched, so concurrent queries can't observe each other's overrides.

use std::sync::Arc;
use ragline_config::AppConfig;
use ragline_core::message::Message;
use ragline_core::provider::{Provider, ProviderRequest};
use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::stream_event::{Citation, CitationSource, EventStream, StreamEvent};

/// Capacity of each query's event channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Model parameters for one generation.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl GenerationSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            model: config.llm.model.clone(),
            temperature: config.llm.temperature,
            max_tokens: config.llm.max_tokens,
        }
    }

    fn with_temperature(&self, temperature: f32) -> Self {
        Self {
            temperature,
            ..self.clone()
        }
    }
}

/// Everything the driver needs for one answer.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub prompt: String,
    pub citation_source: CitationSource,
    pub confidence: Option<f64>,
    pub temperature_override: Option<f32>,
}

/// Streams a single generation into protocol events.
pub struct GenerationDriver {
    provider: Arc<dyn Provider>,
    defaults: Arc<GenerationSettings>,
}

impl GenerationDriver {
    pub fn new(provider: Arc<dyn Provider>, defaults: GenerationSettings) -> Self {
        Self {
            provider,
            defaults: Arc::new(defaults),
        }
    }

    /// The shared default settings.
    pub fn defaults(&self) -> &GenerationSettings {
        &self.defaults
    }

    /// Settings for one request: the shared default, or a one-shot copy
    /// carrying the override.
    pub fn settings_for(&self, request: &GenerationRequest) -> Arc<GenerationSettings> {
        match request.temperature_override {
            Some(t) => Arc::new(self.defaults.with_temperature(t)),
            None => Arc::clone(&self.defaults),
        }
    }

    /// Start generating. Events arrive on the returned stream.
    ///
    /// Tokens are forwarded as they arrive. A finished generation ends with
    /// a citation and `end`; a failed one ends with a single `error`
    /// carrying the provider's message. Dropping the stream stops the
    /// generation and releases the provider stream.
    pub fn stream(&self, request: GenerationRequest) -> EventStream {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let provider = Arc::clone(&self.provider);
        let settings = self.settings_for(&request);

        tokio::spawn(async move {
            debug!(
                model = %settings.model,
                temperature = settings.temperature,
                source = %request.citation_source,
                "Generation started"
            );

            let provider_request = ProviderRequest {
                model: settings.model.clone(),
                messages: vec![Message::user(request.prompt)],
                temperature: settings.temperature,
                max_tokens: Some(settings.max_tokens),
                stop: vec![],
            };

            let started = tokio::select! {
                started = provider.stream(provider_request) => started,
                _ = tx.closed() => {
                    debug!("Consumer went away before generation started");
                    return;
                }
            };

            let mut chunks = match started {
                Ok(rx) => rx,
                Err(e) => {
                    error!(error = %e, "Generation failed to start");
                    let _ = tx.send(StreamEvent::error(e.to_string())).await;
                    return;
                }
            };

            let mut tokens = 0usize;
            loop {
                let item = tokio::select! {
                    item = chunks.recv() => match item {
                        Some(item) => item,
                        None => break,
                    },
                    _ = tx.closed() => {
                        debug!(tokens, "Consumer went away, generation cancelled");
                        return;
                    }
                };

                let chunk = match item {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        error!(error = %e, tokens, "Generation failed mid-stream");
                        let _ = tx.send(StreamEvent::error(e.to_string())).await;
                        return;
                    }
                };

                if let Some(text) = chunk.content.filter(|t| !t.is_empty()) {
                    tokens += 1;
                    if tx.send(StreamEvent::Token(text)).await.is_err() {
                        debug!(tokens, "Consumer went away, generation cancelled");
                        return;
                    }
                }

                if chunk.done {
                    break;
                }
            }

            let citation = Citation::new(request.citation_source, request.confidence);
            if tx.send(StreamEvent::Citation(citation)).await.is_ok() {
                let _ = tx.send(StreamEvent::end()).await;
            }
            debug!(tokens, "Generation finished");
        });

        rx
    }
}
