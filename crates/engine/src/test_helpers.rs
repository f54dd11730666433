//! Shared test doubles for the engine.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use async_trait::async_trait;
use ragline_core::error::{ProviderError, RetrievalError};
use ragline_core::provider::{ChunkReceiver, Provider, ProviderRequest, StreamChunk};
use ragline_core::retrieval::{RetrievalResult, RetrievalStats, Retriever};
use tokio::sync::{Notify, mpsc};

use crate::stream_event::{EventStream, StreamEvent};

enum Script {
    Tokens(Vec<String>),
    TokensThenFail(Vec<String>, ProviderError),
    FailToStart(ProviderError),
    Endless(String),
    Stalled(String),
}

/// A provider that replays a fixed script and records every request.
pub struct ScriptedProvider {
    script: Script,
    requests: Mutex<Vec<ProviderRequest>>,
    closed: Arc<AtomicBool>,
    closed_signal: Arc<Notify>,
}

impl ScriptedProvider {
    fn with_script(script: Script) -> Self {
        Self {
            script,
            requests: Mutex::new(Vec::new()),
            closed: Arc::new(AtomicBool::new(false)),
            closed_signal: Arc::new(Notify::new()),
        }
    }

    /// Streams each fragment, then finishes.
    pub fn tokens(fragments: &[&str]) -> Self {
        Self::with_script(Script::Tokens(owned(fragments)))
    }

    /// Streams each fragment, then yields `error` mid-stream.
    pub fn tokens_then_fail(fragments: &[&str], error: ProviderError) -> Self {
        Self::with_script(Script::TokensThenFail(owned(fragments), error))
    }

    /// Refuses to start a stream.
    pub fn failing(error: ProviderError) -> Self {
        Self::with_script(Script::FailToStart(error))
    }

    /// Streams `fragment` forever, until the receiver is dropped.
    pub fn endless(fragment: &str) -> Self {
        Self::with_script(Script::Endless(fragment.to_string()))
    }

    /// Streams `fragment`, then hangs without finishing until the receiver
    /// is dropped.
    pub fn stalled(fragment: &str) -> Self {
        Self::with_script(Script::Stalled(fragment.to_string()))
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Whether an endless or stalled stream noticed its receiver was dropped.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub async fn wait_until_closed(&self) {
        while !self.is_closed() {
            self.closed_signal.notified().await;
        }
    }
}

fn owned(fragments: &[&str]) -> Vec<String> {
    fragments.iter().map(|s| s.to_string()).collect()
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn stream(&self, request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
        self.requests.lock().unwrap().push(request);

        let (tx, rx) = mpsc::channel(1);
        match &self.script {
            Script::FailToStart(e) => return Err(e.clone()),
            Script::Tokens(fragments) => {
                let fragments = fragments.clone();
                tokio::spawn(async move {
                    for f in fragments {
                        if tx.send(Ok(StreamChunk::text(f))).await.is_err() {
                            return;
                        }
                    }
                    let _ = tx.send(Ok(StreamChunk::finished(None))).await;
                });
            }
            Script::TokensThenFail(fragments, error) => {
                let fragments = fragments.clone();
                let error = error.clone();
                tokio::spawn(async move {
                    for f in fragments {
                        if tx.send(Ok(StreamChunk::text(f))).await.is_err() {
                            return;
                        }
                    }
                    let _ = tx.send(Err(error)).await;
                });
            }
            Script::Endless(fragment) => {
                let fragment = fragment.clone();
                let closed = Arc::clone(&self.closed);
                let signal = Arc::clone(&self.closed_signal);
                tokio::spawn(async move {
                    while tx.send(Ok(StreamChunk::text(fragment.clone()))).await.is_ok() {
                        tokio::task::yield_now().await;
                    }
                    closed.store(true, Ordering::SeqCst);
                    signal.notify_one();
                });
            }
            Script::Stalled(fragment) => {
                let fragment = fragment.clone();
                let closed = Arc::clone(&self.closed);
                let signal = Arc::clone(&self.closed_signal);
                tokio::spawn(async move {
                    if tx.send(Ok(StreamChunk::text(fragment))).await.is_ok() {
                        tx.closed().await;
                    }
                    closed.store(true, Ordering::SeqCst);
                    signal.notify_one();
                });
            }
        }
        Ok(rx)
    }
}

/// A retriever returning a fixed result list.
pub struct StaticRetriever {
    results: Vec<RetrievalResult>,
    calls: AtomicUsize,
    delay: Option<Duration>,
}

impl StaticRetriever {
    pub fn new(results: Vec<RetrievalResult>) -> Self {
        Self {
            results,
            calls: AtomicUsize::new(0),
            delay: None,
        }
    }

    /// Sleep for `delay` before answering each search.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// One unlabelled result per score, in the given order.
    pub fn scored(scores: &[f64]) -> Self {
        Self::new(
            scores
                .iter()
                .enumerate()
                .map(|(i, s)| RetrievalResult::new(format!("passage {i}"), *s))
                .collect(),
        )
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Retriever for StaticRetriever {
    async fn search(&self, _query: &str) -> Result<Vec<RetrievalResult>, RetrievalError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.results.clone())
    }

    async fn stats(&self) -> Result<RetrievalStats, RetrievalError> {
        Ok(RetrievalStats {
            total_documents: 1,
            total_chunks: self.results.len(),
            chunks_with_embeddings: self.results.len(),
        })
    }
}

/// A retriever that always fails.
pub struct FailingRetriever(pub RetrievalError);

#[async_trait]
impl Retriever for FailingRetriever {
    async fn search(&self, _query: &str) -> Result<Vec<RetrievalResult>, RetrievalError> {
        Err(self.0.clone())
    }
}

/// Drain an event stream.
pub async fn collect(mut stream: EventStream) -> Vec<StreamEvent> {
    let mut events = Vec::new();
    while let Some(event) = stream.recv().await {
        events.push(event);
    }
    events
}
