//! Chat API.
//!
//! - `POST /api/chat/stream`   answer a query as a Server-Sent Events stream
//! - `POST /api/chat/test`     answer a query as one aggregated JSON object
//! - `GET  /api/chat/health`   service status and index statistics

use std::convert::Infallible;
use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::sse::{Event as SseEvent, KeepAlive, Sse},
    response::Json,
    routing::{get, post},
};
use ragline_core::ChatQuery;
use ragline_core::RetrievalStats;
use ragline_engine::{AggregatedResponse, SequenceValidator, aggregate};
use serde::Serialize;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};

use crate::SharedState;

pub fn chat_router(state: SharedState) -> Router {
    Router::new()
        .route("/stream", post(chat_stream_handler))
        .route("/test", post(chat_test_handler))
        .route("/health", get(chat_health_handler))
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

type Rejection = (StatusCode, Json<ErrorResponse>);

fn validated(query: ChatQuery) -> Result<ChatQuery, Rejection> {
    query.validate().map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: e.to_string(),
            }),
        )
    })?;
    Ok(query)
}

async fn chat_stream_handler(
    State(state): State<SharedState>,
    Json(payload): Json<ChatQuery>,
) -> Result<Sse<impl futures::Stream<Item = Result<SseEvent, Infallible>>>, Rejection> {
    let query = validated(payload)?;
    info!(use_general_llm = query.use_general_llm, "chat/stream SSE request");

    let rx = state.orchestrator.handle_query(&query);

    let mut validator = SequenceValidator::new();
    let stream = ReceiverStream::new(rx).map(move |event| {
        if cfg!(debug_assertions) {
            if let Err(e) = validator.push(&event) {
                warn!(error = %e, "Event stream broke protocol ordering");
            }
        }
        Ok(SseEvent::default()
            .event(event.event_type())
            .data(sse_data(event.payload())))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// SSE clients treat `\r`, `\n` and `\r\n` alike as line ends, so fold
/// them to `\n` before the payload is split into `data:` lines.
fn sse_data(payload: String) -> String {
    if payload.contains('\r') {
        payload.replace("\r\n", "\n").replace('\r', "\n")
    } else {
        payload
    }
}

async fn chat_test_handler(
    State(state): State<SharedState>,
    Json(payload): Json<ChatQuery>,
) -> Result<Json<AggregatedResponse>, Rejection> {
    let query = validated(payload)?;
    info!(use_general_llm = query.use_general_llm, "chat/test request");

    let response = aggregate(state.orchestrator.handle_query(&query)).await;
    Ok(Json(response))
}

#[derive(Debug, Serialize)]
struct ChatHealthResponse {
    status: &'static str,
    timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    stats: Option<RetrievalStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

async fn chat_health_handler(
    State(state): State<SharedState>,
) -> (StatusCode, Json<ChatHealthResponse>) {
    let timestamp = chrono::Utc::now().to_rfc3339();

    match state.orchestrator.stats().await {
        Ok(stats) => (
            StatusCode::OK,
            Json(ChatHealthResponse {
                status: "ok",
                timestamp,
                stats: Some(stats),
                error: None,
            }),
        ),
        Err(e) => {
            warn!(error = %e, "Index statistics unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ChatHealthResponse {
                    status: "degraded",
                    timestamp,
                    stats: None,
                    error: Some(e.to_string()),
                }),
            )
        }
    }
}
