//! HTTP gateway for Ragline.
//!
//! Exposes the chat API under `/api/chat` and a liveness probe at
//! `/health`. Built on Axum.

pub mod chat;

use std::sync::Arc;
use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, Method, header};
use axum::{Router, response::Json, routing::get};
use ragline_config::{AppConfig, GatewayConfig};
use ragline_engine::ChatOrchestrator;
use ragline_retrieval::EmbeddingRetriever;
use serde::Serialize;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{info, warn};

/// Maximum accepted request body.
const BODY_LIMIT_BYTES: usize = 1024 * 1024;

/// Shared application state for the gateway.
pub struct GatewayState {
    pub orchestrator: Arc<ChatOrchestrator>,
}

pub type SharedState = Arc<GatewayState>;

/// Build the full router.
///
/// Layers applied:
/// - CORS restricted to the configured origin
/// - Request body size limit (1 MB)
/// - HTTP trace logging
pub fn build_router(state: SharedState, config: &GatewayConfig) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .nest("/api/chat", chat::chat_router(state))
        .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES))
        .layer(cors_layer(&config.cors_origin))
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

fn cors_layer(origin: &str) -> CorsLayer {
    let allow_origin = if origin == "*" {
        AllowOrigin::any()
    } else {
        match origin.parse::<HeaderValue>() {
            Ok(value) => AllowOrigin::exact(value),
            Err(_) => {
                warn!(origin = %origin, "Invalid CORS origin, cross-origin requests will be refused");
                AllowOrigin::list(Vec::<HeaderValue>::new())
            }
        }
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE])
        .max_age(std::time::Duration::from_secs(3600))
}

/// Start the gateway HTTP server.
///
/// The provider client and the index are built once and shared by every
/// request. A missing API key stops startup here rather than failing
/// per request.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    let provider = ragline_providers::build_from_config(&config)?;
    let retriever = EmbeddingRetriever::from_config(&config, Arc::clone(&provider))?;
    let orchestrator = ChatOrchestrator::from_config(&config, provider, Arc::new(retriever));

    let state = Arc::new(GatewayState {
        orchestrator: Arc::new(orchestrator),
    });
    let app = build_router(state, &config.gateway);

    info!(addr = %addr, model = %config.llm.model, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
