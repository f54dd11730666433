//! Provider construction from configuration.
//!
//! The process builds exactly one client per model configuration and shares
//! it across queries through an `Arc`.

use std::sync::Arc;
use std::time::Duration;
use ragline_config::{AppConfig, ConfigError};
use ragline_core::provider::Provider;
use crate::openai_compat::OpenAiCompatProvider;

/// Build the shared provider from configuration.
///
/// A missing API key is a fatal configuration error, except for local
/// backends that don't authenticate.
pub fn build_from_config(config: &AppConfig) -> Result<Arc<dyn Provider>, ConfigError> {
    let name = config.provider.name.as_str();

    let api_key = if is_local(name) {
        config.api_key.clone().unwrap_or_else(|| name.to_string())
    } else {
        config.require_api_key()?.to_string()
    };

    let base_url = config
        .provider
        .base_url
        .clone()
        .unwrap_or_else(|| default_base_url(name));

    let provider = OpenAiCompatProvider::new(
        name,
        base_url,
        api_key,
        Duration::from_secs(config.provider.request_timeout_secs),
    )
    .map_err(|e| ConfigError::ValidationError(e.to_string()))?;

    tracing::info!(provider = %name, model = %config.llm.model, "Provider initialized");

    Ok(Arc::new(provider))
}

/// Local backends that accept unauthenticated requests.
pub fn is_local(provider_name: &str) -> bool {
    matches!(provider_name, "ollama" | "vllm" | "llamacpp" | "llama.cpp")
}

/// Get the default base URL for well-known providers.
pub fn default_base_url(provider_name: &str) -> String {
    match provider_name {
        "openai" => "https://api.openai.com/v1".into(),
        "openrouter" => "https://openrouter.ai/api/v1".into(),
        "ollama" => "http://localhost:11434/v1".into(),
        "deepseek" => "https://api.deepseek.com/v1".into(),
        "groq" => "https://api.groq.com/openai/v1".into(),
        "together" => "https://api.together.xyz/v1".into(),
        "vllm" => "http://localhost:8000/v1".into(),
        "llamacpp" | "llama.cpp" => "http://localhost:8080/v1".into(),
        _ => format!("https://{provider_name}.api.example.com/v1"),
    }
}
