//! Configuration loading, validation, and management for Ragline.
//!
//! Loads configuration from `~/.ragline/config.toml` (or the path in
//! `RAGLINE_CONFIG`) with environment variable overrides. Validates all
//! settings at startup. The resulting [`AppConfig`] is immutable for the
//! lifetime of the process and is shared by reference.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.ragline/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the LLM provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Which OpenAI-compatible endpoint to talk to
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Generation defaults
    #[serde(default)]
    pub llm: LlmConfig,

    /// Retrieval and strategy thresholds
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Vector index settings
    #[serde(default)]
    pub vector: VectorConfig,

    /// HTTP gateway settings
    #[serde(default)]
    pub gateway: GatewayConfig,
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("provider", &self.provider)
            .field("llm", &self.llm)
            .field("retrieval", &self.retrieval)
            .field("vector", &self.vector)
            .field("gateway", &self.gateway)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Provider name ("openai", "openrouter", "ollama", ...)
    #[serde(default = "default_provider")]
    pub name: String,

    /// Override the provider's base URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// HTTP timeout for provider calls, in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_provider() -> String {
    "openai".into()
}
fn default_request_timeout() -> u64 {
    120
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            name: default_provider(),
            base_url: None,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Chat model identifier
    #[serde(default = "default_model")]
    pub model: String,

    /// Embedding model identifier
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Default sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Default max tokens per response
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    500
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            embedding_model: default_embedding_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// How many passages the retriever returns
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Path to the JSON index snapshot
    #[serde(default = "default_index_path")]
    pub index_path: PathBuf,

    /// Strategy routing thresholds
    #[serde(default)]
    pub thresholds: ConfidenceThresholds,
}

fn default_top_k() -> usize {
    5
}
fn default_index_path() -> PathBuf {
    AppConfig::config_dir().join("index.json")
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            index_path: default_index_path(),
            thresholds: ConfidenceThresholds::default(),
        }
    }
}

/// Score cutoffs that pick a strategy path. All in [0, 1], `low <= high`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceThresholds {
    /// Below this top score the strict strategy refuses without calling the LLM
    #[serde(default = "default_strict_kb")]
    pub strict_kb: f64,

    /// At or above this the hybrid strategy answers from the knowledge base only
    #[serde(default = "default_high")]
    pub high: f64,

    /// Below this the hybrid strategy answers from general knowledge
    #[serde(default = "default_low")]
    pub low: f64,
}

fn default_strict_kb() -> f64 {
    0.45
}
fn default_high() -> f64 {
    0.7
}
fn default_low() -> f64 {
    0.4
}

impl Default for ConfidenceThresholds {
    fn default() -> Self {
        Self {
            strict_kb: default_strict_kb(),
            high: default_high(),
            low: default_low(),
        }
    }
}

impl ConfidenceThresholds {
    /// Check ranges and ordering.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("strict_kb", self.strict_kb),
            ("high", self.high),
            ("low", self.low),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::ValidationError(format!(
                    "retrieval.thresholds.{name} must be between 0.0 and 1.0 (got {value})"
                )));
            }
        }

        if self.low > self.high {
            return Err(ConfigError::ValidationError(format!(
                "retrieval.thresholds.low ({}) must not exceed retrieval.thresholds.high ({})",
                self.low, self.high
            )));
        }

        Ok(())
    }
}

/// Supported vector similarity metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityMetric {
    Cosine,
    Dot,
    Euclidean,
}

impl std::str::FromStr for SimilarityMetric {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cosine" => Ok(Self::Cosine),
            "dot" | "inner_product" => Ok(Self::Dot),
            "euclidean" | "l2" => Ok(Self::Euclidean),
            other => Err(ConfigError::ValidationError(format!(
                "unknown similarity metric '{other}' (expected cosine, dot or euclidean)"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorConfig {
    /// Embedding dimensionality
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,

    /// Similarity metric used for ranking
    #[serde(default = "default_metric")]
    pub similarity_metric: SimilarityMetric,
}

fn default_dimensions() -> usize {
    1536
}
fn default_metric() -> SimilarityMetric {
    SimilarityMetric::Cosine
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            dimensions: default_dimensions(),
            similarity_metric: default_metric(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    /// Allowed browser origin for CORS
    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
}

fn default_port() -> u16 {
    3001
}
fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_cors_origin() -> String {
    "http://localhost:3000".into()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            cors_origin: default_cors_origin(),
        }
    }
}

impl AppConfig {
    /// Load configuration from `RAGLINE_CONFIG` or the default path
    /// (~/.ragline/config.toml), then apply environment overrides.
    ///
    /// API keys are read from:
    /// - `RAGLINE_API_KEY` (highest priority)
    /// - `OPENAI_API_KEY`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = std::env::var("RAGLINE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| Self::config_dir().join("config.toml"));

        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment-style overrides through `lookup`.
    ///
    /// Taking a lookup function keeps this testable without touching the
    /// process environment.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup("RAGLINE_API_KEY").or_else(|| lookup("OPENAI_API_KEY")) {
            self.api_key = Some(key);
        }

        if let Some(name) = lookup("RAGLINE_PROVIDER") {
            self.provider.name = name;
        }
        if let Some(url) = lookup("RAGLINE_BASE_URL") {
            self.provider.base_url = Some(url);
        }

        if let Some(model) = lookup("OPENAI_MODEL") {
            self.llm.model = model;
        }
        if let Some(model) = lookup("OPENAI_EMBEDDING_MODEL") {
            self.llm.embedding_model = model;
        }
        if let Some(v) = parse_env(&lookup, "LLM_TEMPERATURE")? {
            self.llm.temperature = v;
        }
        if let Some(v) = parse_env(&lookup, "LLM_MAX_TOKENS")? {
            self.llm.max_tokens = v;
        }

        if let Some(v) = parse_env(&lookup, "RETRIEVAL_TOP_K")? {
            self.retrieval.top_k = v;
        }
        if let Some(path) = lookup("RAGLINE_INDEX_PATH") {
            self.retrieval.index_path = PathBuf::from(path);
        }
        if let Some(v) = parse_env(&lookup, "CONFIDENCE_THRESHOLD_HIGH")? {
            self.retrieval.thresholds.high = v;
        }
        if let Some(v) = parse_env(&lookup, "CONFIDENCE_THRESHOLD_LOW")? {
            self.retrieval.thresholds.low = v;
        }
        if let Some(v) = parse_env(&lookup, "STRICT_KB_CONFIDENCE_THRESHOLD")? {
            self.retrieval.thresholds.strict_kb = v;
        }

        if let Some(v) = parse_env(&lookup, "VECTOR_DIMENSIONS")? {
            self.vector.dimensions = v;
        }
        if let Some(v) = parse_env(&lookup, "SIMILARITY_METRIC")? {
            self.vector.similarity_metric = v;
        }

        if let Some(host) = lookup("RAGLINE_HOST") {
            self.gateway.host = host;
        }
        if let Some(v) = parse_env(&lookup, "PORT")? {
            self.gateway.port = v;
        }
        if let Some(origin) = lookup("CORS_ORIGIN") {
            self.gateway.cors_origin = origin;
        }

        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".ragline")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(ConfigError::ValidationError(
                "llm.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.llm.max_tokens == 0 {
            return Err(ConfigError::ValidationError(
                "llm.max_tokens must be > 0".into(),
            ));
        }

        if self.llm.model.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "llm.model must not be empty".into(),
            ));
        }

        if self.retrieval.top_k == 0 {
            return Err(ConfigError::ValidationError(
                "retrieval.top_k must be > 0".into(),
            ));
        }

        if self.vector.dimensions == 0 {
            return Err(ConfigError::ValidationError(
                "vector.dimensions must be > 0".into(),
            ));
        }

        self.retrieval.thresholds.validate()
    }

    /// The API key, or a fatal startup error if none is configured.
    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        match self.api_key.as_deref() {
            Some(key) if !key.trim().is_empty() => Ok(key),
            _ => Err(ConfigError::MissingCredential(
                "no API key configured; set RAGLINE_API_KEY or OPENAI_API_KEY".into(),
            )),
        }
    }

    /// Render the configuration as TOML with the API key removed.
    pub fn redacted_toml(&self) -> String {
        let mut redacted = self.clone();
        redacted.api_key = redacted.api_key.map(|_| "[REDACTED]".into());
        toml::to_string_pretty(&redacted).unwrap_or_default()
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            provider: ProviderConfig::default(),
            llm: LlmConfig::default(),
            retrieval: RetrievalConfig::default(),
            vector: VectorConfig::default(),
            gateway: GatewayConfig::default(),
        }
    }
}

fn parse_env<T, F>(lookup: &F, key: &str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv {
                key: key.to_string(),
                value: raw,
            }),
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors. All of them are fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Invalid value for {key}: '{value}'")]
    InvalidEnv { key: String, value: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),

    #[error("Missing credential: {0}")]
    MissingCredential(String),
}
