//! Inference backend configuration.

use std::time::Duration;

use faultline_core::defaults;

/// Configuration for the Ollama-backed inference services.
///
/// Injected into backends at construction; there is no process-wide
/// inference state.
#[derive(Debug, Clone)]
pub struct InferenceConfig {
    /// Base URL of the Ollama server.
    pub base_url: String,
    /// Completion model slug.
    pub completion_model: String,
    /// Embedding model slug.
    pub embed_model: String,
    /// Expected embedding dimension for `embed_model`.
    pub dimension: usize,
    /// Per-request completion timeout.
    pub completion_timeout: Duration,
    /// Per-request embedding timeout.
    pub embed_timeout: Duration,
    /// Retry budget for transient failures.
    pub max_retries: u32,
    /// Base delay for exponential backoff between retries.
    pub backoff_base: Duration,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::OLLAMA_URL.to_string(),
            completion_model: defaults::COMPLETION_MODEL.to_string(),
            embed_model: defaults::EMBED_MODEL.to_string(),
            dimension: defaults::EMBED_DIMENSION,
            completion_timeout: Duration::from_secs(defaults::COMPLETION_TIMEOUT_SECS),
            embed_timeout: Duration::from_secs(defaults::EMBED_TIMEOUT_SECS),
            max_retries: defaults::INFERENCE_MAX_RETRIES,
            backoff_base: Duration::from_millis(defaults::STAGE_BACKOFF_BASE_MS),
        }
    }
}

impl InferenceConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `FAULTLINE_OLLAMA_URL` | `http://127.0.0.1:11434` | Ollama base URL |
    /// | `FAULTLINE_COMPLETION_MODEL` | `gpt-oss:20b` | Completion model |
    /// | `FAULTLINE_EMBED_MODEL` | `nomic-embed-text` | Embedding model |
    /// | `FAULTLINE_EMBED_DIM` | `768` | Embedding dimension |
    /// | `FAULTLINE_COMPLETION_TIMEOUT_SECS` | `120` | Completion timeout |
    /// | `FAULTLINE_EMBED_TIMEOUT_SECS` | `30` | Embedding timeout |
    /// | `FAULTLINE_INFERENCE_MAX_RETRIES` | `2` | Transient retry budget |
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = std::env::var("FAULTLINE_OLLAMA_URL") {
            config.base_url = url;
        }
        if let Ok(model) = std::env::var("FAULTLINE_COMPLETION_MODEL") {
            config.completion_model = model;
        }
        if let Ok(model) = std::env::var("FAULTLINE_EMBED_MODEL") {
            config.embed_model = model;
        }
        if let Some(dim) = env_parse::<usize>("FAULTLINE_EMBED_DIM") {
            config.dimension = dim;
        }
        if let Some(secs) = env_parse::<u64>("FAULTLINE_COMPLETION_TIMEOUT_SECS") {
            config.completion_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = env_parse::<u64>("FAULTLINE_EMBED_TIMEOUT_SECS") {
            config.embed_timeout = Duration::from_secs(secs);
        }
        if let Some(n) = env_parse::<u32>("FAULTLINE_INFERENCE_MAX_RETRIES") {
            config.max_retries = n;
        }
        config
    }

    /// Set the base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set the completion model.
    pub fn with_completion_model(mut self, model: impl Into<String>) -> Self {
        self.completion_model = model.into();
        self
    }

    /// Set the embedding model and dimension together.
    pub fn with_embed_model(mut self, model: impl Into<String>, dimension: usize) -> Self {
        self.embed_model = model.into();
        self.dimension = dimension;
        self
    }

    /// Set the transient retry budget.
    pub fn with_max_retries(mut self, n: u32) -> Self {
        self.max_retries = n;
        self
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = InferenceConfig::default();
        assert_eq!(config.base_url, defaults::OLLAMA_URL);
        assert_eq!(config.dimension, defaults::EMBED_DIMENSION);
        assert_eq!(config.max_retries, defaults::INFERENCE_MAX_RETRIES);
    }

    #[test]
    fn test_builder_chaining() {
        let config = InferenceConfig::default()
            .with_base_url("http://inference:11434")
            .with_completion_model("qwen3:8b")
            .with_embed_model("mxbai-embed-large", 1024)
            .with_max_retries(5);

        assert_eq!(config.base_url, "http://inference:11434");
        assert_eq!(config.completion_model, "qwen3:8b");
        assert_eq!(config.embed_model, "mxbai-embed-large");
        assert_eq!(config.dimension, 1024);
        assert_eq!(config.max_retries, 5);
    }
}
