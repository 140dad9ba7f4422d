//! Ollama inference backend implementation.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

use faultline_core::{
    CompletionBackend, EmbeddingBackend, Error, InferenceBackend, Result, Vector,
};

use crate::config::InferenceConfig;
use crate::retry::RetryPolicy;

/// Ollama inference backend.
///
/// Serves both the completion service (atom generation, intent-classifier
/// fallback) and the embedding service. Every request carries its own
/// timeout; transient failures are retried within the configured budget.
pub struct OllamaBackend {
    client: Client,
    config: InferenceConfig,
    retry: RetryPolicy,
}

impl OllamaBackend {
    /// Create a new Ollama backend with the given configuration.
    pub fn new(config: InferenceConfig) -> Result<Self> {
        if config.base_url.is_empty() {
            return Err(Error::Config("inference base URL is empty".into()));
        }
        let client = Client::builder()
            .timeout(config.completion_timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {}", e)))?;

        info!(
            subsystem = "inference",
            component = "ollama",
            base_url = %config.base_url,
            completion_model = %config.completion_model,
            embed_model = %config.embed_model,
            "Initializing Ollama backend"
        );

        let retry = RetryPolicy::new(config.max_retries, config.backoff_base);
        Ok(Self {
            client,
            config,
            retry,
        })
    }

    /// Create from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::new(InferenceConfig::from_env())
    }

    /// Internal completion call shared by both `complete` variants.
    ///
    /// Uses the `/api/chat` endpoint which separates thinking/reasoning
    /// from the final response content on reasoning models.
    async fn chat(
        &self,
        system: &str,
        prompt: &str,
        format: Option<serde_json::Value>,
    ) -> Result<String> {
        let start = Instant::now();

        let mut messages = Vec::new();
        if !system.is_empty() {
            messages.push(ChatMessage {
                role: "system".to_string(),
                content: system.to_string(),
            });
        }
        messages.push(ChatMessage {
            role: "user".to_string(),
            content: prompt.to_string(),
        });

        let think = if format.is_some() { Some(false) } else { None };
        let request = ChatRequest {
            model: self.config.completion_model.clone(),
            messages,
            stream: false,
            format,
            think,
        };

        let response = self
            .client
            .post(format!("{}/api/chat", self.config.base_url))
            .timeout(self.config.completion_timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Completion(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Completion(format!(
                "Ollama returned {}: {}",
                status, body
            )));
        }

        let result: ChatResponse = response
            .json()
            .await
            .map_err(|e| Error::Completion(format!("failed to parse response: {}", e)))?;

        let content = result.message.content;
        let elapsed = start.elapsed().as_millis() as u64;
        debug!(
            subsystem = "inference",
            component = "ollama",
            op = "complete",
            response_len = content.len(),
            duration_ms = elapsed,
            "Completion finished"
        );
        if elapsed > 30_000 {
            warn!(
                subsystem = "inference",
                component = "ollama",
                duration_ms = elapsed,
                prompt_len = prompt.len(),
                "Slow completion"
            );
        }
        Ok(content)
    }
}

#[derive(Serialize)]
struct EmbeddingRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Chat API message for `/api/chat`.
#[derive(Serialize, Deserialize, Clone)]
struct ChatMessage {
    role: String,
    content: String,
}

/// Request payload for the Ollama `/api/chat` endpoint.
#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    /// Ollama format enforcement. `"json"` guarantees valid JSON output.
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<serde_json::Value>,
    /// Suppresses chain-of-thought on models that support it.
    #[serde(skip_serializing_if = "Option::is_none")]
    think: Option<bool>,
}

/// Response from the Ollama `/api/chat` endpoint.
#[derive(Deserialize)]
struct ChatResponse {
    message: ChatMessage,
}

#[async_trait]
impl EmbeddingBackend for OllamaBackend {
    #[instrument(skip(self, texts), fields(subsystem = "inference", component = "ollama", op = "embed_texts", input_count = texts.len()))]
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vector>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let vectors = self
            .retry
            .run("embed_texts", || async move {
                let request = EmbeddingRequest {
                    model: self.config.embed_model.clone(),
                    input: texts.to_vec(),
                };

                let response = self
                    .client
                    .post(format!("{}/api/embed", self.config.base_url))
                    .timeout(self.config.embed_timeout)
                    .json(&request)
                    .send()
                    .await
                    .map_err(|e| Error::Embedding(format!("request failed: {}", e)))?;

                if !response.status().is_success() {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    return Err(Error::Embedding(format!(
                        "Ollama returned {}: {}",
                        status, body
                    )));
                }

                let result: EmbeddingResponse = response
                    .json()
                    .await
                    .map_err(|e| Error::Embedding(format!("failed to parse response: {}", e)))?;
                Ok(result.embeddings)
            })
            .await?;

        if vectors.len() != texts.len() {
            return Err(Error::Embedding(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                vectors.len()
            )));
        }
        for v in &vectors {
            if v.len() != self.config.dimension {
                return Err(Error::Embedding(format!(
                    "embedding dimension {} does not match configured {}",
                    v.len(),
                    self.config.dimension
                )));
            }
        }

        Ok(vectors.into_iter().map(Vector::from).collect())
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }

    fn model_name(&self) -> &str {
        &self.config.embed_model
    }
}

#[async_trait]
impl CompletionBackend for OllamaBackend {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String> {
        self.retry
            .run("complete", || self.chat(system, prompt, None))
            .await
    }

    async fn complete_json(&self, system: &str, prompt: &str) -> Result<String> {
        self.retry
            .run("complete_json", || {
                self.chat(system, prompt, Some(serde_json::json!("json")))
            })
            .await
    }

    fn model_name(&self) -> &str {
        &self.config.completion_model
    }
}

#[async_trait]
impl InferenceBackend for OllamaBackend {
    async fn health_check(&self) -> Result<bool> {
        let response = self
            .client
            .get(format!("{}/api/tags", self.config.base_url))
            .timeout(std::time::Duration::from_secs(5))
            .send()
            .await;
        Ok(matches!(response, Ok(r) if r.status().is_success()))
    }
}
