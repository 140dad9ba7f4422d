//! Mock inference backend for deterministic testing.
//!
//! Provides embeddings derived from token hashes (texts sharing tokens get
//! similar vectors) and scripted completions, so pipeline and retrieval
//! tests run without a model server.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use faultline_core::{
    CompletionBackend, EmbeddingBackend, Error, InferenceBackend, Result, Vector,
};

/// A recorded call against the mock, for assertions.
#[derive(Debug, Clone)]
pub struct MockCall {
    pub operation: String,
    pub input: String,
}

#[derive(Debug)]
struct MockConfig {
    dimension: usize,
    default_response: String,
    /// Substring of the prompt → canned response.
    mapped_responses: Vec<(String, String)>,
    latency_ms: u64,
    failure_rate: f64,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            dimension: 8,
            default_response: "Mock response".to_string(),
            mapped_responses: Vec::new(),
            latency_ms: 0,
            failure_rate: 0.0,
        }
    }
}

/// Deterministic mock implementing all inference traits.
#[derive(Clone)]
pub struct MockInferenceBackend {
    config: Arc<MockConfig>,
    /// Responses consumed in order before the mapped/default lookup.
    scripted: Arc<Mutex<VecDeque<String>>>,
    call_log: Arc<Mutex<Vec<MockCall>>>,
    fail_embeddings: Arc<AtomicBool>,
    fail_completions: Arc<AtomicBool>,
}

impl MockInferenceBackend {
    /// Create a new mock backend with default configuration.
    pub fn new() -> Self {
        Self {
            config: Arc::new(MockConfig::default()),
            scripted: Arc::new(Mutex::new(VecDeque::new())),
            call_log: Arc::new(Mutex::new(Vec::new())),
            fail_embeddings: Arc::new(AtomicBool::new(false)),
            fail_completions: Arc::new(AtomicBool::new(false)),
        }
    }

    fn config_mut(&mut self) -> &mut MockConfig {
        Arc::get_mut(&mut self.config).expect("mock configured after cloning")
    }

    /// Set the embedding dimension.
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.config_mut().dimension = dimension;
        self
    }

    /// Set the fallback response for completion requests.
    pub fn with_fixed_response(mut self, response: impl Into<String>) -> Self {
        self.config_mut().default_response = response.into();
        self
    }

    /// Map prompts containing `needle` to a canned response.
    pub fn with_response_mapping(
        mut self,
        needle: impl Into<String>,
        response: impl Into<String>,
    ) -> Self {
        self.config_mut()
            .mapped_responses
            .push((needle.into(), response.into()));
        self
    }

    /// Set simulated latency for all operations.
    pub fn with_latency_ms(mut self, latency_ms: u64) -> Self {
        self.config_mut().latency_ms = latency_ms;
        self
    }

    /// Set random failure rate (0.0 - 1.0) for chaos-style tests.
    pub fn with_failure_rate(mut self, rate: f64) -> Self {
        self.config_mut().failure_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// Queue a response consumed before mapped/default lookup.
    pub fn push_response(&self, response: impl Into<String>) {
        self.scripted.lock().unwrap().push_back(response.into());
    }

    /// Make every embedding call fail deterministically.
    pub fn set_fail_embeddings(&self, fail: bool) {
        self.fail_embeddings.store(fail, Ordering::SeqCst);
    }

    /// Make every completion call fail deterministically.
    pub fn set_fail_completions(&self, fail: bool) {
        self.fail_completions.store(fail, Ordering::SeqCst);
    }

    /// Get all logged calls for assertion.
    pub fn calls(&self) -> Vec<MockCall> {
        self.call_log.lock().unwrap().clone()
    }

    /// Number of embed calls so far.
    pub fn embed_call_count(&self) -> usize {
        self.call_log
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.operation == "embed")
            .count()
    }

    /// Number of completion calls so far.
    pub fn completion_call_count(&self) -> usize {
        self.call_log
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.operation == "complete")
            .count()
    }

    fn log_call(&self, operation: &str, input: &str) {
        self.call_log.lock().unwrap().push(MockCall {
            operation: operation.to_string(),
            input: input.to_string(),
        });
    }

    fn should_fail_randomly(&self) -> bool {
        use rand::Rng;
        self.config.failure_rate > 0.0
            && rand::thread_rng().gen::<f64>() < self.config.failure_rate
    }

    async fn simulate_latency(&self) {
        if self.config.latency_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.config.latency_ms)).await;
        }
    }

    /// Deterministic embedding: each token hashes into bucket/value pairs
    /// accumulated into the vector, then L2-normalized. Texts sharing
    /// tokens land near each other under cosine similarity.
    pub fn embedding_for(text: &str, dimension: usize) -> Vec<f32> {
        let mut vec = vec![0.0_f32; dimension.max(1)];
        for token in text.to_lowercase().split_whitespace() {
            let digest = Sha256::digest(token.as_bytes());
            for pair in digest.chunks(2).take(8) {
                let bucket = pair[0] as usize % vec.len();
                let value = (pair[1] as f32 / 255.0) - 0.5;
                vec[bucket] += value;
            }
        }
        let norm: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vec {
                *x /= norm;
            }
        } else {
            vec[0] = 1.0;
        }
        vec
    }

    fn pick_response(&self, prompt: &str) -> String {
        if let Some(scripted) = self.scripted.lock().unwrap().pop_front() {
            return scripted;
        }
        for (needle, response) in &self.config.mapped_responses {
            if prompt.contains(needle.as_str()) {
                return response.clone();
            }
        }
        self.config.default_response.clone()
    }
}

impl Default for MockInferenceBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingBackend for MockInferenceBackend {
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vector>> {
        self.simulate_latency().await;
        for text in texts {
            self.log_call("embed", text);
        }
        if self.fail_embeddings.load(Ordering::SeqCst) || self.should_fail_randomly() {
            return Err(Error::Embedding("simulated embedding failure".into()));
        }
        Ok(texts
            .iter()
            .map(|t| Vector::from(Self::embedding_for(t, self.config.dimension)))
            .collect())
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }

    fn model_name(&self) -> &str {
        "mock-embed"
    }
}

#[async_trait]
impl CompletionBackend for MockInferenceBackend {
    async fn complete(&self, _system: &str, prompt: &str) -> Result<String> {
        self.simulate_latency().await;
        self.log_call("complete", prompt);
        if self.fail_completions.load(Ordering::SeqCst) || self.should_fail_randomly() {
            return Err(Error::Completion("simulated completion failure".into()));
        }
        Ok(self.pick_response(prompt))
    }

    async fn complete_json(&self, system: &str, prompt: &str) -> Result<String> {
        self.complete(system, prompt).await
    }

    fn model_name(&self) -> &str {
        "mock-completion"
    }
}

#[async_trait]
impl InferenceBackend for MockInferenceBackend {
    async fn health_check(&self) -> Result<bool> {
        Ok(!self.fail_embeddings.load(Ordering::SeqCst)
            && !self.fail_completions.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
        dot // both inputs are unit vectors
    }

    #[test]
    fn test_embedding_is_deterministic() {
        let a = MockInferenceBackend::embedding_for("motor overload fault", 16);
        let b = MockInferenceBackend::embedding_for("motor overload fault", 16);
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn test_shared_tokens_score_higher_than_disjoint() {
        let query = MockInferenceBackend::embedding_for("motor overload fault", 32);
        let related = MockInferenceBackend::embedding_for("overload fault on the motor", 32);
        let unrelated = MockInferenceBackend::embedding_for("quarterly revenue projections", 32);
        assert!(cosine(&query, &related) > cosine(&query, &unrelated));
    }

    #[tokio::test]
    async fn test_embed_texts_respects_dimension() {
        let mock = MockInferenceBackend::new().with_dimension(24);
        let vectors = mock.embed_texts(&["hello".to_string()]).await.unwrap();
        assert_eq!(vectors[0].as_slice().len(), 24);
        assert_eq!(mock.embed_call_count(), 1);
    }

    #[tokio::test]
    async fn test_scripted_responses_consumed_in_order() {
        let mock = MockInferenceBackend::new().with_fixed_response("default");
        mock.push_response("first");
        mock.push_response("second");
        assert_eq!(mock.complete("", "p").await.unwrap(), "first");
        assert_eq!(mock.complete("", "p").await.unwrap(), "second");
        assert_eq!(mock.complete("", "p").await.unwrap(), "default");
    }

    #[tokio::test]
    async fn test_response_mapping_by_substring() {
        let mock = MockInferenceBackend::new()
            .with_response_mapping("classify", "troubleshoot")
            .with_fixed_response("fallback");
        assert_eq!(
            mock.complete("", "please classify this").await.unwrap(),
            "troubleshoot"
        );
        assert_eq!(mock.complete("", "other").await.unwrap(), "fallback");
    }

    #[tokio::test]
    async fn test_deterministic_failure_toggles() {
        let mock = MockInferenceBackend::new();
        mock.set_fail_completions(true);
        assert!(mock.complete("", "p").await.is_err());
        assert!(!mock.health_check().await.unwrap());
        mock.set_fail_completions(false);
        assert!(mock.complete("", "p").await.is_ok());
        assert!(mock.health_check().await.unwrap());
    }
}
