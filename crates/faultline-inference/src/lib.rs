//! # faultline-inference
//!
//! Completion and embedding backend abstraction for faultline.
//!
//! This crate provides:
//! - An Ollama HTTP backend implementing the core inference traits
//! - Per-request timeouts and a bounded transient-retry budget
//! - A deterministic mock backend for tests (feature `mock`)

pub mod config;
#[cfg(feature = "mock")]
pub mod mock;
#[cfg(feature = "ollama")]
pub mod ollama;
pub mod retry;

pub use config::InferenceConfig;
#[cfg(feature = "mock")]
pub use mock::MockInferenceBackend;
#[cfg(feature = "ollama")]
pub use ollama::OllamaBackend;
pub use retry::RetryPolicy;

// Re-export the trait surface consumers program against.
pub use faultline_core::{CompletionBackend, EmbeddingBackend, InferenceBackend};
