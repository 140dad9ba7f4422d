//! # faultline-jobs
//!
//! Ingestion pipeline and worker pool for faultline.
//!
//! This crate provides:
//! - The seven-stage source ingestion pipeline with stage-scoped retry,
//!   exponential backoff, and dead-lettering
//! - Idempotent storage keyed by content fingerprints and deterministic
//!   atom ids
//! - A bounded worker pool across sources with broadcast events and
//!   graceful/abortive shutdown
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use faultline_jobs::{IngestWorker, IngestionPipeline, PipelineConfig, WorkerConfig};
//!
//! let pipeline = Arc::new(IngestionPipeline::new(
//!     fetcher, atoms, fingerprints, logs, review, embedder, completion,
//!     PipelineConfig::from_env(),
//! ));
//! let handle = IngestWorker::new(pipeline, WorkerConfig::from_env()).start();
//! handle.submit("https://example.com/manuals/motors.md")?;
//! ```

pub mod extract;
pub mod generate;
pub mod pipeline;
pub mod quality;
pub mod worker;

pub use extract::{extract_text, hash_normalize};
pub use generate::{generate_atom, CandidateAtom};
pub use pipeline::{
    HttpSourceFetcher, IngestOutcome, IngestionPipeline, PipelineConfig, SourceFetcher,
    StaticSourceFetcher,
};
pub use quality::{QualityDimension, QualityReport, QualityScorer, WeightedQualityScorer};
pub use worker::{IngestWorker, WorkerConfig, WorkerEvent, WorkerHandle};

// Re-export core types
pub use faultline_core::{IngestionStage, Result};
