//! The seven-stage ingestion pipeline.
//!
//! Stages run strictly in order per source: acquisition → extraction →
//! chunking → atom generation → quality validation → embedding → storage.
//! Each stage is independently retried with exponential backoff up to the
//! configured cap; exhausting the cap (or a non-retryable failure)
//! dead-letters the source. Every attempt lands in the ingestion log with
//! its error class. A caller-supplied cancellation signal is honored
//! between and during stage calls, so no external call outlives an abort.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use faultline_core::{
    defaults, AtomRepository, CompletionBackend, EmbeddingBackend, Error, FingerprintRepository,
    FingerprintStatus, IngestionLogRepository, IngestionStage, KnowledgeAtom, Result,
    ReviewQueueEntry, ReviewQueueRepository,
};
use faultline_db::{compute_content_hash, ChunkerConfig, StructuralChunker};

use crate::extract::{extract_text, hash_normalize};
use crate::generate::generate_atom;
use crate::quality::{QualityScorer, WeightedQualityScorer};

// ---------------------------------------------------------------------------
// Source acquisition
// ---------------------------------------------------------------------------

/// Fetches raw source bytes for the acquisition stage.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch(&self, uri: &str) -> Result<Vec<u8>>;
}

/// HTTP fetcher for remote sources.
pub struct HttpSourceFetcher {
    client: reqwest::Client,
}

impl HttpSourceFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl SourceFetcher for HttpSourceFetcher {
    async fn fetch(&self, uri: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(uri)
            .send()
            .await
            .map_err(|e| Error::Request(format!("fetch {} failed: {}", uri, e)))?;
        if !response.status().is_success() {
            return Err(Error::Request(format!(
                "fetch {} returned {}",
                uri,
                response.status()
            )));
        }
        Ok(response.bytes().await.map_err(Error::from)?.to_vec())
    }
}

/// Fetcher serving preloaded documents; used by tests and local imports.
#[derive(Default)]
pub struct StaticSourceFetcher {
    sources: Mutex<HashMap<String, Vec<u8>>>,
}

impl StaticSourceFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a document under a URI.
    pub fn insert(&self, uri: impl Into<String>, raw: impl Into<Vec<u8>>) {
        self.sources.lock().unwrap().insert(uri.into(), raw.into());
    }
}

#[async_trait]
impl SourceFetcher for StaticSourceFetcher {
    async fn fetch(&self, uri: &str) -> Result<Vec<u8>> {
        self.sources
            .lock()
            .unwrap()
            .get(uri)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("source {} not registered", uri)))
    }
}

// ---------------------------------------------------------------------------
// Pipeline configuration
// ---------------------------------------------------------------------------

/// Configuration for the ingestion pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Retries after the first attempt of a failed stage.
    pub max_stage_retries: u32,
    /// Base delay for exponential backoff between stage retries.
    pub backoff_base: Duration,
    /// Minimum quality score for an atom to enter the store.
    pub quality_min: f32,
    /// Chunker word-window configuration.
    pub chunker: ChunkerConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_stage_retries: defaults::STAGE_MAX_RETRIES,
            backoff_base: Duration::from_millis(defaults::STAGE_BACKOFF_BASE_MS),
            quality_min: defaults::QUALITY_MIN_SCORE,
            chunker: ChunkerConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `FAULTLINE_STAGE_MAX_RETRIES` | `3` | Stage retry cap |
    /// | `FAULTLINE_STAGE_BACKOFF_MS` | `250` | Backoff base delay |
    /// | `FAULTLINE_QUALITY_MIN` | `60` | Minimum atom quality score |
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(n) = env_parse::<u32>("FAULTLINE_STAGE_MAX_RETRIES") {
            config.max_stage_retries = n;
        }
        if let Some(ms) = env_parse::<u64>("FAULTLINE_STAGE_BACKOFF_MS") {
            config.backoff_base = Duration::from_millis(ms);
        }
        if let Some(min) = env_parse::<f32>("FAULTLINE_QUALITY_MIN") {
            config.quality_min = min;
        }
        config
    }

    /// Set the stage retry cap.
    pub fn with_max_stage_retries(mut self, n: u32) -> Self {
        self.max_stage_retries = n;
        self
    }

    /// Set the backoff base delay.
    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    /// Set the minimum quality score.
    pub fn with_quality_min(mut self, min: f32) -> Self {
        self.quality_min = min;
        self
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Terminal outcome of ingesting one source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// The fingerprint ledger already shows this content ingested; no-op.
    AlreadyIngested,
    /// The source was processed to completion.
    Ingested {
        atoms_stored: usize,
        atoms_reviewed: usize,
    },
    /// A stage exhausted its retries; the source is parked for review.
    DeadLettered {
        stage: IngestionStage,
        reason: String,
    },
}

/// The ingestion pipeline over injected store and inference interfaces.
pub struct IngestionPipeline {
    fetcher: Arc<dyn SourceFetcher>,
    atoms: Arc<dyn AtomRepository>,
    fingerprints: Arc<dyn FingerprintRepository>,
    logs: Arc<dyn IngestionLogRepository>,
    review: Arc<dyn ReviewQueueRepository>,
    embedder: Arc<dyn EmbeddingBackend>,
    completion: Arc<dyn CompletionBackend>,
    scorer: Arc<dyn QualityScorer>,
    chunker: StructuralChunker,
    config: PipelineConfig,
}

impl IngestionPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        fetcher: Arc<dyn SourceFetcher>,
        atoms: Arc<dyn AtomRepository>,
        fingerprints: Arc<dyn FingerprintRepository>,
        logs: Arc<dyn IngestionLogRepository>,
        review: Arc<dyn ReviewQueueRepository>,
        embedder: Arc<dyn EmbeddingBackend>,
        completion: Arc<dyn CompletionBackend>,
        config: PipelineConfig,
    ) -> Self {
        let chunker = StructuralChunker::new(config.chunker.clone());
        Self {
            fetcher,
            atoms,
            fingerprints,
            logs,
            review,
            embedder,
            completion,
            scorer: Arc::new(WeightedQualityScorer::default()),
            chunker,
            config,
        }
    }

    /// Swap the quality scoring strategy.
    pub fn with_scorer(mut self, scorer: Arc<dyn QualityScorer>) -> Self {
        self.scorer = scorer;
        self
    }

    /// The pipeline's configuration.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Ingest one source end to end.
    ///
    /// Returns `Ok` for every handled outcome, including dead-lettering;
    /// `Err` only for cancellation or a failure that could not even be
    /// recorded.
    pub async fn ingest(
        &self,
        uri: &str,
        cancel: &mut watch::Receiver<bool>,
    ) -> Result<IngestOutcome> {
        let started = Instant::now();
        info!(
            subsystem = "ingest",
            component = "pipeline",
            op = "ingest_source",
            source_id = uri,
            "Ingesting source"
        );

        // Stage 1: acquisition — fetch, hash, consult the dedup ledger.
        let acquired = self
            .run_stage(uri, IngestionStage::Acquisition, cancel, || async move {
                let raw = self.fetcher.fetch(uri).await?;
                let content_hash = compute_content_hash(&hash_normalize(&raw));
                let fingerprint = self.fingerprints.record_pending(&content_hash, uri).await?;
                Ok((raw, content_hash, fingerprint))
            })
            .await;
        let (raw, content_hash, fingerprint) = match acquired {
            Ok(v) => v,
            Err(e) => return self.fail_source(uri, None, IngestionStage::Acquisition, e).await,
        };
        let hash = content_hash.as_str();

        if fingerprint.status == FingerprintStatus::Ingested {
            info!(
                subsystem = "ingest",
                component = "pipeline",
                op = "ingest_source",
                source_id = uri,
                "Content already ingested, skipping"
            );
            return Ok(IngestOutcome::AlreadyIngested);
        }

        // Stage 2: extraction.
        let raw_ref = raw.as_slice();
        let text = match self
            .run_stage(uri, IngestionStage::Extraction, cancel, || async move {
                extract_text(raw_ref)
            })
            .await
        {
            Ok(v) => v,
            Err(e) => {
                return self
                    .fail_source(uri, Some(hash), IngestionStage::Extraction, e)
                    .await
            }
        };

        // Stage 3: chunking.
        let text_ref = text.as_str();
        let chunks = match self
            .run_stage(uri, IngestionStage::Chunking, cancel, || async move {
                let chunks = self.chunker.chunk(text_ref);
                if chunks.is_empty() {
                    Err(Error::Validation("chunking produced no passages".into()))
                } else {
                    Ok(chunks)
                }
            })
            .await
        {
            Ok(v) => v,
            Err(e) => {
                return self
                    .fail_source(uri, Some(hash), IngestionStage::Chunking, e)
                    .await
            }
        };
        debug!(
            subsystem = "ingest",
            component = "pipeline",
            source_id = uri,
            chunk_count = chunks.len(),
            "Source chunked"
        );

        // Stage 4: atom generation, one completion call per chunk.
        let mut candidates = Vec::with_capacity(chunks.len());
        for (index, chunk) in chunks.iter().enumerate() {
            let generated = self
                .run_stage(uri, IngestionStage::AtomGeneration, cancel, || {
                    generate_atom(self.completion.as_ref(), uri, index, chunk)
                })
                .await;
            match generated {
                Ok(atom) => candidates.push(atom),
                Err(e) => {
                    return self
                        .fail_source(uri, Some(hash), IngestionStage::AtomGeneration, e)
                        .await
                }
            }
        }

        // Stage 5: quality validation; sub-minimum atoms go to review.
        let validation_start = Instant::now();
        let mut kept: Vec<KnowledgeAtom> = Vec::new();
        let mut reviewed = 0usize;
        for mut atom in candidates {
            let report = self.scorer.score(&atom);
            atom.quality_score = report.total;
            if report.total < self.config.quality_min {
                reviewed += 1;
                let reason = format!(
                    "quality score {:.1} below minimum {:.1}",
                    report.total, self.config.quality_min
                );
                warn!(
                    subsystem = "ingest",
                    component = "quality",
                    source_id = uri,
                    atom_id = %atom.id,
                    quality = report.total,
                    "Atom routed to review queue"
                );
                let entry = ReviewQueueEntry {
                    id: Uuid::new_v4(),
                    source_id: uri.to_string(),
                    title: atom.title.clone(),
                    reason,
                    quality_score: report.total,
                    payload: serde_json::to_value(&atom)?,
                    created_at: Utc::now(),
                };
                let entry_ref = &entry;
                if let Err(e) = self
                    .run_stage(uri, IngestionStage::QualityValidation, cancel, || async move {
                        self.review.push(entry_ref).await.map(|_| ())
                    })
                    .await
                {
                    return self
                        .fail_source(uri, Some(hash), IngestionStage::QualityValidation, e)
                        .await;
                }
            } else {
                kept.push(atom);
            }
        }
        let _ = self
            .logs
            .record_attempt(
                uri,
                IngestionStage::QualityValidation,
                None,
                None,
                0,
                validation_start.elapsed().as_millis() as i64,
            )
            .await;

        if kept.is_empty() {
            // Content processed; everything awaits review. Terminal for the
            // fingerprint so re-submission stays a no-op.
            if let Err(e) = self
                .run_stage(uri, IngestionStage::Storage, cancel, || async move {
                    self.fingerprints
                        .set_status(hash, FingerprintStatus::Ingested)
                        .await
                })
                .await
            {
                return self
                    .fail_source(uri, Some(hash), IngestionStage::Storage, e)
                    .await;
            }
            return Ok(IngestOutcome::Ingested {
                atoms_stored: 0,
                atoms_reviewed: reviewed,
            });
        }

        // Stage 6: embedding, batched over the kept atoms.
        let texts: Vec<String> = kept
            .iter()
            .map(|a| format!("{}\n{}\n{}", a.title, a.summary, a.body))
            .collect();
        let expected = texts.len();
        let texts_ref = texts.as_slice();
        let vectors = match self
            .run_stage(uri, IngestionStage::Embedding, cancel, || async move {
                let vectors = self.embedder.embed_texts(texts_ref).await?;
                if vectors.len() != expected {
                    return Err(Error::Embedding(format!(
                        "expected {} vectors, got {}",
                        expected,
                        vectors.len()
                    )));
                }
                Ok(vectors)
            })
            .await
        {
            Ok(v) => v,
            Err(e) => {
                return self
                    .fail_source(uri, Some(hash), IngestionStage::Embedding, e)
                    .await
            }
        };
        for (atom, vector) in kept.iter_mut().zip(vectors) {
            atom.embedding = Some(vector);
        }

        // Stage 7: storage — deterministic-id upserts, then the ledger flip.
        for atom in &kept {
            if let Err(e) = self
                .run_stage(uri, IngestionStage::Storage, cancel, || async move {
                    self.atoms.upsert(atom).await.map(|_| ())
                })
                .await
            {
                return self
                    .fail_source(uri, Some(hash), IngestionStage::Storage, e)
                    .await;
            }
        }
        if let Err(e) = self
            .run_stage(uri, IngestionStage::Storage, cancel, || async move {
                self.fingerprints
                    .set_status(hash, FingerprintStatus::Ingested)
                    .await
            })
            .await
        {
            return self
                .fail_source(uri, Some(hash), IngestionStage::Storage, e)
                .await;
        }

        info!(
            subsystem = "ingest",
            component = "pipeline",
            op = "ingest_source",
            source_id = uri,
            atom_count = kept.len(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Source ingested"
        );
        Ok(IngestOutcome::Ingested {
            atoms_stored: kept.len(),
            atoms_reviewed: reviewed,
        })
    }

    /// Run one stage with bounded retry, backoff, attempt logging, and
    /// cancellation. Only transient-class errors are retried.
    async fn run_stage<T, F, Fut>(
        &self,
        source_id: &str,
        stage: IngestionStage,
        cancel: &mut watch::Receiver<bool>,
        mut op: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt: u32 = 0;
        loop {
            if *cancel.borrow() {
                return Err(Error::Cancelled(format!("{} stage aborted", stage)));
            }

            let start = Instant::now();
            let result = tokio::select! {
                biased;
                _ = wait_cancelled(cancel) => {
                    Err(Error::Cancelled(format!("{} stage aborted", stage)))
                }
                r = op() => r,
            };
            let duration_ms = start.elapsed().as_millis() as i64;

            match result {
                Ok(value) => {
                    let _ = self
                        .logs
                        .record_attempt(source_id, stage, None, None, attempt as i32, duration_ms)
                        .await;
                    return Ok(value);
                }
                Err(e @ Error::Cancelled(_)) => return Err(e),
                Err(e) => {
                    let class = e.class();
                    let _ = self
                        .logs
                        .record_attempt(
                            source_id,
                            stage,
                            Some(&class.to_string()),
                            Some(&e.to_string()),
                            attempt as i32,
                            duration_ms,
                        )
                        .await;
                    warn!(
                        subsystem = "ingest",
                        component = "pipeline",
                        source_id = source_id,
                        stage = stage.as_str(),
                        attempt = attempt,
                        error = %e,
                        error_class = %class,
                        "Stage attempt failed"
                    );
                    if e.is_retryable() && attempt < self.config.max_stage_retries {
                        let delay = self.config.backoff_base * 2u32.saturating_pow(attempt);
                        tokio::select! {
                            biased;
                            _ = wait_cancelled(cancel) => {
                                return Err(Error::Cancelled(format!(
                                    "{} stage aborted during backoff",
                                    stage
                                )));
                            }
                            _ = tokio::time::sleep(delay) => {}
                        }
                        attempt += 1;
                    } else {
                        return Err(e);
                    }
                }
            }
        }
    }

    /// Dead-letter a source whose stage failed terminally. Cancellation
    /// propagates instead; it is not a source defect.
    async fn fail_source(
        &self,
        uri: &str,
        content_hash: Option<&str>,
        stage: IngestionStage,
        error: Error,
    ) -> Result<IngestOutcome> {
        if matches!(error, Error::Cancelled(_)) {
            return Err(error);
        }
        let reason = format!("{} ({})", error, error.class());
        self.logs.dead_letter(uri, stage, &reason).await?;
        if let Some(hash) = content_hash {
            if let Err(e) = self
                .fingerprints
                .set_status(hash, FingerprintStatus::Failed)
                .await
            {
                warn!(
                    subsystem = "ingest",
                    component = "pipeline",
                    source_id = uri,
                    error = %e,
                    "Could not mark fingerprint failed"
                );
            }
        }
        Ok(IngestOutcome::DeadLettered { stage, reason })
    }
}

/// Resolve when the cancel flag flips to `true`; pend forever if the
/// sender is gone (a dropped sender must not read as cancellation).
async fn wait_cancelled(cancel: &mut watch::Receiver<bool>) {
    loop {
        if *cancel.borrow() {
            return;
        }
        if cancel.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
