//! Multi-stage fallback retrieval over the knowledge store.
//!
//! Stage order: semantic nearest-neighbor → domain-filtered semantic →
//! lexical keyword match. Retrieval stops at the first stage with adequate
//! coverage. Each stage runs under its own timeout and falls through on
//! failure; total store unavailability yields an explicit degraded result
//! instead of an error.

use std::sync::Arc;
use std::time::Instant;

use tokio::time::timeout;
use tracing::{debug, info, warn};

use faultline_core::{
    AtomCategory, AtomHit, AtomRepository, Coverage, EmbeddingBackend, Error, Result,
    RetrievalResult, Vector,
};

use crate::config::RetrievalConfig;
use crate::coverage::classify;
use crate::entities::recognize;

/// Caller-supplied restrictions for a retrieval.
#[derive(Debug, Clone, Default)]
pub struct RetrievalFilters {
    /// Restrict every stage to one category.
    pub category: Option<AtomCategory>,
}

/// Retrieval engine with multi-stage fallback and coverage scoring.
pub struct RetrievalEngine {
    atoms: Arc<dyn AtomRepository>,
    embedder: Arc<dyn EmbeddingBackend>,
    config: RetrievalConfig,
}

impl RetrievalEngine {
    /// Create a new retrieval engine over the given store and embedder.
    pub fn new(
        atoms: Arc<dyn AtomRepository>,
        embedder: Arc<dyn EmbeddingBackend>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            atoms,
            embedder,
            config,
        }
    }

    /// The engine's configuration.
    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// The underlying atom repository (shared with the operational surface).
    pub fn atoms(&self) -> &Arc<dyn AtomRepository> {
        &self.atoms
    }

    /// The underlying embedding backend.
    pub fn embedder(&self) -> &Arc<dyn EmbeddingBackend> {
        &self.embedder
    }

    /// Retrieve knowledge for a query.
    ///
    /// Never returns an error: failures degrade stage by stage, and a
    /// fully unreachable store produces `RetrievalResult { degraded: true }`
    /// for the caller to act on.
    pub async fn retrieve(
        &self,
        query: &str,
        filters: Option<&RetrievalFilters>,
    ) -> RetrievalResult {
        let start = Instant::now();
        let query = query.trim();
        if query.is_empty() {
            return RetrievalResult {
                query: String::new(),
                hits: Vec::new(),
                coverage: Coverage::None,
                degraded: false,
                latency_ms: start.elapsed().as_millis() as u64,
            };
        }

        let caller_category = filters.and_then(|f| f.category);
        let entities = recognize(query);

        let mut any_stage_succeeded = false;
        let mut best: (Coverage, Vec<AtomHit>) = (Coverage::None, Vec::new());

        // Embed once; the vector serves both semantic stages.
        let query_vec = match self.embed_query(query).await {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(
                    subsystem = "retrieval",
                    component = "engine",
                    op = "embed_query",
                    error = %e,
                    error_class = %e.class(),
                    "Query embedding failed, skipping semantic stages"
                );
                None
            }
        };

        // Stage 1: semantic nearest-neighbor.
        if let Some(vec) = &query_vec {
            match self.run_stage("semantic", self.atoms.find_similar(vec, self.config.top_k, caller_category)).await {
                Ok(hits) => {
                    any_stage_succeeded = true;
                    let coverage = self.classify_hits(&hits);
                    debug!(
                        subsystem = "retrieval",
                        component = "engine",
                        op = "semantic",
                        hit_count = hits.len(),
                        coverage = coverage.as_str(),
                        "Semantic stage complete"
                    );
                    if coverage.is_adequate() {
                        return self.finish(query, hits, coverage, false, start);
                    }
                    if coverage > best.0 {
                        best = (coverage, hits);
                    }
                }
                Err(e) => self.log_stage_failure("semantic", &e),
            }
        }

        // Stage 2: domain-filtered semantic, when the query names a domain
        // and the caller did not already restrict one.
        let derived_category = entities.primary_category();
        if let (Some(vec), None, Some(category)) = (&query_vec, caller_category, derived_category) {
            match self.run_stage("domain_filter", self.atoms.find_similar(vec, self.config.top_k, Some(category))).await {
                Ok(hits) => {
                    any_stage_succeeded = true;
                    let coverage = self.classify_hits(&hits);
                    debug!(
                        subsystem = "retrieval",
                        component = "engine",
                        op = "domain_filter",
                        category = category.as_str(),
                        hit_count = hits.len(),
                        coverage = coverage.as_str(),
                        "Domain-filter stage complete"
                    );
                    if coverage.is_adequate() {
                        return self.finish(query, hits, coverage, false, start);
                    }
                    if coverage > best.0 {
                        best = (coverage, hits);
                    }
                }
                Err(e) => self.log_stage_failure("domain_filter", &e),
            }
        }

        // Stage 3: lexical keyword match, the final fallback.
        match self.run_stage("keyword", self.atoms.keyword_search(query, self.config.top_k)).await {
            Ok(hits) => {
                any_stage_succeeded = true;
                let coverage = self.classify_hits(&hits);
                debug!(
                    subsystem = "retrieval",
                    component = "engine",
                    op = "keyword",
                    hit_count = hits.len(),
                    coverage = coverage.as_str(),
                    "Keyword stage complete"
                );
                if coverage > best.0 {
                    best = (coverage, hits);
                }
            }
            Err(e) => self.log_stage_failure("keyword", &e),
        }

        let degraded = !any_stage_succeeded;
        if degraded {
            warn!(
                subsystem = "retrieval",
                component = "engine",
                op = "retrieve",
                query = query,
                "All retrieval stages failed, returning degraded result"
            );
        }
        let (coverage, hits) = best;
        self.finish(query, hits, coverage, degraded, start)
    }

    async fn embed_query(&self, query: &str) -> Result<Vector> {
        let vectors = timeout(
            self.config.stage_timeout,
            self.embedder.embed_texts(&[query.to_string()]),
        )
        .await
        .map_err(|_| Error::Timeout("query embedding".into()))??;
        vectors
            .into_iter()
            .next()
            .ok_or_else(|| Error::Embedding("no vector returned for query".into()))
    }

    async fn run_stage<F>(&self, stage: &str, fut: F) -> Result<Vec<AtomHit>>
    where
        F: std::future::Future<Output = Result<Vec<AtomHit>>>,
    {
        timeout(self.config.stage_timeout, fut)
            .await
            .map_err(|_| Error::Timeout(format!("{} stage", stage)))?
    }

    fn classify_hits(&self, hits: &[AtomHit]) -> Coverage {
        let scores: Vec<f32> = hits.iter().map(|h| h.score).collect();
        classify(&scores, &self.config)
    }

    fn log_stage_failure(&self, stage: &str, error: &Error) {
        warn!(
            subsystem = "retrieval",
            component = "engine",
            op = stage,
            error = %error,
            error_class = %error.class(),
            "Retrieval stage failed, falling through"
        );
    }

    fn finish(
        &self,
        query: &str,
        hits: Vec<AtomHit>,
        coverage: Coverage,
        degraded: bool,
        start: Instant,
    ) -> RetrievalResult {
        let result = RetrievalResult {
            query: query.to_string(),
            hits,
            coverage,
            degraded,
            latency_ms: start.elapsed().as_millis() as u64,
        };
        info!(
            subsystem = "retrieval",
            component = "engine",
            op = "retrieve",
            query = query,
            hit_count = result.hits.len(),
            coverage = result.coverage.as_str(),
            confidence = result.confidence(),
            duration_ms = result.latency_ms,
            "Retrieval complete"
        );
        result
    }
}
