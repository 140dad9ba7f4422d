//! Core traits for faultline abstractions.
//!
//! These traits define the interfaces that concrete implementations must
//! satisfy, enabling pluggable backends and testability. Postgres
//! implementations live in `faultline-db`; in-memory fixtures for tests
//! live alongside them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::models::*;

// =============================================================================
// KNOWLEDGE STORE TRAITS
// =============================================================================

/// Repository for knowledge atoms and their vector/lexical indexes.
#[async_trait]
pub trait AtomRepository: Send + Sync {
    /// Upsert an atom keyed by its deterministic id. Repeated upserts of
    /// the same atom leave the store unchanged apart from `version`.
    ///
    /// Rejects atoms whose embedding dimensionality differs from the
    /// store's fixed dimension.
    async fn upsert(&self, atom: &KnowledgeAtom) -> Result<Uuid>;

    /// Fetch a full atom by id.
    async fn fetch(&self, id: Uuid) -> Result<KnowledgeAtom>;

    /// Nearest-neighbor search by cosine similarity, optionally restricted
    /// to a category.
    async fn find_similar(
        &self,
        query_vec: &pgvector::Vector,
        limit: i64,
        category: Option<AtomCategory>,
    ) -> Result<Vec<AtomHit>>;

    /// Lexical match over title, summary, body, and keywords.
    async fn keyword_search(&self, query: &str, limit: i64) -> Result<Vec<AtomHit>>;

    /// Total stored atoms.
    async fn count(&self) -> Result<i64>;

    /// Check store reachability.
    async fn health_check(&self) -> Result<bool>;
}

/// Repository for the source dedup ledger.
#[async_trait]
pub trait FingerprintRepository: Send + Sync {
    /// Look up a fingerprint by content hash.
    async fn lookup(&self, content_hash: &str) -> Result<Option<SourceFingerprint>>;

    /// Record a first-seen source as pending, or refresh `last_seen` for a
    /// known hash. Returns the current row either way.
    async fn record_pending(
        &self,
        content_hash: &str,
        source_uri: &str,
    ) -> Result<SourceFingerprint>;

    /// Transition a fingerprint to a terminal (or retried-pending) status.
    async fn set_status(&self, content_hash: &str, status: FingerprintStatus) -> Result<()>;

    /// Count fingerprints in the given status.
    async fn count_status(&self, status: FingerprintStatus) -> Result<i64>;
}

/// Repository for per-attempt ingestion records and dead letters.
#[async_trait]
pub trait IngestionLogRepository: Send + Sync {
    /// Record one stage attempt (success or failure).
    async fn record_attempt(
        &self,
        source_id: &str,
        stage: IngestionStage,
        error_class: Option<&str>,
        error_message: Option<&str>,
        retry_count: i32,
        duration_ms: i64,
    ) -> Result<Uuid>;

    /// Park a source whose retries are exhausted. Never silently drops.
    async fn dead_letter(
        &self,
        source_id: &str,
        stage: IngestionStage,
        reason: &str,
    ) -> Result<Uuid>;

    /// Count parked sources.
    async fn dead_letter_count(&self) -> Result<i64>;

    /// List recent dead letters for tooling.
    async fn list_dead_letters(&self, limit: i64) -> Result<Vec<DeadLetter>>;
}

/// Repository for atoms that failed quality validation.
#[async_trait]
pub trait ReviewQueueRepository: Send + Sync {
    /// Queue a rejected atom for human review.
    async fn push(&self, entry: &ReviewQueueEntry) -> Result<Uuid>;

    /// Count queued entries.
    async fn count(&self) -> Result<i64>;

    /// List recent entries for tooling.
    async fn list(&self, limit: i64) -> Result<Vec<ReviewQueueEntry>>;
}

// =============================================================================
// CONVERSATION STATE TRAITS
// =============================================================================

/// Repository for resumable conversation state.
///
/// Mutation of a single state is serialized through `try_advance`'s
/// version check; concurrent writers never produce a lost update.
#[async_trait]
pub trait ConversationRepository: Send + Sync {
    /// Find the active state for (user, flow type), if any.
    async fn find_active(&self, user_id: &str, flow_type: FlowType)
        -> Result<Option<ConversationState>>;

    /// Fetch a state by id.
    async fn fetch(&self, id: Uuid) -> Result<ConversationState>;

    /// Insert a fresh state. Fails if an active state for the same
    /// (user, flow type) already exists.
    async fn insert(&self, state: &ConversationState) -> Result<()>;

    /// Persist an advanced state if and only if the stored row still has
    /// `expected_version`. Returns `true` on success, `false` when another
    /// writer won the race (the caller re-reads).
    async fn try_advance(
        &self,
        state: &ConversationState,
        expected_version: i32,
    ) -> Result<bool>;

    /// Mark a state cancelled (superseded by a restarted flow).
    async fn cancel(&self, id: Uuid) -> Result<()>;

    /// Delete all states whose TTL has passed. Returns the number removed.
    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64>;
}

// =============================================================================
// INFERENCE TRAITS
// =============================================================================

/// Backend for generating text embeddings.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Generate embeddings for the given texts, one vector per input.
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<pgvector::Vector>>;

    /// The fixed dimension of produced vectors.
    fn dimension(&self) -> usize;

    /// The model name being used.
    fn model_name(&self) -> &str;
}

/// Backend for text completion (LLM).
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Complete a prompt with system context.
    async fn complete(&self, system: &str, prompt: &str) -> Result<String>;

    /// Complete a prompt and require a JSON object response.
    async fn complete_json(&self, system: &str, prompt: &str) -> Result<String>;

    /// The model name being used.
    fn model_name(&self) -> &str;
}

/// Combined inference backend supporting both embedding and completion.
#[async_trait]
pub trait InferenceBackend: EmbeddingBackend + CompletionBackend {
    /// Check if the backend is available and responding.
    async fn health_check(&self) -> Result<bool>;
}

// =============================================================================
// RESPONDER BOUNDARY
// =============================================================================

/// What a responder produced for a routed turn.
#[derive(Debug, Clone)]
pub struct ResponderReply {
    /// Responder identifier, for arbitration traces.
    pub responder: String,
    /// Prose answer.
    pub text: String,
    /// Atom ids cited by the answer.
    pub citations: Vec<Uuid>,
}

/// A pluggable persona that consumes a route decision and emits prose with
/// citations. Concrete personas live outside the core; the orchestrator
/// only fans out and merges through this interface.
#[async_trait]
pub trait Responder: Send + Sync {
    /// Responder identifier.
    fn name(&self) -> &str;

    /// Produce a reply for the routed turn.
    async fn respond(&self, decision: &RouteDecision, hits: &[AtomHit]) -> Result<ResponderReply>;
}
