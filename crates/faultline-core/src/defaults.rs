//! Centralized default constants for the faultline system.
//!
//! **This module is the single source of truth** for all shared default
//! values. All crates should reference these constants instead of defining
//! their own magic numbers.
//!
//! Organized by domain area. When adding new constants, place them in the
//! appropriate section and document the rationale for the chosen value.

// =============================================================================
// CHUNKING
// =============================================================================

/// Target maximum words per passage chunk.
pub const CHUNK_MAX_WORDS: usize = 400;

/// Target minimum words per passage chunk (smaller chunks are merged).
pub const CHUNK_MIN_WORDS: usize = 200;

// =============================================================================
// EMBEDDING
// =============================================================================

/// Default embedding model name (Ollama).
pub const EMBED_MODEL: &str = "nomic-embed-text";

/// Default embedding vector dimension for nomic-embed-text.
///
/// Every atom in one store shares this dimensionality; upserts with a
/// different dimension are rejected.
pub const EMBED_DIMENSION: usize = 768;

// =============================================================================
// INFERENCE
// =============================================================================

/// Default Ollama base URL.
pub const OLLAMA_URL: &str = "http://127.0.0.1:11434";

/// Default completion model name (Ollama).
pub const COMPLETION_MODEL: &str = "gpt-oss:20b";

/// Timeout for embedding requests in seconds.
pub const EMBED_TIMEOUT_SECS: u64 = 30;

/// Timeout for completion requests in seconds.
pub const COMPLETION_TIMEOUT_SECS: u64 = 120;

/// Retry budget for external inference calls.
pub const INFERENCE_MAX_RETRIES: u32 = 2;

// =============================================================================
// INGESTION
// =============================================================================

/// Default maximum retry count for a failed ingestion stage.
pub const STAGE_MAX_RETRIES: u32 = 3;

/// Base delay for exponential backoff between stage retries (milliseconds).
pub const STAGE_BACKOFF_BASE_MS: u64 = 250;

/// Default maximum concurrently processed sources.
///
/// The bound exists to protect the completion/embedding services from
/// rate-limit exhaustion, not to tune local CPU usage.
pub const INGEST_MAX_CONCURRENT_SOURCES: usize = 4;

/// Minimum quality score for an atom to enter the store.
///
/// Atoms scoring below this are routed to the review queue.
pub const QUALITY_MIN_SCORE: f32 = 60.0;

/// Worker event broadcast channel capacity.
pub const EVENT_BUS_CAPACITY: usize = 256;

// =============================================================================
// RETRIEVAL
// =============================================================================

/// Default top-K candidates per retrieval stage.
pub const RETRIEVAL_TOP_K: i64 = 8;

/// Top score must clear this for "strong" coverage.
pub const COVERAGE_STRONG_TOP: f32 = 0.75;

/// Mid threshold a candidate must clear to count toward "strong" coverage.
pub const COVERAGE_MID: f32 = 0.55;

/// Minimum candidates over [`COVERAGE_MID`] for "strong" coverage.
pub const COVERAGE_STRONG_MIN_CANDIDATES: usize = 3;

/// Top score must clear this for "adequate" coverage.
pub const COVERAGE_ADEQUATE_TOP: f32 = 0.55;

/// Top score must clear this for "thin" coverage; below it is "none".
pub const COVERAGE_THIN_TOP: f32 = 0.35;

/// Per-stage retrieval timeout in milliseconds.
pub const RETRIEVAL_STAGE_TIMEOUT_MS: u64 = 2_000;

// =============================================================================
// ROUTING
// =============================================================================

/// Confidence at or above this routes to a direct answer (Route A).
pub const ROUTE_DIRECT_MIN_CONFIDENCE: f32 = 0.8;

/// Confidence at or above this (and below the direct threshold) routes to a
/// clarifying question (Route B); below it escalates (Route C).
pub const ROUTE_CLARIFY_MIN_CONFIDENCE: f32 = 0.5;

// =============================================================================
// CONVERSATION
// =============================================================================

/// Hard TTL for conversation state in seconds (24 hours).
pub const CONVERSATION_TTL_SECS: i64 = 24 * 60 * 60;

// =============================================================================
// DATABASE
// =============================================================================

/// Default maximum number of connections in the pool.
pub const POOL_MAX_CONNECTIONS: u32 = 10;

/// Default pool acquire timeout in seconds.
pub const POOL_ACQUIRE_TIMEOUT_SECS: u64 = 5;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_window_is_ordered() {
        assert!(CHUNK_MIN_WORDS < CHUNK_MAX_WORDS);
    }

    #[test]
    fn coverage_thresholds_are_ordered() {
        assert!(COVERAGE_THIN_TOP < COVERAGE_ADEQUATE_TOP);
        assert!(COVERAGE_ADEQUATE_TOP < COVERAGE_STRONG_TOP);
        assert!(COVERAGE_MID < COVERAGE_STRONG_TOP);
    }

    #[test]
    fn routing_thresholds_are_ordered() {
        assert!(ROUTE_CLARIFY_MIN_CONFIDENCE < ROUTE_DIRECT_MIN_CONFIDENCE);
    }
}
