//! Structured logging schema and field name constants for faultline.
//!
//! All crates use these constants for consistent structured logging fields
//! so log aggregation tools can query by standardized field names across
//! every subsystem.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, requires operator attention |
//! | WARN  | Recoverable issue, automatic fallback applied |
//! | INFO  | Lifecycle events (startup, shutdown), operation completions |
//! | DEBUG | Decision points, intermediate values, config choices |
//! | TRACE | Per-item iteration, high-volume data (hits, chunks) |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Subsystem originating the log event.
/// Values: "ingest", "retrieval", "routing", "conversation", "db", "inference"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "pipeline", "worker", "coverage", "ollama", "pool"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "ingest_source", "retrieve", "handle_turn", "advance"
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Source URI or id being ingested.
pub const SOURCE_ID: &str = "source_id";

/// Knowledge atom UUID being operated on.
pub const ATOM_ID: &str = "atom_id";

/// Conversation UUID.
pub const CONVERSATION_ID: &str = "conversation_id";

/// User identifier for a turn.
pub const USER_ID: &str = "user_id";

/// Ingestion stage name.
pub const STAGE: &str = "stage";

/// Query text for a retrieval or turn.
pub const QUERY: &str = "query";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of hits returned by a retrieval stage.
pub const HIT_COUNT: &str = "hit_count";

/// Number of chunks produced for a source.
pub const CHUNK_COUNT: &str = "chunk_count";

/// Number of atoms stored for a source.
pub const ATOM_COUNT: &str = "atom_count";

/// Retry attempt number for a stage.
pub const ATTEMPT: &str = "attempt";

// ─── Decision fields ───────────────────────────────────────────────────────

/// Coverage classification ("none", "thin", "adequate", "strong").
pub const COVERAGE: &str = "coverage";

/// Retrieval confidence scalar.
pub const CONFIDENCE: &str = "confidence";

/// Chosen route letter ("A".."D").
pub const ROUTE: &str = "route";

/// Classified intent name.
pub const INTENT: &str = "intent";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Boolean success/failure indicator.
pub const SUCCESS: &str = "success";

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";

/// Error taxonomy class ("transient_io", "validation_failure", ...).
pub const ERROR_CLASS: &str = "error_class";
