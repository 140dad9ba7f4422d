//! Core data models for faultline.
//!
//! These types are shared across all faultline crates and represent the
//! domain entities of the knowledge store, the ingestion pipeline, the
//! retrieval engine, and the routing orchestrator.

use chrono::{DateTime, Utc};
use pgvector::Vector;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::error::{Error, Result};

// =============================================================================
// KNOWLEDGE ATOMS
// =============================================================================

/// Subject-matter category of a knowledge atom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AtomCategory {
    Electrical,
    Mechanical,
    Hydraulic,
    Pneumatic,
    Controls,
    Software,
    Safety,
    General,
}

impl AtomCategory {
    /// Stable string form used in the database and in prompts.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Electrical => "electrical",
            Self::Mechanical => "mechanical",
            Self::Hydraulic => "hydraulic",
            Self::Pneumatic => "pneumatic",
            Self::Controls => "controls",
            Self::Software => "software",
            Self::Safety => "safety",
            Self::General => "general",
        }
    }

    /// Parse the database string form. Unknown values map to `General`.
    pub fn parse_or_general(s: &str) -> Self {
        match s {
            "electrical" => Self::Electrical,
            "mechanical" => Self::Mechanical,
            "hydraulic" => Self::Hydraulic,
            "pneumatic" => Self::Pneumatic,
            "controls" => Self::Controls,
            "software" => Self::Software,
            "safety" => Self::Safety,
            _ => Self::General,
        }
    }

    /// All categories, for registry validation and prompt construction.
    pub fn all() -> &'static [AtomCategory] {
        &[
            Self::Electrical,
            Self::Mechanical,
            Self::Hydraulic,
            Self::Pneumatic,
            Self::Controls,
            Self::Software,
            Self::Safety,
            Self::General,
        ]
    }
}

impl std::fmt::Display for AtomCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Reader difficulty level for an atom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Beginner,
    Intermediate,
    Advanced,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Beginner => "beginner",
            Self::Intermediate => "intermediate",
            Self::Advanced => "advanced",
        }
    }

    pub fn parse_or_intermediate(s: &str) -> Self {
        match s {
            "beginner" => Self::Beginner,
            "advanced" => Self::Advanced,
            _ => Self::Intermediate,
        }
    }
}

/// Safety annotation for an atom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetyLevel {
    Info,
    Caution,
    Warning,
    Danger,
}

impl SafetyLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Caution => "caution",
            Self::Warning => "warning",
            Self::Danger => "danger",
        }
    }

    pub fn parse_or_info(s: &str) -> Self {
        match s {
            "caution" => Self::Caution,
            "warning" => Self::Warning,
            "danger" => Self::Danger,
            _ => Self::Info,
        }
    }

    /// Warning and Danger content triggers multi-responder arbitration.
    pub fn is_critical(&self) -> bool {
        matches!(self, Self::Warning | Self::Danger)
    }
}

/// Citation binding an atom to the source it was distilled from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    /// Source URI or identifier the atom was ingested from.
    pub source_id: String,
    /// Page number within the source, when the source is paginated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<i32>,
    /// Character offset of the originating passage.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<i32>,
}

impl Citation {
    pub fn new(source_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            page: None,
            offset: None,
        }
    }

    pub fn with_offset(mut self, offset: i32) -> Self {
        self.offset = Some(offset);
        self
    }
}

/// A single, self-contained unit of knowledge with a citation and a
/// quality score.
///
/// Atoms are created by the ingestion pipeline and are read-only
/// afterward. The embedding is populated by the embedding stage and is
/// not serialized (it round-trips through the store's vector column).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeAtom {
    pub id: Uuid,
    pub title: String,
    pub summary: String,
    pub body: String,
    pub category: AtomCategory,
    pub difficulty: Difficulty,
    pub safety: SafetyLevel,
    pub keywords: Vec<String>,
    pub citation: Citation,
    /// Quality score in [0, 100] assigned by the validation stage.
    pub quality_score: f32,
    #[serde(skip)]
    pub embedding: Option<Vector>,
    pub created_at: DateTime<Utc>,
    pub version: i32,
}

impl KnowledgeAtom {
    /// Check the structural invariants an atom must satisfy before storage.
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(Error::Validation("atom title is empty".into()));
        }
        if self.body.trim().is_empty() {
            return Err(Error::Validation("atom body is empty".into()));
        }
        if self.citation.source_id.trim().is_empty() {
            return Err(Error::Validation("atom has no citation source".into()));
        }
        if !(0.0..=100.0).contains(&self.quality_score) {
            return Err(Error::Validation(format!(
                "quality score {} outside [0, 100]",
                self.quality_score
            )));
        }
        Ok(())
    }
}

/// Deterministic atom id derived from the source id and chunk index.
///
/// Re-running ingestion for the same source produces the same ids, which
/// makes the storage stage an idempotent upsert.
pub fn deterministic_atom_id(source_id: &str, chunk_index: usize) -> Uuid {
    Uuid::new_v5(
        &Uuid::NAMESPACE_OID,
        format!("{}#{}", source_id, chunk_index).as_bytes(),
    )
}

// =============================================================================
// SOURCE FINGERPRINTS
// =============================================================================

/// Ingestion status of a fingerprinted source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FingerprintStatus {
    Pending,
    Ingested,
    Failed,
}

impl FingerprintStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Ingested => "ingested",
            Self::Failed => "failed",
        }
    }

    pub fn parse_or_pending(s: &str) -> Self {
        match s {
            "ingested" => Self::Ingested,
            "failed" => Self::Failed,
            _ => Self::Pending,
        }
    }
}

/// Dedup ledger entry keyed by the content hash of normalized source bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceFingerprint {
    /// SHA-256 of the normalized source bytes, hex-encoded. Unique key.
    pub content_hash: String,
    pub source_uri: String,
    pub status: FingerprintStatus,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

// =============================================================================
// INGESTION PIPELINE RECORDS
// =============================================================================

/// The seven ordered stages of the ingestion pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestionStage {
    Acquisition,
    Extraction,
    Chunking,
    AtomGeneration,
    QualityValidation,
    Embedding,
    Storage,
}

impl IngestionStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Acquisition => "acquisition",
            Self::Extraction => "extraction",
            Self::Chunking => "chunking",
            Self::AtomGeneration => "atom_generation",
            Self::QualityValidation => "quality_validation",
            Self::Embedding => "embedding",
            Self::Storage => "storage",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "acquisition" => Some(Self::Acquisition),
            "extraction" => Some(Self::Extraction),
            "chunking" => Some(Self::Chunking),
            "atom_generation" => Some(Self::AtomGeneration),
            "quality_validation" => Some(Self::QualityValidation),
            "embedding" => Some(Self::Embedding),
            "storage" => Some(Self::Storage),
            _ => None,
        }
    }
}

impl std::fmt::Display for IngestionStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-attempt ingestion record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionLog {
    pub id: Uuid,
    pub source_id: String,
    pub stage: IngestionStage,
    /// Error taxonomy class when the attempt failed, `None` on success.
    pub error_class: Option<String>,
    pub error_message: Option<String>,
    pub retry_count: i32,
    pub duration_ms: i64,
    pub created_at: DateTime<Utc>,
}

/// A source whose stage retries were exhausted, parked for human review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetter {
    pub id: Uuid,
    pub source_id: String,
    pub stage: IngestionStage,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

/// An atom that failed quality validation, parked instead of stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewQueueEntry {
    pub id: Uuid,
    pub source_id: String,
    pub title: String,
    pub reason: String,
    pub quality_score: f32,
    /// Full candidate atom, preserved for the reviewer.
    pub payload: JsonValue,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// RETRIEVAL
// =============================================================================

/// Which fallback stage produced a hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalStage {
    Semantic,
    DomainFilter,
    Keyword,
}

impl RetrievalStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Semantic => "semantic",
            Self::DomainFilter => "domain_filter",
            Self::Keyword => "keyword",
        }
    }
}

/// Qualitative bucket describing how well retrieved atoms address a query.
///
/// Ordering is meaningful: `None < Thin < Adequate < Strong`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Coverage {
    None,
    Thin,
    Adequate,
    Strong,
}

impl Coverage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Thin => "thin",
            Self::Adequate => "adequate",
            Self::Strong => "strong",
        }
    }

    /// Retrieval stops falling back once this coverage is reached.
    pub fn is_adequate(&self) -> bool {
        *self >= Coverage::Adequate
    }
}

/// A single matched atom with its relevance score and producing stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AtomHit {
    pub atom_id: Uuid,
    pub score: f32,
    pub title: String,
    pub summary: String,
    pub category: AtomCategory,
    pub safety: SafetyLevel,
    pub citation: Citation,
    pub stage: RetrievalStage,
}

/// Result of a multi-stage retrieval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub query: String,
    pub hits: Vec<AtomHit>,
    pub coverage: Coverage,
    /// True when the store was unreachable and the result is a fallback.
    pub degraded: bool,
    pub latency_ms: u64,
}

impl RetrievalResult {
    /// Explicit empty result for total store unavailability. Callers decide
    /// fallback behavior; this never panics or raises.
    pub fn degraded(query: impl Into<String>, latency_ms: u64) -> Self {
        Self {
            query: query.into(),
            hits: Vec::new(),
            coverage: Coverage::None,
            degraded: true,
            latency_ms,
        }
    }

    /// Retrieval confidence scalar: the top hit's relevance, 0.0 when empty.
    pub fn confidence(&self) -> f32 {
        self.hits
            .iter()
            .map(|h| h.score)
            .fold(0.0_f32, f32::max)
            .clamp(0.0, 1.0)
    }

    /// Distinct categories among the hits; more than one marks a
    /// multi-domain query.
    pub fn spans_multiple_domains(&self) -> bool {
        let mut seen: Option<AtomCategory> = None;
        for hit in &self.hits {
            match seen {
                None => seen = Some(hit.category),
                Some(c) if c != hit.category => return true,
                Some(_) => {}
            }
        }
        false
    }

    /// True when any hit carries critical safety content.
    pub fn has_safety_critical(&self) -> bool {
        self.hits.iter().any(|h| h.safety.is_critical())
    }
}

// =============================================================================
// CONVERSATION STATE
// =============================================================================

/// A named, multi-step conversation sequence with persisted partial state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowType {
    /// Collect nickname → manufacturer → model → serial → location.
    EquipmentRegistration,
    /// Collect symptom → equipment → onset.
    FaultReport,
}

impl FlowType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EquipmentRegistration => "equipment_registration",
            Self::FaultReport => "fault_report",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "equipment_registration" => Some(Self::EquipmentRegistration),
            "fault_report" => Some(Self::FaultReport),
            _ => None,
        }
    }

    /// All flow types, for active-state lookups.
    pub fn all() -> &'static [FlowType] {
        &[Self::EquipmentRegistration, Self::FaultReport]
    }
}

/// Lifecycle status of a conversation state row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    Active,
    Completed,
    Cancelled,
}

impl ConversationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse_or_active(s: &str) -> Self {
        match s {
            "completed" => Self::Completed,
            "cancelled" => Self::Cancelled,
            _ => Self::Active,
        }
    }
}

/// Resumable multi-step dialogue state.
///
/// Invariant: exactly one `Active` state per (user, flow type). The
/// `version` column guards `advance` against lost updates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationState {
    pub id: Uuid,
    pub user_id: String,
    pub flow_type: FlowType,
    pub current_step: i32,
    /// Accumulated field map: step name → collected value.
    pub fields: JsonValue,
    pub status: ConversationStatus,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl ConversationState {
    /// True once every step of the flow has been collected.
    pub fn is_complete(&self) -> bool {
        self.status == ConversationStatus::Completed
    }

    /// True when the hard TTL has passed.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

// =============================================================================
// INTENT & ROUTING
// =============================================================================

/// Typed intent table for turn classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Troubleshoot,
    Maintenance,
    PartInquiry,
    SafetyIncident,
    EquipmentRegistration,
    FaultReport,
    Unknown,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Troubleshoot => "troubleshoot",
            Self::Maintenance => "maintenance",
            Self::PartInquiry => "part_inquiry",
            Self::SafetyIncident => "safety_incident",
            Self::EquipmentRegistration => "equipment_registration",
            Self::FaultReport => "fault_report",
            Self::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "troubleshoot" => Some(Self::Troubleshoot),
            "maintenance" => Some(Self::Maintenance),
            "part_inquiry" => Some(Self::PartInquiry),
            "safety_incident" => Some(Self::SafetyIncident),
            "equipment_registration" => Some(Self::EquipmentRegistration),
            "fault_report" => Some(Self::FaultReport),
            "unknown" => Some(Self::Unknown),
            _ => None,
        }
    }

    /// The multi-step flow this intent starts, if any.
    pub fn flow(&self) -> Option<FlowType> {
        match self {
            Self::EquipmentRegistration => Some(FlowType::EquipmentRegistration),
            Self::FaultReport => Some(FlowType::FaultReport),
            _ => None,
        }
    }
}

/// Whether an intent came from the keyword table or the model fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentSource {
    Keyword,
    Model,
}

/// The orchestrator's decision for handling a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    /// Route A: answer directly from top atoms.
    DirectAnswer,
    /// Route B: ask a clarifying question, persist partial state.
    Clarify,
    /// Route C: escalate / flag for human review.
    Escalate,
    /// Route D: fan out to multiple responders and arbitrate.
    Collaborate,
}

impl Route {
    /// Single-letter form used in traces and dashboards.
    pub fn letter(&self) -> char {
        match self {
            Self::DirectAnswer => 'A',
            Self::Clarify => 'B',
            Self::Escalate => 'C',
            Self::Collaborate => 'D',
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DirectAnswer => "direct_answer",
            Self::Clarify => "clarify",
            Self::Escalate => "escalate",
            Self::Collaborate => "collaborate",
        }
    }
}

/// Routed decision for one turn with its full reasoning trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteDecision {
    pub intent: Intent,
    pub intent_source: IntentSource,
    pub confidence: f32,
    pub coverage: Coverage,
    pub route: Route,
    /// Ordered human-readable reasoning steps, for observability.
    pub trace: Vec<String>,
}

// =============================================================================
// OPERATIONAL SNAPSHOTS
// =============================================================================

/// Structured ingestion counters for external dashboards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionStatus {
    pub atoms_ingested: i64,
    pub fingerprints_pending: i64,
    pub dead_letters: i64,
    pub review_queue: i64,
    pub store_reachable: bool,
}

/// Structured retrieval health for external dashboards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalHealth {
    pub store_reachable: bool,
    pub inference_reachable: bool,
    pub embedding_dimension: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn atom() -> KnowledgeAtom {
        KnowledgeAtom {
            id: Uuid::new_v4(),
            title: "Motor overload fault".into(),
            summary: "Thermal overload trips on sustained overcurrent.".into(),
            body: "Reset the overload relay after the motor cools.".into(),
            category: AtomCategory::Electrical,
            difficulty: Difficulty::Intermediate,
            safety: SafetyLevel::Caution,
            keywords: vec!["motor".into(), "overload".into()],
            citation: Citation::new("manual://acme/motors.pdf"),
            quality_score: 82.0,
            embedding: None,
            created_at: Utc::now(),
            version: 1,
        }
    }

    #[test]
    fn test_atom_validate_ok() {
        assert!(atom().validate().is_ok());
    }

    #[test]
    fn test_atom_validate_empty_title() {
        let mut a = atom();
        a.title = "  ".into();
        assert!(matches!(a.validate(), Err(Error::Validation(_))));
    }

    #[test]
    fn test_atom_validate_missing_citation() {
        let mut a = atom();
        a.citation.source_id = String::new();
        assert!(matches!(a.validate(), Err(Error::Validation(_))));
    }

    #[test]
    fn test_atom_validate_quality_range() {
        let mut a = atom();
        a.quality_score = 140.0;
        assert!(a.validate().is_err());
        a.quality_score = -1.0;
        assert!(a.validate().is_err());
    }

    #[test]
    fn test_deterministic_atom_id_is_stable() {
        let a = deterministic_atom_id("manual://acme/motors.pdf", 0);
        let b = deterministic_atom_id("manual://acme/motors.pdf", 0);
        let c = deterministic_atom_id("manual://acme/motors.pdf", 1);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_coverage_ordering() {
        assert!(Coverage::None < Coverage::Thin);
        assert!(Coverage::Thin < Coverage::Adequate);
        assert!(Coverage::Adequate < Coverage::Strong);
        assert!(!Coverage::Thin.is_adequate());
        assert!(Coverage::Adequate.is_adequate());
        assert!(Coverage::Strong.is_adequate());
    }

    #[test]
    fn test_retrieval_confidence_empty() {
        let r = RetrievalResult::degraded("motor won't start", 12);
        assert_eq!(r.confidence(), 0.0);
        assert!(r.degraded);
        assert_eq!(r.coverage, Coverage::None);
    }

    #[test]
    fn test_retrieval_confidence_is_top_score() {
        let mut r = RetrievalResult::degraded("q", 0);
        r.degraded = false;
        for score in [0.4, 0.9, 0.7] {
            r.hits.push(AtomHit {
                atom_id: Uuid::new_v4(),
                score,
                title: "t".into(),
                summary: "s".into(),
                category: AtomCategory::General,
                safety: SafetyLevel::Info,
                citation: Citation::new("src"),
                stage: RetrievalStage::Semantic,
            });
        }
        assert!((r.confidence() - 0.9).abs() < f32::EPSILON);
    }

    #[test]
    fn test_spans_multiple_domains() {
        let mut r = RetrievalResult::degraded("q", 0);
        let push = |r: &mut RetrievalResult, category| {
            r.hits.push(AtomHit {
                atom_id: Uuid::new_v4(),
                score: 0.8,
                title: "t".into(),
                summary: "s".into(),
                category,
                safety: SafetyLevel::Info,
                citation: Citation::new("src"),
                stage: RetrievalStage::Semantic,
            })
        };
        push(&mut r, AtomCategory::Electrical);
        push(&mut r, AtomCategory::Electrical);
        assert!(!r.spans_multiple_domains());
        push(&mut r, AtomCategory::Hydraulic);
        assert!(r.spans_multiple_domains());
    }

    #[test]
    fn test_safety_level_critical() {
        assert!(!SafetyLevel::Info.is_critical());
        assert!(!SafetyLevel::Caution.is_critical());
        assert!(SafetyLevel::Warning.is_critical());
        assert!(SafetyLevel::Danger.is_critical());
    }

    #[test]
    fn test_route_letters() {
        assert_eq!(Route::DirectAnswer.letter(), 'A');
        assert_eq!(Route::Clarify.letter(), 'B');
        assert_eq!(Route::Escalate.letter(), 'C');
        assert_eq!(Route::Collaborate.letter(), 'D');
    }

    #[test]
    fn test_intent_flow_mapping() {
        assert_eq!(
            Intent::EquipmentRegistration.flow(),
            Some(FlowType::EquipmentRegistration)
        );
        assert_eq!(Intent::FaultReport.flow(), Some(FlowType::FaultReport));
        assert_eq!(Intent::Troubleshoot.flow(), None);
    }

    #[test]
    fn test_stage_round_trip() {
        for stage in [
            IngestionStage::Acquisition,
            IngestionStage::Extraction,
            IngestionStage::Chunking,
            IngestionStage::AtomGeneration,
            IngestionStage::QualityValidation,
            IngestionStage::Embedding,
            IngestionStage::Storage,
        ] {
            assert_eq!(IngestionStage::parse(stage.as_str()), Some(stage));
        }
        assert_eq!(IngestionStage::parse("unknown"), None);
    }

    #[test]
    fn test_conversation_expiry_boundary() {
        let now = Utc::now();
        let state = ConversationState {
            id: Uuid::new_v4(),
            user_id: "u1".into(),
            flow_type: FlowType::EquipmentRegistration,
            current_step: 0,
            fields: json!({}),
            status: ConversationStatus::Active,
            version: 1,
            created_at: now,
            updated_at: now,
            expires_at: now + chrono::Duration::hours(24),
        };
        assert!(!state.is_expired(now + chrono::Duration::hours(23)));
        assert!(state.is_expired(now + chrono::Duration::hours(25)));
    }

    #[test]
    fn test_fingerprint_status_round_trip() {
        for s in [
            FingerprintStatus::Pending,
            FingerprintStatus::Ingested,
            FingerprintStatus::Failed,
        ] {
            assert_eq!(FingerprintStatus::parse_or_pending(s.as_str()), s);
        }
    }

    #[test]
    fn test_atom_serde_skips_embedding() {
        let mut a = atom();
        a.embedding = Some(Vector::from(vec![0.1, 0.2]));
        let json = serde_json::to_string(&a).unwrap();
        assert!(!json.contains("embedding"));
        let back: KnowledgeAtom = serde_json::from_str(&json).unwrap();
        assert!(back.embedding.is_none());
        assert_eq!(back.title, a.title);
    }
}
