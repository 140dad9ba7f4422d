//! In-memory repository implementations for tests.
//!
//! Always compiled so integration tests across the workspace can exercise
//! pipeline, retrieval, and routing properties without a Postgres instance.
//! The cosine helper here exists only for this fixture; production
//! nearest-neighbor search runs inside pgvector.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pgvector::Vector;
use uuid::Uuid;

use faultline_core::{
    defaults, AtomCategory, AtomHit, AtomRepository, ConversationRepository, ConversationState,
    DeadLetter, Error, FingerprintRepository, FingerprintStatus, FlowType, IngestionLogRepository,
    IngestionStage, KnowledgeAtom, Result, RetrievalStage, ReviewQueueEntry,
    ReviewQueueRepository, SourceFingerprint,
};

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na * nb)
    }
}

/// In-memory [`AtomRepository`] with a switchable "store down" mode.
pub struct MemoryAtomRepository {
    atoms: Mutex<HashMap<Uuid, KnowledgeAtom>>,
    dimension: usize,
    unavailable: AtomicBool,
}

impl MemoryAtomRepository {
    pub fn new() -> Self {
        Self::with_dimension(defaults::EMBED_DIMENSION)
    }

    pub fn with_dimension(dimension: usize) -> Self {
        Self {
            atoms: Mutex::new(HashMap::new()),
            dimension,
            unavailable: AtomicBool::new(false),
        }
    }

    /// Simulate total store unavailability.
    pub fn set_unavailable(&self, down: bool) {
        self.unavailable.store(down, Ordering::SeqCst);
    }

    fn check_up(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(Error::Search("store unreachable".into()))
        } else {
            Ok(())
        }
    }

    /// Snapshot of all stored atoms, for assertions.
    pub fn all(&self) -> Vec<KnowledgeAtom> {
        self.atoms.lock().unwrap().values().cloned().collect()
    }

    fn hit(atom: &KnowledgeAtom, score: f32, stage: RetrievalStage) -> AtomHit {
        AtomHit {
            atom_id: atom.id,
            score,
            title: atom.title.clone(),
            summary: atom.summary.clone(),
            category: atom.category,
            safety: atom.safety,
            citation: atom.citation.clone(),
            stage,
        }
    }
}

impl Default for MemoryAtomRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AtomRepository for MemoryAtomRepository {
    async fn upsert(&self, atom: &KnowledgeAtom) -> Result<Uuid> {
        self.check_up()?;
        atom.validate()?;
        let embedding = atom
            .embedding
            .as_ref()
            .ok_or_else(|| Error::Validation(format!("atom {} has no embedding", atom.id)))?;
        if embedding.as_slice().len() != self.dimension {
            return Err(Error::Validation(format!(
                "embedding dimension {} does not match store dimension {}",
                embedding.as_slice().len(),
                self.dimension
            )));
        }
        let mut atoms = self.atoms.lock().unwrap();
        let version = atoms.get(&atom.id).map(|a| a.version + 1).unwrap_or(1);
        let mut stored = atom.clone();
        stored.version = version;
        atoms.insert(atom.id, stored);
        Ok(atom.id)
    }

    async fn fetch(&self, id: Uuid) -> Result<KnowledgeAtom> {
        self.check_up()?;
        self.atoms
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or(Error::AtomNotFound(id))
    }

    async fn find_similar(
        &self,
        query_vec: &Vector,
        limit: i64,
        category: Option<AtomCategory>,
    ) -> Result<Vec<AtomHit>> {
        self.check_up()?;
        let stage = if category.is_some() {
            RetrievalStage::DomainFilter
        } else {
            RetrievalStage::Semantic
        };
        let atoms = self.atoms.lock().unwrap();
        let mut hits: Vec<AtomHit> = atoms
            .values()
            .filter(|a| category.map_or(true, |c| a.category == c))
            .filter_map(|a| {
                a.embedding.as_ref().map(|e| {
                    Self::hit(a, cosine(query_vec.as_slice(), e.as_slice()), stage)
                })
            })
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(limit as usize);
        Ok(hits)
    }

    async fn keyword_search(&self, query: &str, limit: i64) -> Result<Vec<AtomHit>> {
        self.check_up()?;
        let terms: Vec<String> = query
            .split_whitespace()
            .map(|t| t.to_lowercase())
            .filter(|t| t.len() > 2)
            .collect();
        if terms.is_empty() {
            return Ok(vec![]);
        }
        let atoms = self.atoms.lock().unwrap();
        let mut hits: Vec<AtomHit> = atoms
            .values()
            .filter_map(|a| {
                let haystack = format!(
                    "{} {} {} {}",
                    a.title,
                    a.summary,
                    a.body,
                    a.keywords.join(" ")
                )
                .to_lowercase();
                let matched = terms.iter().filter(|t| haystack.contains(t.as_str())).count();
                if matched == 0 {
                    None
                } else {
                    let score = matched as f32 / terms.len() as f32;
                    Some(Self::hit(a, score, RetrievalStage::Keyword))
                }
            })
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(limit as usize);
        Ok(hits)
    }

    async fn count(&self) -> Result<i64> {
        self.check_up()?;
        Ok(self.atoms.lock().unwrap().len() as i64)
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(!self.unavailable.load(Ordering::SeqCst))
    }
}

/// In-memory [`FingerprintRepository`].
#[derive(Default)]
pub struct MemoryFingerprintRepository {
    rows: Mutex<HashMap<String, SourceFingerprint>>,
}

impl MemoryFingerprintRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FingerprintRepository for MemoryFingerprintRepository {
    async fn lookup(&self, content_hash: &str) -> Result<Option<SourceFingerprint>> {
        Ok(self.rows.lock().unwrap().get(content_hash).cloned())
    }

    async fn record_pending(
        &self,
        content_hash: &str,
        source_uri: &str,
    ) -> Result<SourceFingerprint> {
        let now = Utc::now();
        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .entry(content_hash.to_string())
            .and_modify(|r| r.last_seen = now)
            .or_insert_with(|| SourceFingerprint {
                content_hash: content_hash.to_string(),
                source_uri: source_uri.to_string(),
                status: FingerprintStatus::Pending,
                first_seen: now,
                last_seen: now,
            });
        Ok(row.clone())
    }

    async fn set_status(&self, content_hash: &str, status: FingerprintStatus) -> Result<()> {
        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .get_mut(content_hash)
            .ok_or_else(|| Error::NotFound(format!("fingerprint {} not found", content_hash)))?;
        row.status = status;
        row.last_seen = Utc::now();
        Ok(())
    }

    async fn count_status(&self, status: FingerprintStatus) -> Result<i64> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.status == status)
            .count() as i64)
    }
}

/// In-memory [`IngestionLogRepository`] capturing attempts and dead letters.
#[derive(Default)]
pub struct MemoryIngestionLogRepository {
    attempts: Mutex<Vec<(String, IngestionStage, Option<String>, i32)>>,
    dead: Mutex<Vec<DeadLetter>>,
}

impl MemoryIngestionLogRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorded attempts for a stage, for retry-cap assertions.
    pub fn attempts_for(&self, stage: IngestionStage) -> usize {
        self.attempts
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, s, _, _)| *s == stage)
            .count()
    }

    /// All dead letters recorded so far.
    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.dead.lock().unwrap().clone()
    }
}

#[async_trait]
impl IngestionLogRepository for MemoryIngestionLogRepository {
    async fn record_attempt(
        &self,
        source_id: &str,
        stage: IngestionStage,
        error_class: Option<&str>,
        _error_message: Option<&str>,
        retry_count: i32,
        _duration_ms: i64,
    ) -> Result<Uuid> {
        self.attempts.lock().unwrap().push((
            source_id.to_string(),
            stage,
            error_class.map(String::from),
            retry_count,
        ));
        Ok(Uuid::new_v4())
    }

    async fn dead_letter(
        &self,
        source_id: &str,
        stage: IngestionStage,
        reason: &str,
    ) -> Result<Uuid> {
        let id = Uuid::new_v4();
        self.dead.lock().unwrap().push(DeadLetter {
            id,
            source_id: source_id.to_string(),
            stage,
            reason: reason.to_string(),
            created_at: Utc::now(),
        });
        Ok(id)
    }

    async fn dead_letter_count(&self) -> Result<i64> {
        Ok(self.dead.lock().unwrap().len() as i64)
    }

    async fn list_dead_letters(&self, limit: i64) -> Result<Vec<DeadLetter>> {
        let dead = self.dead.lock().unwrap();
        Ok(dead.iter().rev().take(limit as usize).cloned().collect())
    }
}

/// In-memory [`ReviewQueueRepository`].
#[derive(Default)]
pub struct MemoryReviewQueueRepository {
    entries: Mutex<Vec<ReviewQueueEntry>>,
}

impl MemoryReviewQueueRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReviewQueueRepository for MemoryReviewQueueRepository {
    async fn push(&self, entry: &ReviewQueueEntry) -> Result<Uuid> {
        self.entries.lock().unwrap().push(entry.clone());
        Ok(entry.id)
    }

    async fn count(&self) -> Result<i64> {
        Ok(self.entries.lock().unwrap().len() as i64)
    }

    async fn list(&self, limit: i64) -> Result<Vec<ReviewQueueEntry>> {
        let entries = self.entries.lock().unwrap();
        Ok(entries.iter().rev().take(limit as usize).cloned().collect())
    }
}

/// In-memory [`ConversationRepository`] with the same version-guarded
/// advance semantics as the Postgres implementation.
#[derive(Default)]
pub struct MemoryConversationRepository {
    rows: Mutex<HashMap<Uuid, ConversationState>>,
}

impl MemoryConversationRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationRepository for MemoryConversationRepository {
    async fn find_active(
        &self,
        user_id: &str,
        flow_type: FlowType,
    ) -> Result<Option<ConversationState>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .values()
            .find(|s| {
                s.user_id == user_id
                    && s.flow_type == flow_type
                    && s.status == faultline_core::ConversationStatus::Active
            })
            .cloned())
    }

    async fn fetch(&self, id: Uuid) -> Result<ConversationState> {
        self.rows
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or(Error::ConversationNotFound(id))
    }

    async fn insert(&self, state: &ConversationState) -> Result<()> {
        let mut rows = self.rows.lock().unwrap();
        let duplicate = rows.values().any(|s| {
            s.user_id == state.user_id
                && s.flow_type == state.flow_type
                && s.status == faultline_core::ConversationStatus::Active
        });
        if duplicate {
            return Err(Error::Validation(format!(
                "active {} flow already exists for user {}",
                state.flow_type.as_str(),
                state.user_id
            )));
        }
        rows.insert(state.id, state.clone());
        Ok(())
    }

    async fn try_advance(
        &self,
        state: &ConversationState,
        expected_version: i32,
    ) -> Result<bool> {
        let mut rows = self.rows.lock().unwrap();
        match rows.get_mut(&state.id) {
            Some(row)
                if row.version == expected_version
                    && row.status == faultline_core::ConversationStatus::Active =>
            {
                let mut next = state.clone();
                next.version = row.version + 1;
                *row = next;
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Ok(false),
        }
    }

    async fn cancel(&self, id: Uuid) -> Result<()> {
        if let Some(row) = self.rows.lock().unwrap().get_mut(&id) {
            if row.status == faultline_core::ConversationStatus::Active {
                row.status = faultline_core::ConversationStatus::Cancelled;
            }
        }
        Ok(())
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|_, s| s.expires_at > now);
        Ok((before - rows.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use faultline_core::{Citation, Difficulty, SafetyLevel};

    fn atom(dim: usize, seed: f32) -> KnowledgeAtom {
        KnowledgeAtom {
            id: Uuid::new_v4(),
            title: "Motor overload fault".into(),
            summary: "Overload relay trips on overcurrent".into(),
            body: "Reset after cooldown.".into(),
            category: AtomCategory::Electrical,
            difficulty: Difficulty::Intermediate,
            safety: SafetyLevel::Caution,
            keywords: vec!["motor".into()],
            citation: Citation::new("src-1"),
            quality_score: 80.0,
            embedding: Some(Vector::from(
                (0..dim).map(|i| seed + i as f32 * 0.01).collect::<Vec<_>>(),
            )),
            created_at: Utc::now(),
            version: 1,
        }
    }

    #[tokio::test]
    async fn test_upsert_rejects_wrong_dimension() {
        let repo = MemoryAtomRepository::with_dimension(8);
        let bad = atom(4, 0.1);
        assert!(matches!(
            repo.upsert(&bad).await,
            Err(Error::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_upsert_same_id_bumps_version_not_count() {
        let repo = MemoryAtomRepository::with_dimension(8);
        let a = atom(8, 0.1);
        repo.upsert(&a).await.unwrap();
        repo.upsert(&a).await.unwrap();
        assert_eq!(repo.count().await.unwrap(), 1);
        assert_eq!(repo.fetch(a.id).await.unwrap().version, 2);
    }

    #[tokio::test]
    async fn test_unavailable_store_errors() {
        let repo = MemoryAtomRepository::with_dimension(8);
        repo.set_unavailable(true);
        assert!(repo.count().await.is_err());
        assert!(!repo.health_check().await.unwrap());
    }

    #[tokio::test]
    async fn test_keyword_search_scores_by_term_fraction() {
        let repo = MemoryAtomRepository::with_dimension(8);
        repo.upsert(&atom(8, 0.1)).await.unwrap();
        let hits = repo.keyword_search("motor overload", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert!((hits[0].score - 1.0).abs() < f32::EPSILON);
        assert_eq!(hits[0].stage, RetrievalStage::Keyword);

        let none = repo.keyword_search("hydraulic pump seal", 10).await.unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_fingerprint_record_pending_is_idempotent() {
        let repo = MemoryFingerprintRepository::new();
        let first = repo.record_pending("abc", "uri").await.unwrap();
        let second = repo.record_pending("abc", "uri").await.unwrap();
        assert_eq!(first.content_hash, second.content_hash);
        assert_eq!(first.first_seen, second.first_seen);
        assert_eq!(
            repo.count_status(FingerprintStatus::Pending).await.unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_conversation_try_advance_version_guard() {
        let repo = MemoryConversationRepository::new();
        let now = Utc::now();
        let state = ConversationState {
            id: Uuid::new_v4(),
            user_id: "u1".into(),
            flow_type: FlowType::EquipmentRegistration,
            current_step: 0,
            fields: serde_json::json!({}),
            status: faultline_core::ConversationStatus::Active,
            version: 1,
            created_at: now,
            updated_at: now,
            expires_at: now + chrono::Duration::hours(24),
        };
        repo.insert(&state).await.unwrap();

        let mut advanced = state.clone();
        advanced.current_step = 1;
        assert!(repo.try_advance(&advanced, 1).await.unwrap());
        // Stale writer loses.
        assert!(!repo.try_advance(&advanced, 1).await.unwrap());
        assert_eq!(repo.fetch(state.id).await.unwrap().version, 2);
    }
}
