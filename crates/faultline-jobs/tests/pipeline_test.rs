//! End-to-end pipeline behavior over in-memory stores and the mock backend.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::watch;

use faultline_core::{
    AtomRepository, FingerprintRepository, FingerprintStatus, IngestionLogRepository,
    IngestionStage, ReviewQueueRepository,
};
use faultline_db::{
    MemoryAtomRepository, MemoryFingerprintRepository, MemoryIngestionLogRepository,
    MemoryReviewQueueRepository,
};
use faultline_inference::MockInferenceBackend;
use faultline_jobs::{IngestOutcome, IngestionPipeline, PipelineConfig, StaticSourceFetcher};

const DIM: usize = 16;
const SOURCE: &str = "manual://acme/motor-overload.md";

struct Harness {
    fetcher: Arc<StaticSourceFetcher>,
    atoms: Arc<MemoryAtomRepository>,
    fingerprints: Arc<MemoryFingerprintRepository>,
    logs: Arc<MemoryIngestionLogRepository>,
    review: Arc<MemoryReviewQueueRepository>,
    mock: MockInferenceBackend,
    pipeline: IngestionPipeline,
}

fn harness(max_stage_retries: u32) -> Harness {
    let fetcher = Arc::new(StaticSourceFetcher::new());
    let atoms = Arc::new(MemoryAtomRepository::with_dimension(DIM));
    let fingerprints = Arc::new(MemoryFingerprintRepository::new());
    let logs = Arc::new(MemoryIngestionLogRepository::new());
    let review = Arc::new(MemoryReviewQueueRepository::new());
    let mock = MockInferenceBackend::new().with_dimension(DIM);

    let config = PipelineConfig::default()
        .with_max_stage_retries(max_stage_retries)
        .with_backoff_base(Duration::from_millis(1))
        .with_quality_min(65.0);

    let pipeline = IngestionPipeline::new(
        fetcher.clone(),
        atoms.clone(),
        fingerprints.clone(),
        logs.clone(),
        review.clone(),
        Arc::new(mock.clone()),
        Arc::new(mock.clone()),
        config,
    );

    Harness {
        fetcher,
        atoms,
        fingerprints,
        logs,
        review,
        mock,
        pipeline,
    }
}

/// A ~500-word source about motor overload faults, in two sections.
fn motor_source() -> String {
    let sentence = "The motor overload fault trips the thermal relay when the \
                    drawn current exceeds the nameplate rating for a sustained \
                    period of time under load.";
    let section = |title: &str| {
        let mut s = format!("# {}\n\n", title);
        let body: Vec<&str> = std::iter::repeat(sentence).take(11).collect();
        s.push_str(&body.join(" "));
        s
    };
    format!("{}\n\n{}", section("Overload faults"), section("Reset procedure"))
}

fn good_candidate() -> String {
    json!({
        "title": "Motor overload fault diagnosis",
        "summary": "Overload trips usually trace to relay settings or supply faults.",
        "body": "Check the overload relay setting against the motor nameplate \
                 current. Reset the relay only after the motor has cooled. \
                 Inspect the supply wiring for a dropped phase and verify \
                 terminal torque before you restart the drive.",
        "category": "electrical",
        "difficulty": "intermediate",
        "safety": "caution",
        "keywords": ["motor", "overload", "relay"]
    })
    .to_string()
}

fn poor_candidate() -> String {
    json!({
        "title": "Broken",
        "summary": "",
        "body": "Broken.",
        "category": "general"
    })
    .to_string()
}

fn cancel_channel() -> (watch::Sender<bool>, watch::Receiver<bool>) {
    watch::channel(false)
}

#[tokio::test]
async fn five_hundred_word_source_produces_cited_scored_embedded_atoms() {
    let h = harness(2);
    h.fetcher.insert(SOURCE, motor_source().into_bytes());
    h.mock.push_response(good_candidate());
    h.mock.push_response(good_candidate());

    let (_cancel_guard, mut cancel) = cancel_channel();
    let outcome = h.pipeline.ingest(SOURCE, &mut cancel).await.unwrap();

    let IngestOutcome::Ingested {
        atoms_stored,
        atoms_reviewed,
    } = outcome
    else {
        panic!("expected Ingested, got {:?}", outcome);
    };
    assert!((1..=3).contains(&atoms_stored), "stored {}", atoms_stored);
    assert_eq!(atoms_reviewed, 0);

    for atom in h.atoms.all() {
        assert_eq!(atom.citation.source_id, SOURCE);
        assert!(atom.citation.offset.is_some());
        assert!(atom.quality_score >= 65.0, "score {}", atom.quality_score);
        assert!(atom.embedding.is_some());
    }
    assert_eq!(
        h.fingerprints
            .count_status(FingerprintStatus::Ingested)
            .await
            .unwrap(),
        1
    );
}

#[tokio::test]
async fn repeated_ingest_is_idempotent() {
    let h = harness(2);
    h.fetcher.insert(SOURCE, motor_source().into_bytes());
    h.mock.push_response(good_candidate());
    h.mock.push_response(good_candidate());

    let (_cancel_guard, mut cancel) = cancel_channel();
    let first = h.pipeline.ingest(SOURCE, &mut cancel).await.unwrap();
    assert!(matches!(first, IngestOutcome::Ingested { .. }));

    let atoms_before = h.atoms.count().await.unwrap();
    let completions_before = h.mock.completion_call_count();

    let second = h.pipeline.ingest(SOURCE, &mut cancel).await.unwrap();
    assert_eq!(second, IngestOutcome::AlreadyIngested);

    // No duplicate atoms, no duplicate fingerprints, no new model calls.
    assert_eq!(h.atoms.count().await.unwrap(), atoms_before);
    assert_eq!(h.mock.completion_call_count(), completions_before);
    assert_eq!(
        h.fingerprints
            .count_status(FingerprintStatus::Ingested)
            .await
            .unwrap(),
        1
    );
}

#[tokio::test]
async fn identical_content_under_different_uri_is_deduplicated() {
    let h = harness(2);
    h.fetcher.insert(SOURCE, motor_source().into_bytes());
    h.fetcher
        .insert("manual://mirror/motor-overload.md", motor_source().into_bytes());
    h.mock.push_response(good_candidate());
    h.mock.push_response(good_candidate());

    let (_cancel_guard, mut cancel) = cancel_channel();
    h.pipeline.ingest(SOURCE, &mut cancel).await.unwrap();
    let second = h
        .pipeline
        .ingest("manual://mirror/motor-overload.md", &mut cancel)
        .await
        .unwrap();

    assert_eq!(second, IngestOutcome::AlreadyIngested);
}

#[tokio::test]
async fn failing_stage_is_retried_exactly_to_cap_then_dead_lettered() {
    let h = harness(2);
    h.fetcher.insert(SOURCE, motor_source().into_bytes());
    h.mock.push_response(good_candidate());
    h.mock.push_response(good_candidate());
    h.mock.set_fail_embeddings(true);

    let (_cancel_guard, mut cancel) = cancel_channel();
    let outcome = h.pipeline.ingest(SOURCE, &mut cancel).await.unwrap();

    let IngestOutcome::DeadLettered { stage, .. } = outcome else {
        panic!("expected DeadLettered, got {:?}", outcome);
    };
    assert_eq!(stage, IngestionStage::Embedding);

    // 1 initial attempt + 2 retries, never more.
    assert_eq!(h.logs.attempts_for(IngestionStage::Embedding), 3);
    assert_eq!(h.logs.dead_letter_count().await.unwrap(), 1);
    assert_eq!(
        h.fingerprints
            .count_status(FingerprintStatus::Failed)
            .await
            .unwrap(),
        1
    );
    assert_eq!(h.atoms.count().await.unwrap(), 0);
}

#[tokio::test]
async fn low_quality_atoms_route_to_review_queue_not_store() {
    let h = harness(2);
    h.fetcher.insert(SOURCE, "Short note about a broken part.".as_bytes());
    h.mock.push_response(poor_candidate());

    let (_cancel_guard, mut cancel) = cancel_channel();
    let outcome = h.pipeline.ingest(SOURCE, &mut cancel).await.unwrap();

    assert_eq!(
        outcome,
        IngestOutcome::Ingested {
            atoms_stored: 0,
            atoms_reviewed: 1,
        }
    );
    assert_eq!(h.review.count().await.unwrap(), 1);
    assert_eq!(h.atoms.count().await.unwrap(), 0);

    let entries = h.review.list(10).await.unwrap();
    assert!(entries[0].reason.contains("below minimum"));
    // Processed content stays terminal in the ledger.
    assert_eq!(
        h.fingerprints
            .count_status(FingerprintStatus::Ingested)
            .await
            .unwrap(),
        1
    );
}

#[tokio::test]
async fn empty_source_dead_letters_at_extraction_without_retries() {
    let h = harness(3);
    h.fetcher.insert(SOURCE, "   \n\n   ".as_bytes());

    let (_cancel_guard, mut cancel) = cancel_channel();
    let outcome = h.pipeline.ingest(SOURCE, &mut cancel).await.unwrap();

    let IngestOutcome::DeadLettered { stage, reason } = outcome else {
        panic!("expected DeadLettered, got {:?}", outcome);
    };
    assert_eq!(stage, IngestionStage::Extraction);
    assert!(reason.contains("validation_failure"));
    // Validation failures are not worth retrying.
    assert_eq!(h.logs.attempts_for(IngestionStage::Extraction), 1);
}

#[tokio::test]
async fn malformed_model_output_is_retried_then_dead_lettered() {
    let h = harness(1);
    h.fetcher.insert(SOURCE, "The relay trips under load.".as_bytes());
    // Default mock response is not JSON, so every generation attempt fails.

    let (_cancel_guard, mut cancel) = cancel_channel();
    let outcome = h.pipeline.ingest(SOURCE, &mut cancel).await.unwrap();

    let IngestOutcome::DeadLettered { stage, .. } = outcome else {
        panic!("expected DeadLettered, got {:?}", outcome);
    };
    assert_eq!(stage, IngestionStage::AtomGeneration);
    assert_eq!(h.logs.attempts_for(IngestionStage::AtomGeneration), 2);
}

#[tokio::test]
async fn cancellation_aborts_before_external_calls() {
    let h = harness(2);
    h.fetcher.insert(SOURCE, motor_source().into_bytes());

    let (tx, mut cancel) = watch::channel(false);
    tx.send(true).unwrap();

    let result = h.pipeline.ingest(SOURCE, &mut cancel).await;
    assert!(matches!(result, Err(faultline_core::Error::Cancelled(_))));
    assert_eq!(h.mock.completion_call_count(), 0);
    assert_eq!(h.atoms.count().await.unwrap(), 0);
}

#[tokio::test]
async fn cancellation_interrupts_inflight_stage() {
    let h = harness(2);
    h.fetcher.insert(SOURCE, "The relay trips under load.".as_bytes());
    // Slow completion so cancellation lands mid-stage.
    let slow = MockInferenceBackend::new()
        .with_dimension(DIM)
        .with_latency_ms(5_000)
        .with_fixed_response(good_candidate());

    let pipeline = IngestionPipeline::new(
        h.fetcher.clone(),
        h.atoms.clone(),
        h.fingerprints.clone(),
        h.logs.clone(),
        h.review.clone(),
        Arc::new(slow.clone()),
        Arc::new(slow),
        PipelineConfig::default().with_backoff_base(Duration::from_millis(1)),
    );

    let (tx, mut cancel) = watch::channel(false);
    let task = tokio::spawn(async move { pipeline.ingest(SOURCE, &mut cancel).await });

    tokio::time::sleep(Duration::from_millis(50)).await;
    tx.send(true).unwrap();

    let result = tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .expect("cancel must interrupt the stage promptly")
        .unwrap();
    assert!(matches!(result, Err(faultline_core::Error::Cancelled(_))));
}
