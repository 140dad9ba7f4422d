//! Conversation state lifecycle: TTL boundary, lost-update protection,
//! resume semantics.

use std::sync::Arc;

use chrono::Duration;

use faultline_core::{ConversationRepository, ConversationStatus, FlowType};
use faultline_db::MemoryConversationRepository;
use faultline_engine::{AdvanceOutcome, ConversationConfig, ConversationManager};

const USER: &str = "tech-7";

fn manager(repo: Arc<MemoryConversationRepository>) -> ConversationManager {
    ConversationManager::new(repo, ConversationConfig::default())
}

#[tokio::test]
async fn get_or_create_resumes_the_active_state() {
    let repo = Arc::new(MemoryConversationRepository::new());
    let m = manager(repo);

    let (first, created) = m
        .get_or_create(USER, FlowType::EquipmentRegistration)
        .await
        .unwrap();
    assert!(created);

    let (second, created) = m
        .get_or_create(USER, FlowType::EquipmentRegistration)
        .await
        .unwrap();
    assert!(!created);
    assert_eq!(first.id, second.id);
}

#[tokio::test]
async fn flows_of_different_types_are_independent() {
    let repo = Arc::new(MemoryConversationRepository::new());
    let m = manager(repo);

    let (reg, _) = m
        .get_or_create(USER, FlowType::EquipmentRegistration)
        .await
        .unwrap();
    let (fault, _) = m.get_or_create(USER, FlowType::FaultReport).await.unwrap();
    assert_ne!(reg.id, fault.id);

    // And different users never share state.
    let (other, _) = m
        .get_or_create("tech-8", FlowType::EquipmentRegistration)
        .await
        .unwrap();
    assert_ne!(reg.id, other.id);
}

#[tokio::test]
async fn state_expires_at_the_ttl_boundary_not_before() {
    let repo = Arc::new(MemoryConversationRepository::new());
    let m = manager(repo.clone());

    let (state, _) = m
        .get_or_create(USER, FlowType::EquipmentRegistration)
        .await
        .unwrap();
    let expires_at = state.expires_at;

    // Just before the TTL: the sweep removes nothing.
    let removed = repo
        .delete_expired(expires_at - Duration::seconds(1))
        .await
        .unwrap();
    assert_eq!(removed, 0);
    assert!(m
        .find_active(USER, FlowType::EquipmentRegistration)
        .await
        .unwrap()
        .is_some());

    // Just after: the state is gone.
    let removed = repo
        .delete_expired(expires_at + Duration::seconds(1))
        .await
        .unwrap();
    assert_eq!(removed, 1);
    assert!(m
        .find_active(USER, FlowType::EquipmentRegistration)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn advance_renews_the_ttl_as_an_explicit_touch() {
    let repo = Arc::new(MemoryConversationRepository::new());
    let m = manager(repo);

    let (state, _) = m
        .get_or_create(USER, FlowType::EquipmentRegistration)
        .await
        .unwrap();
    let original_expiry = state.expires_at;

    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    let outcome = m.advance(&state, "Bessie").await.unwrap();
    let AdvanceOutcome::Advanced { state, .. } = outcome else {
        panic!("expected Advanced");
    };
    assert!(state.expires_at > original_expiry);
}

#[tokio::test]
async fn concurrent_advances_produce_exactly_one_winner() {
    let repo = Arc::new(MemoryConversationRepository::new());
    let m = Arc::new(manager(repo.clone()));

    let (state, _) = m
        .get_or_create(USER, FlowType::EquipmentRegistration)
        .await
        .unwrap();

    let m1 = m.clone();
    let s1 = state.clone();
    let task1 = tokio::spawn(async move { m1.advance(&s1, "Bessie").await.unwrap() });
    let m2 = m.clone();
    let s2 = state.clone();
    let task2 = tokio::spawn(async move { m2.advance(&s2, "Clementine").await.unwrap() });

    let outcomes = [task1.await.unwrap(), task2.await.unwrap()];
    let advanced: Vec<_> = outcomes
        .iter()
        .filter(|o| matches!(o, AdvanceOutcome::Advanced { .. }))
        .collect();
    let conflicts: Vec<_> = outcomes
        .iter()
        .filter(|o| matches!(o, AdvanceOutcome::Conflict { .. }))
        .collect();

    assert_eq!(advanced.len(), 1, "exactly one advance must win");
    assert_eq!(conflicts.len(), 1, "the loser must observe a conflict");

    // The loser sees the winner's post-advance state, not its own write.
    let AdvanceOutcome::Advanced { state: winner, .. } = advanced[0] else {
        unreachable!()
    };
    let AdvanceOutcome::Conflict { state: observed } = conflicts[0] else {
        unreachable!()
    };
    assert_eq!(observed.version, winner.version);
    assert_eq!(observed.fields["nickname"], winner.fields["nickname"]);

    let stored = repo.fetch(state.id).await.unwrap();
    assert_eq!(stored.version, 2);
    assert_eq!(stored.current_step, 1);
}

#[tokio::test]
async fn completing_a_flow_frees_the_active_slot() {
    let repo = Arc::new(MemoryConversationRepository::new());
    let m = manager(repo);

    let (mut state, _) = m.get_or_create(USER, FlowType::FaultReport).await.unwrap();
    for input in ["grinding noise", "conveyor three", "since this morning"] {
        match m.advance(&state, input).await.unwrap() {
            AdvanceOutcome::Advanced { state: next, .. } => state = next,
            AdvanceOutcome::Completed { state: done } => {
                assert_eq!(done.status, ConversationStatus::Completed);
                state = done;
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }
    assert!(state.is_complete());

    // A completed flow is no longer active; a new one can start.
    let (fresh, created) = m.get_or_create(USER, FlowType::FaultReport).await.unwrap();
    assert!(created);
    assert_ne!(fresh.id, state.id);
}

#[tokio::test]
async fn invalid_input_leaves_state_untouched() {
    let repo = Arc::new(MemoryConversationRepository::new());
    let m = manager(repo.clone());

    let (state, _) = m
        .get_or_create(USER, FlowType::EquipmentRegistration)
        .await
        .unwrap();

    let outcome = m.advance(&state, " ").await.unwrap();
    assert!(matches!(outcome, AdvanceOutcome::Invalid { .. }));

    let stored = repo.fetch(state.id).await.unwrap();
    assert_eq!(stored.current_step, 0);
    assert_eq!(stored.version, 1);
}
