//! The turn-handling engine: classify → retrieve → route → respond.
//!
//! One entrypoint, [`Engine::handle_turn`], callable from any front-end.
//! A caller-supplied deadline propagates through the classifier's model
//! fallback, retrieval, and responder fan-out; no external call outlives
//! it. The engine never fabricates a confident answer: when classification
//! and retrieval are both unavailable it selects a safe route with a
//! short, actionable message.

use std::future::Future;
use std::sync::Arc;

use tokio::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

use faultline_core::{
    AtomHit, ConversationState, ConversationStatus, Error, FingerprintRepository,
    FingerprintStatus, FlowType, IngestionLogRepository, IngestionStatus, InferenceBackend,
    Intent, IntentSource, Responder, Result, RetrievalHealth, RetrievalResult,
    ReviewQueueRepository, Route, RouteDecision,
};
use faultline_search::RetrievalEngine;

use crate::conversation::{AdvanceOutcome, ConversationManager};
use crate::intent::{ClassifiedIntent, IntentClassifier};
use crate::router::{decide, fallback_decision, RoutingConfig};

const MSG_EMPTY_INPUT: &str =
    "I couldn't make sense of that message. A human technician will follow up.";
const MSG_CANNOT_ANSWER: &str =
    "I can't answer that right now. The issue has been flagged for a technician.";
const MSG_ESCALATE: &str =
    "I don't have confident knowledge for this one, so I've flagged it for a technician.";
const MSG_CLARIFY: &str = "Could you share the equipment make and model, and what \
                           exactly happens when the problem occurs?";

/// What one handled turn produced: the routed decision plus the response
/// payload a front-end renders.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub decision: RouteDecision,
    pub response: String,
    /// Present when the turn touched a conversation flow.
    pub conversation: Option<ConversationState>,
}

/// Builder for [`Engine`]; configuration is validated at `build`.
pub struct EngineBuilder {
    classifier: IntentClassifier,
    retrieval: RetrievalEngine,
    conversations: ConversationManager,
    inference: Option<Arc<dyn InferenceBackend>>,
    fingerprints: Option<Arc<dyn FingerprintRepository>>,
    ingestion_log: Option<Arc<dyn IngestionLogRepository>>,
    review: Option<Arc<dyn ReviewQueueRepository>>,
    routing: RoutingConfig,
    responders: Vec<Arc<dyn Responder>>,
}

impl EngineBuilder {
    pub fn new(
        classifier: IntentClassifier,
        retrieval: RetrievalEngine,
        conversations: ConversationManager,
    ) -> Self {
        Self {
            classifier,
            retrieval,
            conversations,
            inference: None,
            fingerprints: None,
            ingestion_log: None,
            review: None,
            routing: RoutingConfig::default(),
            responders: Vec::new(),
        }
    }

    /// Set the routing thresholds.
    pub fn with_routing(mut self, routing: RoutingConfig) -> Self {
        self.routing = routing;
        self
    }

    /// Wire the operational repositories for the status surfaces.
    pub fn with_operational_stores(
        mut self,
        fingerprints: Arc<dyn FingerprintRepository>,
        ingestion_log: Arc<dyn IngestionLogRepository>,
        review: Arc<dyn ReviewQueueRepository>,
    ) -> Self {
        self.fingerprints = Some(fingerprints);
        self.ingestion_log = Some(ingestion_log);
        self.review = Some(review);
        self
    }

    /// Wire the inference backend used for health reporting.
    pub fn with_inference(mut self, inference: Arc<dyn InferenceBackend>) -> Self {
        self.inference = Some(inference);
        self
    }

    /// Register a responder for Route D fan-out.
    pub fn with_responder(mut self, responder: Arc<dyn Responder>) -> Self {
        self.responders.push(responder);
        self
    }

    /// Validate configuration and assemble the engine.
    pub fn build(self) -> Result<Engine> {
        self.routing.validate()?;
        Ok(Engine {
            classifier: self.classifier,
            retrieval: self.retrieval,
            conversations: self.conversations,
            inference: self
                .inference
                .ok_or_else(|| Error::Config("engine requires an inference backend".into()))?,
            fingerprints: self
                .fingerprints
                .ok_or_else(|| Error::Config("engine requires operational stores".into()))?,
            ingestion_log: self
                .ingestion_log
                .ok_or_else(|| Error::Config("engine requires operational stores".into()))?,
            review: self
                .review
                .ok_or_else(|| Error::Config("engine requires operational stores".into()))?,
            routing: self.routing,
            responders: self.responders,
        })
    }
}

/// The retrieval-augmented answering engine.
pub struct Engine {
    classifier: IntentClassifier,
    retrieval: RetrievalEngine,
    conversations: ConversationManager,
    inference: Arc<dyn InferenceBackend>,
    fingerprints: Arc<dyn FingerprintRepository>,
    ingestion_log: Arc<dyn IngestionLogRepository>,
    review: Arc<dyn ReviewQueueRepository>,
    routing: RoutingConfig,
    responders: Vec<Arc<dyn Responder>>,
}

impl Engine {
    /// Start building an engine.
    pub fn builder(
        classifier: IntentClassifier,
        retrieval: RetrievalEngine,
        conversations: ConversationManager,
    ) -> EngineBuilder {
        EngineBuilder::new(classifier, retrieval, conversations)
    }

    /// Handle one conversational turn.
    ///
    /// `conversation_id` resumes a specific flow state when the front-end
    /// tracks one; otherwise any active flow for the user is picked up.
    /// `deadline` bounds every external call made on behalf of the turn.
    pub async fn handle_turn(
        &self,
        conversation_id: Option<Uuid>,
        user_id: &str,
        text: &str,
        deadline: Option<Instant>,
    ) -> Result<TurnOutcome> {
        let trimmed = text.trim();
        info!(
            subsystem = "routing",
            component = "engine",
            op = "handle_turn",
            user_id = user_id,
            "Handling turn"
        );

        if trimmed.is_empty() || !trimmed.chars().any(|c| c.is_alphanumeric()) {
            let decision = fallback_decision(
                ClassifiedIntent {
                    intent: Intent::Unknown,
                    source: IntentSource::Keyword,
                },
                "empty or unintelligible input, escalating",
                Route::Escalate,
            );
            return Ok(TurnOutcome {
                decision,
                response: MSG_EMPTY_INPUT.to_string(),
                conversation: None,
            });
        }

        // Classify: keyword table first, model fallback under the deadline.
        let classified = match with_deadline(deadline, self.classifier.classify(trimmed)).await {
            Ok(c) => c,
            Err(_) => ClassifiedIntent {
                intent: Intent::Unknown,
                source: IntentSource::Model,
            },
        };

        // An intent that starts a flow restarts it explicitly, cancelling
        // any prior state of the same type.
        if let Some(flow) = classified.intent.flow() {
            let state = self.conversations.restart(user_id, flow).await?;
            let prompt = self.conversations.current_prompt(&state);
            let decision = fallback_decision(
                classified,
                "flow started, collecting structured fields",
                Route::Clarify,
            );
            return Ok(TurnOutcome {
                decision,
                response: prompt,
                conversation: Some(state),
            });
        }

        // A turn inside an active flow is that flow's next input.
        if let Some(state) = self.active_flow_state(conversation_id, user_id).await? {
            return self.advance_flow(classified, state, trimmed).await;
        }

        // Retrieve under the deadline; a blown deadline reads as degraded.
        let retrieval = match with_deadline(deadline, self.retrieval.retrieve(trimmed, None)).await
        {
            Ok(r) => r,
            Err(_) => {
                warn!(
                    subsystem = "routing",
                    component = "engine",
                    op = "handle_turn",
                    "Turn deadline exhausted during retrieval"
                );
                RetrievalResult::degraded(trimmed, 0)
            }
        };

        // Never fabricate: with no intent and no retrieval there is nothing
        // to answer from.
        if classified.intent == Intent::Unknown && retrieval.degraded {
            let decision = fallback_decision(
                classified,
                "classifier and retrieval both unavailable, escalating",
                Route::Escalate,
            );
            return Ok(TurnOutcome {
                decision,
                response: MSG_CANNOT_ANSWER.to_string(),
                conversation: None,
            });
        }

        let decision = decide(classified, &retrieval, &self.routing);
        let response = match decision.route {
            Route::DirectAnswer => compose_direct(&retrieval.hits),
            Route::Clarify => MSG_CLARIFY.to_string(),
            Route::Escalate => MSG_ESCALATE.to_string(),
            Route::Collaborate => {
                self.collaborate(&decision, &retrieval.hits, deadline).await
            }
        };

        info!(
            subsystem = "routing",
            component = "engine",
            op = "handle_turn",
            user_id = user_id,
            intent = decision.intent.as_str(),
            confidence = decision.confidence,
            coverage = decision.coverage.as_str(),
            route = %decision.route.letter(),
            "Turn routed"
        );
        Ok(TurnOutcome {
            decision,
            response,
            conversation: None,
        })
    }

    /// Run the TTL sweep for conversation state.
    pub async fn expire_sweep(&self) -> Result<u64> {
        self.conversations.expire_sweep().await
    }

    /// Structured ingestion counters for dashboards. Degrades to zeros
    /// with `store_reachable: false` instead of erroring.
    pub async fn ingestion_status(&self) -> IngestionStatus {
        let store_reachable = self
            .retrieval
            .atoms()
            .health_check()
            .await
            .unwrap_or(false);
        IngestionStatus {
            atoms_ingested: self.retrieval.atoms().count().await.unwrap_or(0),
            fingerprints_pending: self
                .fingerprints
                .count_status(FingerprintStatus::Pending)
                .await
                .unwrap_or(0),
            dead_letters: self.ingestion_log.dead_letter_count().await.unwrap_or(0),
            review_queue: self.review.count().await.unwrap_or(0),
            store_reachable,
        }
    }

    /// Structured retrieval health for dashboards.
    pub async fn retrieval_health(&self) -> RetrievalHealth {
        RetrievalHealth {
            store_reachable: self
                .retrieval
                .atoms()
                .health_check()
                .await
                .unwrap_or(false),
            inference_reachable: self.inference.health_check().await.unwrap_or(false),
            embedding_dimension: self.retrieval.embedder().dimension(),
        }
    }

    async fn active_flow_state(
        &self,
        conversation_id: Option<Uuid>,
        user_id: &str,
    ) -> Result<Option<ConversationState>> {
        if let Some(id) = conversation_id {
            match self.conversations.fetch(id).await {
                Ok(state)
                    if state.status == ConversationStatus::Active
                        && state.user_id == user_id =>
                {
                    return Ok(Some(state))
                }
                Ok(_) | Err(Error::ConversationNotFound(_)) => return Ok(None),
                Err(e) => return Err(e),
            }
        }
        for flow in FlowType::all() {
            if let Some(state) = self.conversations.find_active(user_id, *flow).await? {
                return Ok(Some(state));
            }
        }
        Ok(None)
    }

    async fn advance_flow(
        &self,
        classified: ClassifiedIntent,
        state: ConversationState,
        input: &str,
    ) -> Result<TurnOutcome> {
        match self.conversations.advance(&state, input).await? {
            AdvanceOutcome::Advanced { state, next_prompt } => Ok(TurnOutcome {
                decision: fallback_decision(
                    classified,
                    "flow turn accepted, asking for the next field",
                    Route::Clarify,
                ),
                response: next_prompt,
                conversation: Some(state),
            }),
            AdvanceOutcome::Completed { state } => {
                let summary = format!(
                    "All set — recorded {} detail(s) for the {} flow.",
                    state.fields.as_object().map(|m| m.len()).unwrap_or(0),
                    state.flow_type.as_str().replace('_', " "),
                );
                Ok(TurnOutcome {
                    decision: fallback_decision(
                        classified,
                        "flow completed with all fields collected",
                        Route::DirectAnswer,
                    ),
                    response: summary,
                    conversation: Some(state),
                })
            }
            AdvanceOutcome::Invalid {
                state,
                reason,
                reprompt,
            } => Ok(TurnOutcome {
                decision: fallback_decision(
                    classified,
                    "flow input rejected by step validation",
                    Route::Clarify,
                ),
                response: format!("That didn't look right ({}). {}", reason, reprompt),
                conversation: Some(state),
            }),
            AdvanceOutcome::Conflict { state } => {
                let prompt = self.conversations.current_prompt(&state);
                Ok(TurnOutcome {
                    decision: fallback_decision(
                        classified,
                        "concurrent flow update detected, resuming from stored state",
                        Route::Clarify,
                    ),
                    response: prompt,
                    conversation: Some(state),
                })
            }
        }
    }

    /// Route D: fan out to the registered responders and merge.
    async fn collaborate(
        &self,
        decision: &RouteDecision,
        hits: &[AtomHit],
        deadline: Option<Instant>,
    ) -> String {
        let mut replies = Vec::new();
        for responder in &self.responders {
            match with_deadline(deadline, responder.respond(decision, hits)).await {
                Ok(Ok(reply)) => replies.push(reply),
                Ok(Err(e)) => warn!(
                    subsystem = "routing",
                    component = "engine",
                    op = "collaborate",
                    responder = responder.name(),
                    error = %e,
                    "Responder failed, continuing with the rest"
                ),
                Err(_) => {
                    warn!(
                        subsystem = "routing",
                        component = "engine",
                        op = "collaborate",
                        "Turn deadline exhausted during responder fan-out"
                    );
                    break;
                }
            }
        }

        if replies.is_empty() {
            if hits.is_empty() {
                return "This needs more than one specialty and no confident \
                        knowledge is available; a technician has been flagged."
                    .to_string();
            }
            let mut response = compose_direct(hits);
            response.push_str(
                "\n\nThis spans more than one domain; treat the guidance as \
                 preliminary until a technician confirms it.",
            );
            return response;
        }

        replies.sort_by(|a, b| a.responder.cmp(&b.responder));
        let mut citations: Vec<Uuid> = Vec::new();
        let sections: Vec<String> = replies
            .iter()
            .map(|r| {
                for c in &r.citations {
                    if !citations.contains(c) {
                        citations.push(*c);
                    }
                }
                format!("[{}] {}", r.responder, r.text)
            })
            .collect();
        let mut merged = sections.join("\n\n");
        if !citations.is_empty() {
            merged.push_str(&format!("\n\nDrawn from {} knowledge atom(s).", citations.len()));
        }
        merged
    }
}

/// Compose a direct answer from the top hits, with citations.
fn compose_direct(hits: &[AtomHit]) -> String {
    let mut lines = vec!["Here's what the knowledge base says:".to_string()];
    for hit in hits.iter().take(3) {
        lines.push(format!(
            "• {} — {} [source: {}]",
            hit.title, hit.summary, hit.citation.source_id
        ));
    }
    lines.join("\n")
}

/// Await `fut`, bounded by the turn deadline when one is set.
async fn with_deadline<T>(
    deadline: Option<Instant>,
    fut: impl Future<Output = T>,
) -> Result<T> {
    match deadline {
        Some(at) => tokio::time::timeout_at(at, fut)
            .await
            .map_err(|_| Error::Timeout("turn deadline exceeded".into())),
        None => Ok(fut.await),
    }
}
