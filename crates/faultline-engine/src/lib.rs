//! # faultline-engine
//!
//! Intent classification, conversation flows, and routing orchestration
//! for faultline.
//!
//! This crate provides:
//! - A typed, startup-validated keyword intent table with a completion
//!   model fallback (keyword match always wins)
//! - Multi-step conversation flows with TTL'd, lost-update-free state
//! - The four-way route decision (direct / clarify / escalate /
//!   collaborate) driven by configurable confidence thresholds
//! - The `handle_turn` entrypoint and the operational status surfaces

pub mod conversation;
pub mod engine;
pub mod intent;
pub mod router;

pub use conversation::{
    flow_steps, AdvanceOutcome, ConversationConfig, ConversationManager, StepDef,
};
pub use engine::{Engine, EngineBuilder, TurnOutcome};
pub use intent::{ClassifiedIntent, IntentClassifier, IntentRegistry, IntentRule};
pub use router::{decide, fallback_decision, RoutingConfig};

// Re-export core types
pub use faultline_core::{
    ConversationState, Coverage, FlowType, Intent, IntentSource, Responder, ResponderReply,
    Route, RouteDecision,
};
