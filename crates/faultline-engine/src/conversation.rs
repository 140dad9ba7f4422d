//! Conversation flow definitions and the state manager.
//!
//! A flow is a fixed, named sequence of steps. Each `advance` validates
//! the current step's expected input, stores it in the field map, and
//! moves on or completes. Restarting a flow cancels the prior state with
//! a log line, never a silent overwrite. States live until a hard TTL
//! sweep; `advance` is an explicit touch that renews the TTL, reads are
//! not.

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use faultline_core::{
    defaults, ConversationRepository, ConversationState, ConversationStatus, Error, FlowType,
    Result,
};

// ---------------------------------------------------------------------------
// Flow definitions
// ---------------------------------------------------------------------------

/// One step of a flow: the field it collects, the prompt that asks for it,
/// and the validator its input must pass.
pub struct StepDef {
    pub name: &'static str,
    pub prompt: &'static str,
    pub validate: fn(&str) -> Result<String>,
}

fn non_empty(input: &str) -> Result<String> {
    let value = input.trim();
    if value.len() < 2 {
        return Err(Error::InvalidInput("a short answer is needed here".into()));
    }
    Ok(value.to_string())
}

fn serial_number(input: &str) -> Result<String> {
    let value: String = input
        .trim()
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '-')
        .collect();
    if value.chars().filter(|c| c.is_alphanumeric()).count() < 4 {
        return Err(Error::InvalidInput(
            "serial numbers have at least 4 letters or digits".into(),
        ));
    }
    Ok(value.to_uppercase())
}

static EQUIPMENT_REGISTRATION_STEPS: &[StepDef] = &[
    StepDef {
        name: "nickname",
        prompt: "What nickname should this equipment go by?",
        validate: non_empty,
    },
    StepDef {
        name: "manufacturer",
        prompt: "Who manufactures it?",
        validate: non_empty,
    },
    StepDef {
        name: "model",
        prompt: "What's the model designation?",
        validate: non_empty,
    },
    StepDef {
        name: "serial",
        prompt: "What's the serial number (on the nameplate)?",
        validate: serial_number,
    },
    StepDef {
        name: "location",
        prompt: "Where is it installed?",
        validate: non_empty,
    },
];

static FAULT_REPORT_STEPS: &[StepDef] = &[
    StepDef {
        name: "symptom",
        prompt: "What symptom are you seeing?",
        validate: non_empty,
    },
    StepDef {
        name: "equipment",
        prompt: "Which equipment is affected?",
        validate: non_empty,
    },
    StepDef {
        name: "onset",
        prompt: "When did it start?",
        validate: non_empty,
    },
];

/// The fixed step sequence for a flow.
pub fn flow_steps(flow: FlowType) -> &'static [StepDef] {
    match flow {
        FlowType::EquipmentRegistration => EQUIPMENT_REGISTRATION_STEPS,
        FlowType::FaultReport => FAULT_REPORT_STEPS,
    }
}

// ---------------------------------------------------------------------------
// Manager
// ---------------------------------------------------------------------------

/// Configuration for conversation state lifetimes.
#[derive(Debug, Clone)]
pub struct ConversationConfig {
    /// Hard TTL; states past it are removed by the sweep.
    pub ttl: Duration,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::seconds(defaults::CONVERSATION_TTL_SECS),
        }
    }
}

impl ConversationConfig {
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }
}

/// Outcome of advancing a conversation by one turn.
#[derive(Debug, Clone)]
pub enum AdvanceOutcome {
    /// Input accepted; the flow moved to the next step.
    Advanced {
        state: ConversationState,
        next_prompt: String,
    },
    /// Input accepted and the flow is complete.
    Completed { state: ConversationState },
    /// Input failed the step's validation; state unchanged.
    Invalid {
        state: ConversationState,
        reason: String,
        reprompt: String,
    },
    /// A concurrent writer advanced first; carries the post-advance state.
    Conflict { state: ConversationState },
}

/// Manager for resumable multi-step dialogue state.
pub struct ConversationManager {
    repo: Arc<dyn ConversationRepository>,
    config: ConversationConfig,
}

impl ConversationManager {
    pub fn new(repo: Arc<dyn ConversationRepository>, config: ConversationConfig) -> Self {
        Self { repo, config }
    }

    /// Resume the active state for (user, flow) or create a fresh one.
    /// Returns the state and whether it was created this call.
    pub async fn get_or_create(
        &self,
        user_id: &str,
        flow_type: FlowType,
    ) -> Result<(ConversationState, bool)> {
        if let Some(existing) = self.repo.find_active(user_id, flow_type).await? {
            return Ok((existing, false));
        }
        let state = self.fresh_state(user_id, flow_type);
        self.repo.insert(&state).await?;
        info!(
            subsystem = "conversation",
            component = "manager",
            op = "create",
            conversation_id = %state.id,
            user_id = user_id,
            flow = flow_type.as_str(),
            "Conversation flow started"
        );
        Ok((state, true))
    }

    /// Start a flow, explicitly cancelling any active state of the same
    /// type for this user.
    pub async fn restart(&self, user_id: &str, flow_type: FlowType) -> Result<ConversationState> {
        if let Some(existing) = self.repo.find_active(user_id, flow_type).await? {
            warn!(
                subsystem = "conversation",
                component = "manager",
                op = "restart",
                conversation_id = %existing.id,
                user_id = user_id,
                flow = flow_type.as_str(),
                "Cancelling prior flow superseded by a restart"
            );
            self.repo.cancel(existing.id).await?;
        }
        let state = self.fresh_state(user_id, flow_type);
        self.repo.insert(&state).await?;
        Ok(state)
    }

    /// Fetch a state by id (for turn resumption by conversation id).
    pub async fn fetch(&self, id: Uuid) -> Result<ConversationState> {
        self.repo.fetch(id).await
    }

    /// Find the active state for (user, flow), if any.
    pub async fn find_active(
        &self,
        user_id: &str,
        flow_type: FlowType,
    ) -> Result<Option<ConversationState>> {
        self.repo.find_active(user_id, flow_type).await
    }

    /// The prompt for a state's current step.
    pub fn current_prompt(&self, state: &ConversationState) -> String {
        let steps = flow_steps(state.flow_type);
        steps
            .get(state.current_step as usize)
            .map(|s| s.prompt.to_string())
            .unwrap_or_else(|| "This flow is already complete.".to_string())
    }

    /// Advance a state with one turn of input.
    ///
    /// Lost updates are impossible: the write is guarded by the state's
    /// version, and the losing writer gets [`AdvanceOutcome::Conflict`]
    /// with the winner's state.
    pub async fn advance(
        &self,
        state: &ConversationState,
        input: &str,
    ) -> Result<AdvanceOutcome> {
        if state.status != ConversationStatus::Active {
            return Err(Error::Validation(format!(
                "conversation {} is not active",
                state.id
            )));
        }
        let steps = flow_steps(state.flow_type);
        let Some(step) = steps.get(state.current_step as usize) else {
            return Err(Error::Internal(format!(
                "conversation {} step {} out of range",
                state.id, state.current_step
            )));
        };

        let value = match (step.validate)(input) {
            Ok(v) => v,
            Err(e) => {
                debug!(
                    subsystem = "conversation",
                    component = "manager",
                    op = "advance",
                    conversation_id = %state.id,
                    step = step.name,
                    "Step input rejected"
                );
                return Ok(AdvanceOutcome::Invalid {
                    state: state.clone(),
                    reason: e.to_string(),
                    reprompt: step.prompt.to_string(),
                });
            }
        };

        let now = Utc::now();
        let mut next = state.clone();
        if let Some(map) = next.fields.as_object_mut() {
            map.insert(step.name.to_string(), json!(value));
        } else {
            next.fields = json!({ step.name: value });
        }
        next.current_step += 1;
        next.updated_at = now;
        // Advancing is an explicit touch; the TTL renews from here.
        next.expires_at = now + self.config.ttl;
        let completed = next.current_step as usize >= steps.len();
        if completed {
            next.status = ConversationStatus::Completed;
        }

        if !self.repo.try_advance(&next, state.version).await? {
            let latest = self.repo.fetch(state.id).await?;
            debug!(
                subsystem = "conversation",
                component = "manager",
                op = "advance",
                conversation_id = %state.id,
                "Concurrent advance lost the version race"
            );
            return Ok(AdvanceOutcome::Conflict { state: latest });
        }
        next.version = state.version + 1;

        if completed {
            info!(
                subsystem = "conversation",
                component = "manager",
                op = "advance",
                conversation_id = %next.id,
                flow = next.flow_type.as_str(),
                "Conversation flow completed"
            );
            Ok(AdvanceOutcome::Completed { state: next })
        } else {
            let next_prompt = self.current_prompt(&next);
            Ok(AdvanceOutcome::Advanced { state: next, next_prompt })
        }
    }

    /// Remove all states whose hard TTL has passed.
    pub async fn expire_sweep(&self) -> Result<u64> {
        self.repo.delete_expired(Utc::now()).await
    }

    fn fresh_state(&self, user_id: &str, flow_type: FlowType) -> ConversationState {
        let now = Utc::now();
        ConversationState {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            flow_type,
            current_step: 0,
            fields: json!({}),
            status: ConversationStatus::Active,
            version: 1,
            created_at: now,
            updated_at: now,
            expires_at: now + self.config.ttl,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flows_have_expected_steps() {
        let registration = flow_steps(FlowType::EquipmentRegistration);
        let names: Vec<&str> = registration.iter().map(|s| s.name).collect();
        assert_eq!(
            names,
            vec!["nickname", "manufacturer", "model", "serial", "location"]
        );
        assert_eq!(flow_steps(FlowType::FaultReport).len(), 3);
    }

    #[test]
    fn test_non_empty_validator() {
        assert!(non_empty("  ").is_err());
        assert!(non_empty("x").is_err());
        assert_eq!(non_empty("  Bessie  ").unwrap(), "Bessie");
    }

    #[test]
    fn test_serial_validator_normalizes() {
        assert!(serial_number("ab").is_err());
        assert!(serial_number("!!!").is_err());
        assert_eq!(serial_number(" sn-4711 ").unwrap(), "SN-4711");
    }
}
