//! Intent classification: keyword table first, model fallback second.
//!
//! The keyword table is typed and validated at startup. A keyword hit is
//! deterministic, cheap, and directly testable, so it always takes
//! priority over the completion-model fallback.

use std::sync::Arc;

use regex::Regex;
use tracing::{debug, warn};

use faultline_core::{CompletionBackend, Error, Intent, IntentSource, Result};

/// One row of the intent table.
#[derive(Debug, Clone)]
pub struct IntentRule {
    pub intent: Intent,
    /// Lowercase substrings matched against the lowercased input.
    pub keywords: Vec<String>,
    /// Regex patterns for shapes keywords cannot express.
    pub patterns: Vec<Regex>,
}

impl IntentRule {
    fn matches(&self, text: &str) -> bool {
        self.keywords.iter().any(|k| text.contains(k.as_str()))
            || self.patterns.iter().any(|p| p.is_match(text))
    }
}

/// Typed, startup-validated intent table. Rules match in order, so
/// safety-critical rules come first.
#[derive(Debug, Clone)]
pub struct IntentRegistry {
    rules: Vec<IntentRule>,
}

impl IntentRegistry {
    /// Build a registry from explicit rules and validate it.
    pub fn new(rules: Vec<IntentRule>) -> Result<Self> {
        let registry = Self { rules };
        registry.validate()?;
        Ok(registry)
    }

    /// The default troubleshooting-assistant table.
    pub fn with_default_rules() -> Result<Self> {
        let rule = |intent: Intent, keywords: &[&str]| IntentRule {
            intent,
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            patterns: Vec::new(),
        };
        // Fault-code shapes ("e04", "f1201") that keywords cannot express.
        let fault_code = Regex::new(r"\b[ef]\d{2,4}\b")
            .map_err(|e| Error::Config(format!("invalid intent pattern: {}", e)))?;
        Self::new(vec![
            // Safety first: these must shadow plain troubleshooting terms.
            rule(
                Intent::SafetyIncident,
                &[
                    "injury", "injured", "fire", "smoke", "sparks", "burning", "shocked",
                    "electrocut",
                ],
            ),
            rule(
                Intent::EquipmentRegistration,
                &["register", "registration", "add equipment", "new equipment"],
            ),
            rule(
                Intent::FaultReport,
                &["report a fault", "fault report", "log a fault"],
            ),
            rule(
                Intent::PartInquiry,
                &["part number", "spare part", "replacement part", "order a part"],
            ),
            rule(
                Intent::Maintenance,
                &[
                    "maintenance",
                    "service interval",
                    "lubricat",
                    "grease",
                    "filter change",
                    "inspection schedule",
                ],
            ),
            IntentRule {
                intent: Intent::Troubleshoot,
                keywords: [
                    "won't start",
                    "wont start",
                    "not working",
                    "not starting",
                    "trips",
                    "tripping",
                    "fault",
                    "error code",
                    "broken",
                    "fails",
                    "failure",
                    "overheat",
                    "noise",
                    "leak",
                ]
                .iter()
                .map(|k| k.to_string())
                .collect(),
                patterns: vec![fault_code],
            },
        ])
    }

    /// Startup validation: at least one rule, every rule matchable, no
    /// duplicate intents, no rule for `Unknown`.
    pub fn validate(&self) -> Result<()> {
        if self.rules.is_empty() {
            return Err(Error::Config("intent table is empty".into()));
        }
        let mut seen = Vec::new();
        for rule in &self.rules {
            if rule.intent == Intent::Unknown {
                return Err(Error::Config("intent table may not map to unknown".into()));
            }
            if rule.keywords.is_empty() && rule.patterns.is_empty() {
                return Err(Error::Config(format!(
                    "intent rule for {} has no keywords or patterns",
                    rule.intent.as_str()
                )));
            }
            if seen.contains(&rule.intent) {
                return Err(Error::Config(format!(
                    "duplicate intent rule for {}",
                    rule.intent.as_str()
                )));
            }
            seen.push(rule.intent);
        }
        Ok(())
    }

    /// Deterministic keyword/pattern classification.
    pub fn classify(&self, text: &str) -> Option<Intent> {
        let lowered = text.to_lowercase();
        self.rules
            .iter()
            .find(|rule| rule.matches(&lowered))
            .map(|rule| rule.intent)
    }
}

/// A classified turn with its provenance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassifiedIntent {
    pub intent: Intent,
    pub source: IntentSource,
}

const CLASSIFY_SYSTEM: &str =
    "You label technical support messages. Respond with exactly one label and nothing else.";

/// Classifier combining the keyword table with a model fallback.
pub struct IntentClassifier {
    registry: IntentRegistry,
    completion: Arc<dyn CompletionBackend>,
}

impl IntentClassifier {
    pub fn new(registry: IntentRegistry, completion: Arc<dyn CompletionBackend>) -> Self {
        Self {
            registry,
            completion,
        }
    }

    /// The registry in use (for table inspection in tooling).
    pub fn registry(&self) -> &IntentRegistry {
        &self.registry
    }

    /// Classify one turn. Never fails: a failed or unparseable model
    /// fallback yields `Unknown` rather than an error.
    pub async fn classify(&self, text: &str) -> ClassifiedIntent {
        let trimmed = text.trim();
        if trimmed.is_empty() || !trimmed.chars().any(|c| c.is_alphanumeric()) {
            return ClassifiedIntent {
                intent: Intent::Unknown,
                source: IntentSource::Keyword,
            };
        }

        if let Some(intent) = self.registry.classify(trimmed) {
            debug!(
                subsystem = "routing",
                component = "classifier",
                op = "classify",
                intent = intent.as_str(),
                "Keyword table matched"
            );
            return ClassifiedIntent {
                intent,
                source: IntentSource::Keyword,
            };
        }

        let labels = [
            Intent::Troubleshoot,
            Intent::Maintenance,
            Intent::PartInquiry,
            Intent::SafetyIncident,
            Intent::EquipmentRegistration,
            Intent::FaultReport,
            Intent::Unknown,
        ]
        .iter()
        .map(|i| i.as_str())
        .collect::<Vec<_>>()
        .join(", ");
        let prompt = format!(
            "Label the message with one of: {}.\n\nMessage: {}",
            labels, trimmed
        );

        match self.completion.complete(CLASSIFY_SYSTEM, &prompt).await {
            Ok(raw) => {
                let label = raw.trim().to_lowercase();
                let intent = Intent::parse(&label).unwrap_or(Intent::Unknown);
                debug!(
                    subsystem = "routing",
                    component = "classifier",
                    op = "classify",
                    intent = intent.as_str(),
                    "Model fallback classified"
                );
                ClassifiedIntent {
                    intent,
                    source: IntentSource::Model,
                }
            }
            Err(e) => {
                warn!(
                    subsystem = "routing",
                    component = "classifier",
                    op = "classify",
                    error = %e,
                    "Model fallback failed, treating intent as unknown"
                );
                ClassifiedIntent {
                    intent: Intent::Unknown,
                    source: IntentSource::Model,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Minimal completion stub; responses pop from the back.
    struct FixedCompletion {
        responses: Mutex<Vec<Result<String>>>,
    }

    #[async_trait]
    impl CompletionBackend for FixedCompletion {
        async fn complete(&self, _system: &str, _prompt: &str) -> Result<String> {
            self.responses
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Ok("unknown".into()))
        }

        async fn complete_json(&self, system: &str, prompt: &str) -> Result<String> {
            self.complete(system, prompt).await
        }

        fn model_name(&self) -> &str {
            "fixed"
        }
    }

    fn classifier(responses: Vec<Result<String>>) -> IntentClassifier {
        IntentClassifier::new(
            IntentRegistry::with_default_rules().unwrap(),
            Arc::new(FixedCompletion {
                responses: Mutex::new(responses),
            }),
        )
    }

    #[test]
    fn test_default_registry_validates() {
        assert!(IntentRegistry::with_default_rules().is_ok());
    }

    #[test]
    fn test_empty_registry_rejected() {
        assert!(IntentRegistry::new(vec![]).is_err());
    }

    #[test]
    fn test_unknown_rule_rejected() {
        let result = IntentRegistry::new(vec![IntentRule {
            intent: Intent::Unknown,
            keywords: vec!["x".into()],
            patterns: vec![],
        }]);
        assert!(result.is_err());
    }

    #[test]
    fn test_duplicate_rule_rejected() {
        let rule = IntentRule {
            intent: Intent::Troubleshoot,
            keywords: vec!["fault".into()],
            patterns: vec![],
        };
        assert!(IntentRegistry::new(vec![rule.clone(), rule]).is_err());
    }

    #[tokio::test]
    async fn test_keyword_match_wins_over_model() {
        // The model would say maintenance, but the table matches first.
        let c = classifier(vec![Ok("maintenance".into())]);
        let result = c.classify("the motor won't start today").await;
        assert_eq!(result.intent, Intent::Troubleshoot);
        assert_eq!(result.source, IntentSource::Keyword);
    }

    #[tokio::test]
    async fn test_safety_shadows_troubleshooting() {
        let c = classifier(vec![]);
        let result = c.classify("sparks and smoke, motor fault").await;
        assert_eq!(result.intent, Intent::SafetyIncident);
    }

    #[tokio::test]
    async fn test_fault_code_pattern_matches() {
        let c = classifier(vec![]);
        let result = c.classify("display shows e04 on the chiller").await;
        assert_eq!(result.intent, Intent::Troubleshoot);
        assert_eq!(result.source, IntentSource::Keyword);
    }

    #[tokio::test]
    async fn test_model_fallback_used_for_unmatched_text() {
        let c = classifier(vec![Ok("part_inquiry".into())]);
        let result = c.classify("where do I source a bushing for this").await;
        assert_eq!(result.intent, Intent::PartInquiry);
        assert_eq!(result.source, IntentSource::Model);
    }

    #[tokio::test]
    async fn test_model_failure_degrades_to_unknown() {
        let c = classifier(vec![Err(Error::Completion("down".into()))]);
        let result = c.classify("some unmatched question").await;
        assert_eq!(result.intent, Intent::Unknown);
        assert_eq!(result.source, IntentSource::Model);
    }

    #[tokio::test]
    async fn test_garbage_input_is_unknown_without_model_call() {
        let c = classifier(vec![Ok("troubleshoot".into())]);
        assert_eq!(c.classify("    ").await.intent, Intent::Unknown);
        assert_eq!(c.classify("?!#@").await.intent, Intent::Unknown);
    }

    #[tokio::test]
    async fn test_unparseable_model_label_is_unknown() {
        let c = classifier(vec![Ok("no idea, sorry!".into())]);
        let result = c.classify("an oddly phrased question").await;
        assert_eq!(result.intent, Intent::Unknown);
    }
}
