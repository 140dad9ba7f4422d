//! Route decision logic.
//!
//! The orchestrator combines the classified intent with retrieval
//! confidence into one of four routes. Thresholds are configuration, not
//! constants in the decision procedure.

use tracing::debug;

use faultline_core::{
    defaults, Coverage, Error, Intent, IntentSource, Result, RetrievalResult, Route,
    RouteDecision,
};

use crate::intent::ClassifiedIntent;

/// Confidence thresholds for route selection.
#[derive(Debug, Clone)]
pub struct RoutingConfig {
    /// Confidence at or above this answers directly (Route A).
    pub direct_min: f32,
    /// Confidence at or above this (below `direct_min`) clarifies
    /// (Route B); anything lower escalates (Route C).
    pub clarify_min: f32,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            direct_min: defaults::ROUTE_DIRECT_MIN_CONFIDENCE,
            clarify_min: defaults::ROUTE_CLARIFY_MIN_CONFIDENCE,
        }
    }
}

impl RoutingConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `FAULTLINE_ROUTE_DIRECT_MIN` | `0.8` | Direct-answer threshold |
    /// | `FAULTLINE_ROUTE_CLARIFY_MIN` | `0.5` | Clarify threshold |
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(v) = std::env::var("FAULTLINE_ROUTE_DIRECT_MIN")
            .ok()
            .and_then(|v| v.parse::<f32>().ok())
        {
            config.direct_min = v;
        }
        if let Some(v) = std::env::var("FAULTLINE_ROUTE_CLARIFY_MIN")
            .ok()
            .and_then(|v| v.parse::<f32>().ok())
        {
            config.clarify_min = v;
        }
        config
    }

    /// Set both thresholds.
    pub fn with_thresholds(mut self, direct_min: f32, clarify_min: f32) -> Self {
        self.direct_min = direct_min;
        self.clarify_min = clarify_min;
        self
    }

    /// Startup validation: thresholds must be ordered and within [0, 1].
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.direct_min) || !(0.0..=1.0).contains(&self.clarify_min) {
            return Err(Error::Config(
                "routing thresholds must be within [0, 1]".into(),
            ));
        }
        if self.clarify_min >= self.direct_min {
            return Err(Error::Config(format!(
                "clarify threshold {} must be below direct threshold {}",
                self.clarify_min, self.direct_min
            )));
        }
        Ok(())
    }
}

/// Decide the route for a classified, retrieved turn.
pub fn decide(
    classified: ClassifiedIntent,
    retrieval: &RetrievalResult,
    config: &RoutingConfig,
) -> RouteDecision {
    let confidence = retrieval.confidence();
    let mut trace = vec![
        format!(
            "intent '{}' via {}",
            classified.intent.as_str(),
            match classified.source {
                IntentSource::Keyword => "keyword table",
                IntentSource::Model => "model fallback",
            }
        ),
        format!(
            "retrieval coverage {} with confidence {:.2} over {} hit(s){}",
            retrieval.coverage.as_str(),
            confidence,
            retrieval.hits.len(),
            if retrieval.degraded { " (degraded)" } else { "" },
        ),
    ];

    let safety_critical =
        classified.intent == Intent::SafetyIncident || retrieval.has_safety_critical();
    let multi_domain = retrieval.spans_multiple_domains();

    let route = if safety_critical {
        trace.push("safety-critical turn, collaborating across responders".into());
        Route::Collaborate
    } else if multi_domain && confidence >= config.clarify_min {
        trace.push("query spans multiple domains, collaborating across responders".into());
        Route::Collaborate
    } else if confidence >= config.direct_min {
        trace.push(format!(
            "confidence {:.2} >= {:.2}, answering directly",
            confidence, config.direct_min
        ));
        Route::DirectAnswer
    } else if confidence >= config.clarify_min {
        trace.push(format!(
            "confidence {:.2} in [{:.2}, {:.2}), asking to clarify",
            confidence, config.clarify_min, config.direct_min
        ));
        Route::Clarify
    } else {
        trace.push(format!(
            "confidence {:.2} < {:.2}, escalating",
            confidence, config.clarify_min
        ));
        Route::Escalate
    };

    debug!(
        subsystem = "routing",
        component = "router",
        op = "decide",
        intent = classified.intent.as_str(),
        confidence = confidence,
        coverage = retrieval.coverage.as_str(),
        route = %route.letter(),
        "Route decided"
    );

    RouteDecision {
        intent: classified.intent,
        intent_source: classified.source,
        confidence,
        coverage: retrieval.coverage,
        route,
        trace,
    }
}

/// A decision for turns that never reach retrieval (empty input,
/// unavailable classifier and store). Always a safe route.
pub fn fallback_decision(
    classified: ClassifiedIntent,
    reason: &str,
    route: Route,
) -> RouteDecision {
    RouteDecision {
        intent: classified.intent,
        intent_source: classified.source,
        confidence: 0.0,
        coverage: Coverage::None,
        route,
        trace: vec![reason.to_string()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use faultline_core::{AtomCategory, AtomHit, Citation, RetrievalStage, SafetyLevel};
    use uuid::Uuid;

    fn classified(intent: Intent) -> ClassifiedIntent {
        ClassifiedIntent {
            intent,
            source: IntentSource::Keyword,
        }
    }

    fn hit(score: f32, category: AtomCategory, safety: SafetyLevel) -> AtomHit {
        AtomHit {
            atom_id: Uuid::new_v4(),
            score,
            title: "t".into(),
            summary: "s".into(),
            category,
            safety,
            citation: Citation::new("src"),
            stage: RetrievalStage::Semantic,
        }
    }

    fn retrieval_with_confidence(confidence: f32) -> RetrievalResult {
        let coverage = if confidence >= 0.75 {
            Coverage::Strong
        } else if confidence >= 0.55 {
            Coverage::Adequate
        } else if confidence >= 0.35 {
            Coverage::Thin
        } else {
            Coverage::None
        };
        RetrievalResult {
            query: "q".into(),
            hits: if confidence > 0.0 {
                vec![hit(confidence, AtomCategory::Electrical, SafetyLevel::Info)]
            } else {
                vec![]
            },
            coverage,
            degraded: false,
            latency_ms: 1,
        }
    }

    #[test]
    fn test_confidence_090_routes_a() {
        let decision = decide(
            classified(Intent::Troubleshoot),
            &retrieval_with_confidence(0.9),
            &RoutingConfig::default(),
        );
        assert_eq!(decision.route, Route::DirectAnswer);
        assert_eq!(decision.route.letter(), 'A');
    }

    #[test]
    fn test_confidence_060_routes_b() {
        let decision = decide(
            classified(Intent::Troubleshoot),
            &retrieval_with_confidence(0.6),
            &RoutingConfig::default(),
        );
        assert_eq!(decision.route, Route::Clarify);
    }

    #[test]
    fn test_confidence_030_routes_c() {
        let decision = decide(
            classified(Intent::Troubleshoot),
            &retrieval_with_confidence(0.3),
            &RoutingConfig::default(),
        );
        assert_eq!(decision.route, Route::Escalate);
    }

    #[test]
    fn test_threshold_boundaries_are_inclusive() {
        let config = RoutingConfig::default();
        assert_eq!(
            decide(classified(Intent::Troubleshoot), &retrieval_with_confidence(0.8), &config).route,
            Route::DirectAnswer
        );
        assert_eq!(
            decide(classified(Intent::Troubleshoot), &retrieval_with_confidence(0.5), &config).route,
            Route::Clarify
        );
    }

    #[test]
    fn test_safety_intent_routes_d_regardless_of_confidence() {
        let decision = decide(
            classified(Intent::SafetyIncident),
            &retrieval_with_confidence(0.9),
            &RoutingConfig::default(),
        );
        assert_eq!(decision.route, Route::Collaborate);
    }

    #[test]
    fn test_safety_critical_hits_route_d() {
        let mut retrieval = retrieval_with_confidence(0.9);
        retrieval.hits[0].safety = SafetyLevel::Danger;
        let decision = decide(
            classified(Intent::Troubleshoot),
            &retrieval,
            &RoutingConfig::default(),
        );
        assert_eq!(decision.route, Route::Collaborate);
    }

    #[test]
    fn test_multi_domain_routes_d() {
        let mut retrieval = retrieval_with_confidence(0.9);
        retrieval
            .hits
            .push(hit(0.85, AtomCategory::Hydraulic, SafetyLevel::Info));
        let decision = decide(
            classified(Intent::Troubleshoot),
            &retrieval,
            &RoutingConfig::default(),
        );
        assert_eq!(decision.route, Route::Collaborate);
    }

    #[test]
    fn test_multi_domain_with_weak_confidence_still_escalates() {
        let mut retrieval = retrieval_with_confidence(0.3);
        retrieval
            .hits
            .push(hit(0.2, AtomCategory::Hydraulic, SafetyLevel::Info));
        let decision = decide(
            classified(Intent::Troubleshoot),
            &retrieval,
            &RoutingConfig::default(),
        );
        assert_eq!(decision.route, Route::Escalate);
    }

    #[test]
    fn test_custom_thresholds_change_routing() {
        let config = RoutingConfig::default().with_thresholds(0.95, 0.9);
        let decision = decide(
            classified(Intent::Troubleshoot),
            &retrieval_with_confidence(0.92),
            &config,
        );
        assert_eq!(decision.route, Route::Clarify);
    }

    #[test]
    fn test_trace_records_reasoning() {
        let decision = decide(
            classified(Intent::Troubleshoot),
            &retrieval_with_confidence(0.9),
            &RoutingConfig::default(),
        );
        assert!(decision.trace.len() >= 3);
        assert!(decision.trace[0].contains("troubleshoot"));
        assert!(decision.trace.iter().any(|t| t.contains("answering directly")));
    }

    #[test]
    fn test_config_validation() {
        assert!(RoutingConfig::default().validate().is_ok());
        assert!(RoutingConfig::default()
            .with_thresholds(0.5, 0.8)
            .validate()
            .is_err());
        assert!(RoutingConfig::default()
            .with_thresholds(1.4, 0.5)
            .validate()
            .is_err());
    }
}
