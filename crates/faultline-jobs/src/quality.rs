//! Atom quality validation.
//!
//! Scoring is a pluggable strategy: the pipeline only depends on
//! [`QualityScorer`], and the default [`WeightedQualityScorer`] can be
//! swapped wholesale when better signals exist.

use faultline_core::KnowledgeAtom;

/// The fixed dimensions every scorer reports on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QualityDimension {
    Completeness,
    Clarity,
    EducationalValue,
    Attribution,
    AccuracyRisk,
}

impl QualityDimension {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completeness => "completeness",
            Self::Clarity => "clarity",
            Self::EducationalValue => "educational_value",
            Self::Attribution => "attribution",
            Self::AccuracyRisk => "accuracy_risk",
        }
    }

    pub fn all() -> &'static [QualityDimension] {
        &[
            Self::Completeness,
            Self::Clarity,
            Self::EducationalValue,
            Self::Attribution,
            Self::AccuracyRisk,
        ]
    }
}

/// Per-dimension scores and their weighted total, all in [0, 100].
#[derive(Debug, Clone)]
pub struct QualityReport {
    pub total: f32,
    pub scores: Vec<(QualityDimension, f32)>,
}

impl QualityReport {
    /// Score for one dimension, if reported.
    pub fn dimension(&self, dim: QualityDimension) -> Option<f32> {
        self.scores.iter().find(|(d, _)| *d == dim).map(|(_, s)| *s)
    }
}

/// Strategy interface for atom quality scoring.
pub trait QualityScorer: Send + Sync {
    fn score(&self, atom: &KnowledgeAtom) -> QualityReport;
}

/// Default heuristic scorer with explicit per-dimension weights.
#[derive(Debug, Clone)]
pub struct WeightedQualityScorer {
    weights: [(QualityDimension, f32); 5],
}

impl Default for WeightedQualityScorer {
    fn default() -> Self {
        Self {
            weights: [
                (QualityDimension::Completeness, 0.30),
                (QualityDimension::Clarity, 0.20),
                (QualityDimension::EducationalValue, 0.20),
                (QualityDimension::Attribution, 0.15),
                (QualityDimension::AccuracyRisk, 0.15),
            ],
        }
    }
}

const ACTION_VERBS: &[&str] = &[
    "check", "inspect", "replace", "reset", "verify", "measure", "test", "tighten", "clean",
    "adjust", "isolate", "calibrate",
];

const HEDGE_WORDS: &[&str] = &["maybe", "probably", "unclear", "guess", "possibly", "unsure"];

impl WeightedQualityScorer {
    pub fn new() -> Self {
        Self::default()
    }

    fn completeness(atom: &KnowledgeAtom) -> f32 {
        let words = atom.body.split_whitespace().count() as f32;
        let mut score = (words * 2.5).min(100.0);
        if atom.summary.trim().is_empty() {
            score *= 0.5;
        }
        score
    }

    fn clarity(atom: &KnowledgeAtom) -> f32 {
        let sentences = atom
            .body
            .split(['.', '!', '?'])
            .filter(|s| !s.trim().is_empty())
            .count()
            .max(1) as f32;
        let words = atom.body.split_whitespace().count() as f32;
        let avg = words / sentences;
        let mut score = if avg <= 25.0 {
            90.0
        } else {
            (90.0 - 2.0 * (avg - 25.0)).max(40.0)
        };
        if atom.title.len() > 90 {
            score -= 20.0;
        }
        score.clamp(0.0, 100.0)
    }

    fn educational_value(atom: &KnowledgeAtom) -> f32 {
        let body = atom.body.to_lowercase();
        let verbs = ACTION_VERBS
            .iter()
            .filter(|v| body.contains(*v))
            .count() as f32;
        let score = 50.0 + 12.0 * verbs + 5.0 * atom.keywords.len().min(4) as f32;
        score.min(100.0)
    }

    fn attribution(atom: &KnowledgeAtom) -> f32 {
        if atom.citation.source_id.trim().is_empty() {
            return 30.0;
        }
        if atom.citation.page.is_some() || atom.citation.offset.is_some() {
            100.0
        } else {
            90.0
        }
    }

    fn accuracy_risk(atom: &KnowledgeAtom) -> f32 {
        let body = atom.body.to_lowercase();
        let hedges = HEDGE_WORDS
            .iter()
            .filter(|h| body.contains(*h))
            .count() as f32;
        (100.0 - 25.0 * hedges).max(20.0)
    }
}

impl QualityScorer for WeightedQualityScorer {
    fn score(&self, atom: &KnowledgeAtom) -> QualityReport {
        let mut scores = Vec::with_capacity(self.weights.len());
        let mut total = 0.0;
        for (dim, weight) in self.weights {
            let value = match dim {
                QualityDimension::Completeness => Self::completeness(atom),
                QualityDimension::Clarity => Self::clarity(atom),
                QualityDimension::EducationalValue => Self::educational_value(atom),
                QualityDimension::Attribution => Self::attribution(atom),
                QualityDimension::AccuracyRisk => Self::accuracy_risk(atom),
            };
            total += weight * value;
            scores.push((dim, value));
        }
        QualityReport { total, scores }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use faultline_core::{AtomCategory, Citation, Difficulty, SafetyLevel};
    use uuid::Uuid;

    fn atom(body: &str, summary: &str, keywords: Vec<String>) -> KnowledgeAtom {
        KnowledgeAtom {
            id: Uuid::new_v4(),
            title: "Motor overload fault".into(),
            summary: summary.into(),
            body: body.into(),
            category: AtomCategory::Electrical,
            difficulty: Difficulty::Intermediate,
            safety: SafetyLevel::Caution,
            keywords,
            citation: Citation::new("manual://acme").with_offset(0),
            quality_score: 0.0,
            embedding: None,
            created_at: Utc::now(),
            version: 1,
        }
    }

    fn good_atom() -> KnowledgeAtom {
        atom(
            "Check the overload relay setting against the motor nameplate \
             current. Reset the relay only after the motor has cooled. \
             Inspect the supply for a dropped phase and verify terminal \
             torque before restarting the drive under load.",
            "Overload trips usually trace to relay settings or supply faults.",
            vec!["motor".into(), "overload".into(), "relay".into()],
        )
    }

    fn poor_atom() -> KnowledgeAtom {
        atom("Broken.", "", vec![])
    }

    #[test]
    fn test_reports_all_dimensions() {
        let report = WeightedQualityScorer::new().score(&good_atom());
        for dim in QualityDimension::all() {
            assert!(report.dimension(*dim).is_some(), "missing {:?}", dim);
        }
    }

    #[test]
    fn test_good_atom_scores_high() {
        let report = WeightedQualityScorer::new().score(&good_atom());
        assert!(report.total >= 80.0, "total was {}", report.total);
    }

    #[test]
    fn test_poor_atom_scores_low() {
        let report = WeightedQualityScorer::new().score(&poor_atom());
        assert!(report.total < 65.0, "total was {}", report.total);
        assert!(report.dimension(QualityDimension::Completeness).unwrap() < 10.0);
    }

    #[test]
    fn test_hedging_lowers_accuracy_risk() {
        let hedged = atom(
            "Maybe the relay is broken, or possibly the supply. Unclear.",
            "summary",
            vec![],
        );
        let report = WeightedQualityScorer::new().score(&hedged);
        assert!(report.dimension(QualityDimension::AccuracyRisk).unwrap() <= 25.0);
    }

    #[test]
    fn test_missing_citation_lowers_attribution() {
        let mut a = good_atom();
        a.citation.source_id = String::new();
        let report = WeightedQualityScorer::new().score(&a);
        assert_eq!(report.dimension(QualityDimension::Attribution).unwrap(), 30.0);
    }

    #[test]
    fn test_total_within_bounds() {
        for a in [good_atom(), poor_atom()] {
            let report = WeightedQualityScorer::new().score(&a);
            assert!((0.0..=100.0).contains(&report.total));
        }
    }
}
