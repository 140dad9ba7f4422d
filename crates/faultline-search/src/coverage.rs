//! Coverage classification for retrieval results.
//!
//! Coverage is distribution-based, not count-only: "strong" requires the
//! top score to clear a high threshold AND enough of the candidate set to
//! clear a mid threshold, so one lucky hit over a sea of noise does not
//! read as strong.

use faultline_core::Coverage;

use crate::config::RetrievalConfig;

/// Classify a stage's relevance scores into a coverage bucket.
///
/// The classification is monotone: adding another high-relevance score can
/// only raise the top score and the over-mid count, never lower the bucket.
pub fn classify(scores: &[f32], config: &RetrievalConfig) -> Coverage {
    let top = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    if scores.is_empty() || top < config.thin_top {
        return Coverage::None;
    }

    let over_mid = scores.iter().filter(|s| **s >= config.mid).count();
    if top >= config.strong_top && over_mid >= config.strong_min_candidates {
        Coverage::Strong
    } else if top >= config.adequate_top {
        Coverage::Adequate
    } else {
        Coverage::Thin
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RetrievalConfig {
        RetrievalConfig::default()
    }

    #[test]
    fn test_empty_scores_are_none() {
        assert_eq!(classify(&[], &config()), Coverage::None);
    }

    #[test]
    fn test_low_top_is_none() {
        assert_eq!(classify(&[0.1, 0.2, 0.3], &config()), Coverage::None);
    }

    #[test]
    fn test_thin_between_thresholds() {
        assert_eq!(classify(&[0.4], &config()), Coverage::Thin);
    }

    #[test]
    fn test_adequate_with_single_good_hit() {
        assert_eq!(classify(&[0.6], &config()), Coverage::Adequate);
    }

    #[test]
    fn test_lone_high_hit_is_not_strong() {
        // Top clears the strong threshold but the distribution is noise.
        assert_eq!(classify(&[0.9, 0.1, 0.1], &config()), Coverage::Adequate);
    }

    #[test]
    fn test_strong_needs_top_and_distribution() {
        assert_eq!(
            classify(&[0.9, 0.7, 0.6, 0.2], &config()),
            Coverage::Strong
        );
    }

    #[test]
    fn test_monotone_in_added_high_relevance_scores() {
        let mut scores = vec![0.4_f32];
        let mut previous = classify(&scores, &config());
        for _ in 0..6 {
            scores.push(0.85);
            let current = classify(&scores, &config());
            assert!(
                current >= previous,
                "coverage dropped from {:?} to {:?} after adding a high score",
                previous,
                current
            );
            previous = current;
        }
        assert_eq!(previous, Coverage::Strong);
    }

    #[test]
    fn test_custom_thresholds_respected() {
        let config = RetrievalConfig::default()
            .with_strong(0.95, 0.9, 5)
            .with_adequate_top(0.8);
        assert_eq!(classify(&[0.9, 0.9, 0.9], &config), Coverage::Adequate);
    }
}
