//! Retrieval engine configuration.

use std::time::Duration;

use faultline_core::defaults;

/// Configuration for multi-stage retrieval.
#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    /// Candidates fetched per stage.
    pub top_k: i64,
    /// Top score required for "strong" coverage.
    pub strong_top: f32,
    /// Mid threshold candidates must clear to count toward "strong".
    pub mid: f32,
    /// Minimum candidates over `mid` for "strong" coverage.
    pub strong_min_candidates: usize,
    /// Top score required for "adequate" coverage.
    pub adequate_top: f32,
    /// Top score required for "thin" coverage; below it is "none".
    pub thin_top: f32,
    /// Per-stage timeout; a timed-out stage falls through to the next.
    pub stage_timeout: Duration,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: defaults::RETRIEVAL_TOP_K,
            strong_top: defaults::COVERAGE_STRONG_TOP,
            mid: defaults::COVERAGE_MID,
            strong_min_candidates: defaults::COVERAGE_STRONG_MIN_CANDIDATES,
            adequate_top: defaults::COVERAGE_ADEQUATE_TOP,
            thin_top: defaults::COVERAGE_THIN_TOP,
            stage_timeout: Duration::from_millis(defaults::RETRIEVAL_STAGE_TIMEOUT_MS),
        }
    }
}

impl RetrievalConfig {
    /// Set the per-stage candidate count.
    pub fn with_top_k(mut self, top_k: i64) -> Self {
        self.top_k = top_k;
        self
    }

    /// Set the "strong" coverage thresholds.
    pub fn with_strong(mut self, top: f32, mid: f32, min_candidates: usize) -> Self {
        self.strong_top = top;
        self.mid = mid;
        self.strong_min_candidates = min_candidates;
        self
    }

    /// Set the "adequate" top-score threshold.
    pub fn with_adequate_top(mut self, top: f32) -> Self {
        self.adequate_top = top;
        self
    }

    /// Set the "thin" top-score threshold.
    pub fn with_thin_top(mut self, top: f32) -> Self {
        self.thin_top = top;
        self
    }

    /// Set the per-stage timeout.
    pub fn with_stage_timeout(mut self, timeout: Duration) -> Self {
        self.stage_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_ordered() {
        let config = RetrievalConfig::default();
        assert!(config.thin_top < config.adequate_top);
        assert!(config.adequate_top < config.strong_top);
    }

    #[test]
    fn test_builder() {
        let config = RetrievalConfig::default()
            .with_top_k(20)
            .with_strong(0.9, 0.8, 4)
            .with_stage_timeout(Duration::from_millis(500));
        assert_eq!(config.top_k, 20);
        assert_eq!(config.strong_min_candidates, 4);
        assert_eq!(config.stage_timeout, Duration::from_millis(500));
    }
}
