//! # faultline-search
//!
//! Multi-stage fallback retrieval engine for faultline.
//!
//! This crate provides:
//! - Semantic → domain-filtered → keyword fallback search
//! - Distribution-based coverage classification (none/thin/adequate/strong)
//! - Per-stage timeouts and an explicit degraded result on store outage

pub mod config;
pub mod coverage;
pub mod entities;
pub mod retrieval;

pub use config::RetrievalConfig;
pub use coverage::classify;
pub use entities::{recognize, QueryEntities};
pub use retrieval::{RetrievalEngine, RetrievalFilters};

// Re-export core types
pub use faultline_core::{AtomHit, Coverage, RetrievalResult, RetrievalStage};
