//! # faultline-core
//!
//! Core types, traits, and abstractions for the faultline answering engine.
//!
//! This crate provides the foundational data structures and trait
//! definitions that the other faultline crates depend on.

pub mod defaults;
pub mod error;
pub mod logging;
pub mod models;
pub mod traits;

// Re-export commonly used types at crate root
pub use error::{Error, ErrorClass, Result};
pub use models::*;
pub use traits::*;

// The vector type is shared with the pgvector store column.
pub use pgvector::Vector;
