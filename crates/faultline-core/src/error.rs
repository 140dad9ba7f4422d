//! Error types for faultline.

use thiserror::Error;

/// Result type alias using faultline's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Broad failure class used to pick a recovery policy.
///
/// Every [`Error`] variant maps onto exactly one class:
/// transient failures are retried with backoff, validation failures are
/// routed to human review, capacity failures degrade, and configuration
/// failures abort startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Network or store hiccup; retry with backoff.
    Transient,
    /// Malformed input or atom; route to human review.
    Validation,
    /// Pool or rate-limit pressure; degrade gracefully.
    Capacity,
    /// Fatal misconfiguration; never retried.
    Configuration,
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transient => write!(f, "transient_io"),
            Self::Validation => write!(f, "validation_failure"),
            Self::Capacity => write!(f, "capacity_exceeded"),
            Self::Configuration => write!(f, "configuration_error"),
        }
    }
}

/// Core error type for faultline operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Knowledge atom not found
    #[error("Atom not found: {0}")]
    AtomNotFound(uuid::Uuid),

    /// Conversation state not found
    #[error("Conversation not found: {0}")]
    ConversationNotFound(uuid::Uuid),

    /// Embedding generation failed
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Completion/generation failed
    #[error("Completion error: {0}")]
    Completion(String),

    /// Search operation failed
    #[error("Search error: {0}")]
    Search(String),

    /// Ingestion stage failed
    #[error("Ingestion error: {0}")]
    Ingestion(String),

    /// Input or atom failed validation
    #[error("Validation error: {0}")]
    Validation(String),

    /// Pool exhaustion or rate-limit pressure
    #[error("Capacity exceeded: {0}")]
    Capacity(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// Operation exceeded its deadline
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Operation aborted by a caller-supplied cancellation signal
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Map this error onto the four-way recovery taxonomy.
    pub fn class(&self) -> ErrorClass {
        match self {
            // Pool acquire timeouts are pressure, not a store outage.
            Error::Database(sqlx::Error::PoolTimedOut) => ErrorClass::Capacity,
            Error::Database(_) => ErrorClass::Transient,
            Error::NotFound(_) | Error::AtomNotFound(_) | Error::ConversationNotFound(_) => {
                ErrorClass::Validation
            }
            Error::Embedding(_) | Error::Completion(_) | Error::Search(_) => ErrorClass::Transient,
            Error::Ingestion(_) => ErrorClass::Transient,
            Error::Validation(_) | Error::InvalidInput(_) | Error::Serialization(_) => {
                ErrorClass::Validation
            }
            Error::Capacity(_) => ErrorClass::Capacity,
            Error::Config(_) => ErrorClass::Configuration,
            Error::Request(_) | Error::Timeout(_) | Error::Io(_) => ErrorClass::Transient,
            // A cancelled run may be resumed later; the stage itself is sound.
            Error::Cancelled(_) => ErrorClass::Transient,
            Error::Internal(_) => ErrorClass::Transient,
        }
    }

    /// True when the recovery policy for this error is retry-with-backoff.
    ///
    /// Cancellation is excluded: retrying inside an aborted call chain
    /// would leak work past the caller's deadline.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Error::Cancelled(_)) && self.class() == ErrorClass::Transient
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Request(e.to_string())
    }
}
