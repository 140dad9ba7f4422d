//! # faultline-db
//!
//! PostgreSQL + pgvector knowledge store layer for faultline.
//!
//! This crate provides:
//! - Connection pool management with bounded acquisition
//! - Repository implementations for atoms, fingerprints, ingestion logs,
//!   the review queue, and conversation state
//! - Vector search with pgvector, lexical search with tsvector
//! - Passage chunking for the ingestion pipeline
//! - In-memory repository fixtures for tests
//!
//! ## Example
//!
//! ```rust,ignore
//! use faultline_db::Database;
//!
//! let db = Database::connect("postgres://localhost/faultline").await?;
//! let atoms = db.atoms.count().await?;
//! ```

pub mod atoms;
pub mod chunking;
pub mod conversations;
pub mod fingerprints;
pub mod memory;
pub mod pool;
pub mod review;

// Re-export core types
pub use faultline_core::*;

pub use atoms::PgAtomRepository;
pub use chunking::{Chunk, ChunkerConfig, StructuralChunker};
pub use conversations::PgConversationRepository;
pub use fingerprints::{
    compute_content_hash, PgFingerprintRepository, PgIngestionLogRepository,
};
pub use memory::{
    MemoryAtomRepository, MemoryConversationRepository, MemoryFingerprintRepository,
    MemoryIngestionLogRepository, MemoryReviewQueueRepository,
};
pub use pool::{create_pool, create_pool_with_config, log_pool_metrics, map_pool_error, PoolConfig};
pub use review::PgReviewQueueRepository;

/// Combined database context with all repositories.
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    /// Knowledge atom repository with vector and lexical indexes.
    pub atoms: PgAtomRepository,
    /// Source dedup ledger.
    pub fingerprints: PgFingerprintRepository,
    /// Ingestion attempt log and dead-letter queue.
    pub ingestion_log: PgIngestionLogRepository,
    /// Quality-review queue for rejected atoms.
    pub review: PgReviewQueueRepository,
    /// Conversation state repository.
    pub conversations: PgConversationRepository,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            atoms: PgAtomRepository::new(pool.clone()),
            fingerprints: PgFingerprintRepository::new(pool.clone()),
            ingestion_log: PgIngestionLogRepository::new(pool.clone()),
            review: PgReviewQueueRepository::new(pool.clone()),
            conversations: PgConversationRepository::new(pool.clone()),
            pool,
        }
    }

    /// Create a new Database instance by connecting to the given URL.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = create_pool(url).await?;
        Ok(Self::new(pool))
    }

    /// Create with custom pool configuration.
    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool_with_config(url, config).await?;
        Ok(Self::new(pool))
    }

    /// Run pending migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.pool
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self::new(self.pool.clone())
    }
}
