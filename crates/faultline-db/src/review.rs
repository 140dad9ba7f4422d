//! Review queue repository for quality-rejected atoms.

use async_trait::async_trait;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use faultline_core::{ReviewQueueEntry, ReviewQueueRepository, Result};

use crate::pool::map_pool_error;

/// PostgreSQL implementation of [`ReviewQueueRepository`].
pub struct PgReviewQueueRepository {
    pool: Pool<Postgres>,
}

impl PgReviewQueueRepository {
    /// Create a new PgReviewQueueRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReviewQueueRepository for PgReviewQueueRepository {
    async fn push(&self, entry: &ReviewQueueEntry) -> Result<Uuid> {
        sqlx::query(
            r#"
            INSERT INTO review_queue
                (id, source_id, title, reason, quality_score, payload, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(entry.id)
        .bind(&entry.source_id)
        .bind(&entry.title)
        .bind(&entry.reason)
        .bind(entry.quality_score)
        .bind(&entry.payload)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_pool_error)?;
        Ok(entry.id)
    }

    async fn count(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM review_queue")
            .fetch_one(&self.pool)
            .await
            .map_err(map_pool_error)?;
        Ok(row.get("count"))
    }

    async fn list(&self, limit: i64) -> Result<Vec<ReviewQueueEntry>> {
        let rows = sqlx::query(
            "SELECT id, source_id, title, reason, quality_score, payload, created_at
             FROM review_queue
             ORDER BY created_at DESC
             LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(map_pool_error)?;

        Ok(rows
            .into_iter()
            .map(|row| ReviewQueueEntry {
                id: row.get("id"),
                source_id: row.get("source_id"),
                title: row.get("title"),
                reason: row.get("reason"),
                quality_score: row.get("quality_score"),
                payload: row.get("payload"),
                created_at: row.get("created_at"),
            })
            .collect())
    }
}
