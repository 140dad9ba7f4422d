//! Source fingerprint ledger and ingestion attempt log.

use async_trait::async_trait;
use chrono::Utc;
use sha2::{Digest, Sha256};
use sqlx::{Pool, Postgres, Row};
use tracing::{debug, warn};
use uuid::Uuid;

use faultline_core::{
    DeadLetter, Error, FingerprintRepository, FingerprintStatus, IngestionLogRepository,
    IngestionStage, Result, SourceFingerprint,
};

use crate::pool::map_pool_error;

/// Stable content hash of normalized source bytes, hex-encoded SHA-256.
///
/// The hash is the unique dedup key: identical content re-submitted under
/// any URI maps to the same fingerprint row.
pub fn compute_content_hash(normalized: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalized);
    hex::encode(hasher.finalize())
}

/// PostgreSQL implementation of [`FingerprintRepository`].
pub struct PgFingerprintRepository {
    pool: Pool<Postgres>,
}

impl PgFingerprintRepository {
    /// Create a new PgFingerprintRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn from_row(row: sqlx::postgres::PgRow) -> SourceFingerprint {
        SourceFingerprint {
            content_hash: row.get("content_hash"),
            source_uri: row.get("source_uri"),
            status: FingerprintStatus::parse_or_pending(row.get("status")),
            first_seen: row.get("first_seen"),
            last_seen: row.get("last_seen"),
        }
    }
}

#[async_trait]
impl FingerprintRepository for PgFingerprintRepository {
    async fn lookup(&self, content_hash: &str) -> Result<Option<SourceFingerprint>> {
        let row = sqlx::query(
            "SELECT content_hash, source_uri, status, first_seen, last_seen
             FROM source_fingerprint
             WHERE content_hash = $1",
        )
        .bind(content_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_pool_error)?;

        Ok(row.map(Self::from_row))
    }

    async fn record_pending(
        &self,
        content_hash: &str,
        source_uri: &str,
    ) -> Result<SourceFingerprint> {
        let now = Utc::now();
        let row = sqlx::query(
            r#"
            INSERT INTO source_fingerprint
                (content_hash, source_uri, status, first_seen, last_seen)
            VALUES ($1, $2, 'pending', $3, $3)
            ON CONFLICT (content_hash) DO UPDATE SET last_seen = $3
            RETURNING content_hash, source_uri, status, first_seen, last_seen
            "#,
        )
        .bind(content_hash)
        .bind(source_uri)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(map_pool_error)?;

        Ok(Self::from_row(row))
    }

    async fn set_status(&self, content_hash: &str, status: FingerprintStatus) -> Result<()> {
        let result = sqlx::query(
            "UPDATE source_fingerprint SET status = $2, last_seen = $3
             WHERE content_hash = $1",
        )
        .bind(content_hash)
        .bind(status.as_str())
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(map_pool_error)?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!(
                "fingerprint {} not found",
                content_hash
            )));
        }
        debug!(
            subsystem = "db",
            component = "fingerprints",
            op = "set_status",
            status = status.as_str(),
            "Fingerprint status updated"
        );
        Ok(())
    }

    async fn count_status(&self, status: FingerprintStatus) -> Result<i64> {
        let row =
            sqlx::query("SELECT COUNT(*) AS count FROM source_fingerprint WHERE status = $1")
                .bind(status.as_str())
                .fetch_one(&self.pool)
                .await
                .map_err(map_pool_error)?;
        Ok(row.get("count"))
    }
}

/// PostgreSQL implementation of [`IngestionLogRepository`].
pub struct PgIngestionLogRepository {
    pool: Pool<Postgres>,
}

impl PgIngestionLogRepository {
    /// Create a new PgIngestionLogRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IngestionLogRepository for PgIngestionLogRepository {
    async fn record_attempt(
        &self,
        source_id: &str,
        stage: IngestionStage,
        error_class: Option<&str>,
        error_message: Option<&str>,
        retry_count: i32,
        duration_ms: i64,
    ) -> Result<Uuid> {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO ingestion_log
                (id, source_id, stage, error_class, error_message,
                 retry_count, duration_ms, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(id)
        .bind(source_id)
        .bind(stage.as_str())
        .bind(error_class)
        .bind(error_message)
        .bind(retry_count)
        .bind(duration_ms)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(map_pool_error)?;
        Ok(id)
    }

    async fn dead_letter(
        &self,
        source_id: &str,
        stage: IngestionStage,
        reason: &str,
    ) -> Result<Uuid> {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO dead_letter (id, source_id, stage, reason, created_at)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(id)
        .bind(source_id)
        .bind(stage.as_str())
        .bind(reason)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(map_pool_error)?;

        warn!(
            subsystem = "ingest",
            component = "dead_letter",
            source_id = source_id,
            stage = stage.as_str(),
            error = reason,
            "Source dead-lettered for human review"
        );
        Ok(id)
    }

    async fn dead_letter_count(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM dead_letter")
            .fetch_one(&self.pool)
            .await
            .map_err(map_pool_error)?;
        Ok(row.get("count"))
    }

    async fn list_dead_letters(&self, limit: i64) -> Result<Vec<DeadLetter>> {
        let rows = sqlx::query(
            "SELECT id, source_id, stage, reason, created_at
             FROM dead_letter
             ORDER BY created_at DESC
             LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(map_pool_error)?;

        Ok(rows
            .into_iter()
            .map(|row| DeadLetter {
                id: row.get("id"),
                source_id: row.get("source_id"),
                stage: IngestionStage::parse(row.get("stage"))
                    .unwrap_or(IngestionStage::Acquisition),
                reason: row.get("reason"),
                created_at: row.get("created_at"),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_is_stable() {
        let a = compute_content_hash(b"motor overload fault");
        let b = compute_content_hash(b"motor overload fault");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_content_hash_differs_for_different_bytes() {
        let a = compute_content_hash(b"motor overload fault");
        let b = compute_content_hash(b"pump cavitation noise");
        assert_ne!(a, b);
    }
}
