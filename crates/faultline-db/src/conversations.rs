//! Conversation state repository with optimistic-concurrency advance.
//!
//! Mutation of a single (user, flow) state is serialized through a
//! version-checked UPDATE: the loser of a concurrent `advance` race gets
//! `false` back and re-reads, never clobbering the winner's write. No lock
//! is held in-process.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres, Row};
use tracing::{debug, info};
use uuid::Uuid;

use faultline_core::{
    ConversationRepository, ConversationState, ConversationStatus, Error, FlowType, Result,
};

use crate::pool::map_pool_error;

/// PostgreSQL implementation of [`ConversationRepository`].
///
/// The one-active-state-per-(user, flow) invariant is enforced by a
/// partial unique index on `(user_id, flow_type) WHERE status = 'active'`.
pub struct PgConversationRepository {
    pool: Pool<Postgres>,
}

impl PgConversationRepository {
    /// Create a new PgConversationRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn from_row(row: sqlx::postgres::PgRow) -> Result<ConversationState> {
        let flow_raw: String = row.get("flow_type");
        let flow_type = FlowType::parse(&flow_raw)
            .ok_or_else(|| Error::Internal(format!("unknown flow type '{}'", flow_raw)))?;
        Ok(ConversationState {
            id: row.get("id"),
            user_id: row.get("user_id"),
            flow_type,
            current_step: row.get("current_step"),
            fields: row.get("fields"),
            status: ConversationStatus::parse_or_active(row.get("status")),
            version: row.get("version"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
            expires_at: row.get("expires_at"),
        })
    }
}

#[async_trait]
impl ConversationRepository for PgConversationRepository {
    async fn find_active(
        &self,
        user_id: &str,
        flow_type: FlowType,
    ) -> Result<Option<ConversationState>> {
        let row = sqlx::query(
            "SELECT id, user_id, flow_type, current_step, fields, status,
                    version, created_at, updated_at, expires_at
             FROM conversation_state
             WHERE user_id = $1 AND flow_type = $2 AND status = 'active'",
        )
        .bind(user_id)
        .bind(flow_type.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_pool_error)?;

        row.map(Self::from_row).transpose()
    }

    async fn fetch(&self, id: Uuid) -> Result<ConversationState> {
        let row = sqlx::query(
            "SELECT id, user_id, flow_type, current_step, fields, status,
                    version, created_at, updated_at, expires_at
             FROM conversation_state
             WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_pool_error)?
        .ok_or(Error::ConversationNotFound(id))?;

        Self::from_row(row)
    }

    async fn insert(&self, state: &ConversationState) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO conversation_state
                (id, user_id, flow_type, current_step, fields, status,
                 version, created_at, updated_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(state.id)
        .bind(&state.user_id)
        .bind(state.flow_type.as_str())
        .bind(state.current_step)
        .bind(&state.fields)
        .bind(state.status.as_str())
        .bind(state.version)
        .bind(state.created_at)
        .bind(state.updated_at)
        .bind(state.expires_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            // Partial unique index violation: an active state already exists.
            sqlx::Error::Database(ref db) if db.is_unique_violation() => Error::Validation(
                format!(
                    "active {} flow already exists for user {}",
                    state.flow_type.as_str(),
                    state.user_id
                ),
            ),
            other => map_pool_error(other),
        })?;

        debug!(
            subsystem = "conversation",
            component = "repository",
            op = "insert",
            conversation_id = %state.id,
            user_id = %state.user_id,
            "Conversation state created"
        );
        Ok(())
    }

    async fn try_advance(
        &self,
        state: &ConversationState,
        expected_version: i32,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE conversation_state
            SET current_step = $2, fields = $3, status = $4,
                version = version + 1, updated_at = $5, expires_at = $6
            WHERE id = $1 AND version = $7 AND status = 'active'
            "#,
        )
        .bind(state.id)
        .bind(state.current_step)
        .bind(&state.fields)
        .bind(state.status.as_str())
        .bind(state.updated_at)
        .bind(state.expires_at)
        .bind(expected_version)
        .execute(&self.pool)
        .await
        .map_err(map_pool_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn cancel(&self, id: Uuid) -> Result<()> {
        let result = sqlx::query(
            "UPDATE conversation_state
             SET status = 'cancelled', updated_at = $2
             WHERE id = $1 AND status = 'active'",
        )
        .bind(id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(map_pool_error)?;

        if result.rows_affected() == 1 {
            info!(
                subsystem = "conversation",
                component = "repository",
                op = "cancel",
                conversation_id = %id,
                "Cancelled prior conversation state"
            );
        }
        Ok(())
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM conversation_state WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(map_pool_error)?;

        let removed = result.rows_affected();
        if removed > 0 {
            info!(
                subsystem = "conversation",
                component = "repository",
                op = "expire_sweep",
                removed,
                "Expired conversation states removed"
            );
        }
        Ok(removed)
    }
}
