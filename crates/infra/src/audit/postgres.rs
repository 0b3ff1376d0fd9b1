//! Postgres-backed audit store.
//!
//! Runs against its own pool (usually its own database); nothing here joins
//! against the stock tables.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::instrument;

use stockroom_core::UserId;

use super::store::{AuditStore, AuditStoreError};
use super::types::AuditEntry;

#[derive(Debug, Clone)]
pub struct PostgresAuditStore {
    pool: Arc<PgPool>,
}

impl PostgresAuditStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Create the `audit_log` table if needed.
    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> Result<(), AuditStoreError> {
        sqlx::migrate!("./migrations/audit")
            .run(&*self.pool)
            .await
            .map_err(|e| AuditStoreError::Backend(format!("audit schema migration failed: {e}")))
    }
}

#[async_trait]
impl AuditStore for PostgresAuditStore {
    #[instrument(skip(self, entry), fields(audit_id = %entry.id, action = %entry.action), err)]
    async fn append(&self, entry: AuditEntry) -> Result<(), AuditStoreError> {
        sqlx::query(
            r#"
            INSERT INTO audit_log (
                id, user_id, username, role, action, details, recorded_at, ip_address, user_agent
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(entry.id)
        .bind(entry.user_id.as_ref().map(UserId::get))
        .bind(&entry.username)
        .bind(&entry.role)
        .bind(&entry.action)
        .bind(&entry.details)
        .bind(entry.timestamp)
        .bind(entry.ip_address.as_deref())
        .bind(entry.user_agent.as_deref())
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("append", e))?;
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn recent(&self, limit: usize) -> Result<Vec<AuditEntry>, AuditStoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, username, role, action, details, recorded_at, ip_address, user_agent
            FROM audit_log
            ORDER BY recorded_at DESC, id DESC
            LIMIT $1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("recent", e))?;

        rows.iter().map(entry_from_row).collect()
    }

    #[instrument(skip(self), fields(user_id = %user_id), err)]
    async fn for_user(&self, user_id: UserId, limit: usize) -> Result<Vec<AuditEntry>, AuditStoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, username, role, action, details, recorded_at, ip_address, user_agent
            FROM audit_log
            WHERE user_id = $1
            ORDER BY recorded_at DESC, id DESC
            LIMIT $2
            "#,
        )
        .bind(user_id.get())
        .bind(limit as i64)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("for_user", e))?;

        rows.iter().map(entry_from_row).collect()
    }
}

/// Connection-level failures are retryable; everything else is not.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> AuditStoreError {
    match err {
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
            AuditStoreError::Unavailable(format!("{operation}: {err}"))
        }
        sqlx::Error::Database(db_err) => {
            AuditStoreError::Backend(format!("database error in {operation}: {}", db_err.message()))
        }
        _ => AuditStoreError::Backend(format!("sqlx error in {operation}: {err}")),
    }
}

fn entry_from_row(row: &sqlx::postgres::PgRow) -> Result<AuditEntry, AuditStoreError> {
    let decode = |e: sqlx::Error| AuditStoreError::Backend(format!("failed to decode audit row: {e}"));
    let user_id: Option<i64> = row.try_get("user_id").map_err(decode)?;
    Ok(AuditEntry {
        id: row.try_get("id").map_err(decode)?,
        user_id: user_id.map(UserId::new),
        username: row.try_get("username").map_err(decode)?,
        role: row.try_get("role").map_err(decode)?,
        action: row.try_get("action").map_err(decode)?,
        details: row.try_get("details").map_err(decode)?,
        timestamp: row.try_get("recorded_at").map_err(decode)?,
        ip_address: row.try_get("ip_address").map_err(decode)?,
        user_agent: row.try_get("user_agent").map_err(decode)?,
    })
}
