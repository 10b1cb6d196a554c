//! PostgreSQL implementation of ScheduledChangeLedger.
//!
//! Status changes are conditional updates, so the database decides which
//! worker wins a claim. Superseding runs in one transaction with the insert;
//! the partial unique index on pending changes backs it up.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::foundation::{
    DomainError, ErrorCode, ScheduledChangeId, SubscriptionId, Timestamp,
};
use crate::domain::scheduling::{ChangeStatus, ChangeType, ScheduledChange};
use crate::domain::subscription::LineItem;
use crate::ports::ScheduledChangeLedger;

use super::codec::{db_error, invalid_column};

pub struct PostgresScheduledChangeLedger {
    pool: PgPool,
}

impl PostgresScheduledChangeLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Explains why a conditional status update touched no row.
    async fn status_mismatch(
        &self,
        id: &ScheduledChangeId,
        attempted: ChangeStatus,
    ) -> Result<DomainError, DomainError> {
        let current: Option<(String,)> =
            sqlx::query_as("SELECT status FROM scheduled_changes WHERE id = $1")
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| db_error("read scheduled change status", e))?;

        Ok(match current {
            None => not_found(id),
            Some((status,)) => DomainError::new(
                ErrorCode::InvalidStateTransition,
                format!("Cannot transition from {} to {}", status, attempted),
            )
            .with_detail("current", status),
        })
    }
}

fn not_found(id: &ScheduledChangeId) -> DomainError {
    DomainError::new(
        ErrorCode::ScheduledChangeNotFound,
        format!("scheduled change {} not found", id),
    )
    .with_detail("id", id.to_string())
}

const SELECT_COLUMNS: &str = r#"
    SELECT id, subscription_id, change_type, scheduled_for, from_snapshot, to_snapshot,
           status, reason, error_detail, created_at, updated_at
    FROM scheduled_changes
"#;

#[derive(Debug, sqlx::FromRow)]
struct ScheduledChangeRow {
    id: Uuid,
    subscription_id: Uuid,
    change_type: String,
    scheduled_for: DateTime<Utc>,
    from_snapshot: serde_json::Value,
    to_snapshot: serde_json::Value,
    status: String,
    reason: Option<String>,
    error_detail: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ScheduledChangeRow> for ScheduledChange {
    type Error = DomainError;

    fn try_from(row: ScheduledChangeRow) -> Result<Self, Self::Error> {
        let from_snapshot: Vec<LineItem> = serde_json::from_value(row.from_snapshot)
            .map_err(|e| invalid_column("from_snapshot", e))?;
        let to_snapshot: Vec<LineItem> = serde_json::from_value(row.to_snapshot)
            .map_err(|e| invalid_column("to_snapshot", e))?;

        Ok(ScheduledChange {
            id: ScheduledChangeId::from_uuid(row.id),
            subscription_id: SubscriptionId::from_uuid(row.subscription_id),
            change_type: row
                .change_type
                .parse()
                .map_err(|e| invalid_column("change_type", e))?,
            scheduled_for: Timestamp::from_datetime(row.scheduled_for),
            from_snapshot,
            to_snapshot,
            status: row.status.parse().map_err(|e| invalid_column("status", e))?,
            reason: row.reason,
            error_detail: row.error_detail,
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
        })
    }
}

fn snapshot_json(items: &[LineItem]) -> Result<serde_json::Value, DomainError> {
    serde_json::to_value(items).map_err(|e| {
        DomainError::new(ErrorCode::InternalError, format!("Failed to encode snapshot: {}", e))
    })
}

#[async_trait]
impl ScheduledChangeLedger for PostgresScheduledChangeLedger {
    async fn schedule(
        &self,
        change: &ScheduledChange,
    ) -> Result<Option<ScheduledChangeId>, DomainError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("begin transaction", e))?;

        let superseded: Option<(Uuid,)> = sqlx::query_as(
            r#"
            UPDATE scheduled_changes
            SET status = 'cancelled', updated_at = $3
            WHERE subscription_id = $1 AND change_type = $2 AND status = 'scheduled'
            RETURNING id
            "#,
        )
        .bind(change.subscription_id.as_uuid())
        .bind(change.change_type.as_str())
        .bind(change.created_at.as_datetime())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| db_error("supersede scheduled change", e))?;

        sqlx::query(
            r#"
            INSERT INTO scheduled_changes (
                id, subscription_id, change_type, scheduled_for, from_snapshot, to_snapshot,
                status, reason, error_detail, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(change.id.as_uuid())
        .bind(change.subscription_id.as_uuid())
        .bind(change.change_type.as_str())
        .bind(change.scheduled_for.as_datetime())
        .bind(snapshot_json(&change.from_snapshot)?)
        .bind(snapshot_json(&change.to_snapshot)?)
        .bind(change.status.as_str())
        .bind(&change.reason)
        .bind(&change.error_detail)
        .bind(change.created_at.as_datetime())
        .bind(change.updated_at.as_datetime())
        .execute(&mut *tx)
        .await
        .map_err(|e| db_error("insert scheduled change", e))?;

        tx.commit()
            .await
            .map_err(|e| db_error("commit scheduled change", e))?;

        Ok(superseded.map(|(id,)| ScheduledChangeId::from_uuid(id)))
    }

    async fn due_changes(
        &self,
        now: Timestamp,
        limit: u32,
    ) -> Result<Vec<ScheduledChange>, DomainError> {
        let rows: Vec<ScheduledChangeRow> = sqlx::query_as(&format!(
            r#"{}
            WHERE status = 'scheduled' AND scheduled_for <= $1
            ORDER BY scheduled_for ASC, created_at ASC
            LIMIT $2
            "#,
            SELECT_COLUMNS
        ))
        .bind(now.as_datetime())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("find due scheduled changes", e))?;

        rows.into_iter().map(ScheduledChange::try_from).collect()
    }

    async fn claim(&self, id: &ScheduledChangeId, now: Timestamp) -> Result<bool, DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE scheduled_changes
            SET status = 'processing', updated_at = $2
            WHERE id = $1 AND status = 'scheduled'
            "#,
        )
        .bind(id.as_uuid())
        .bind(now.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("claim scheduled change", e))?;

        if result.rows_affected() == 1 {
            return Ok(true);
        }

        let exists: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM scheduled_changes WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("find scheduled change", e))?;

        match exists {
            Some(_) => Ok(false),
            None => Err(not_found(id)),
        }
    }

    async fn complete(&self, id: &ScheduledChangeId, now: Timestamp) -> Result<(), DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE scheduled_changes
            SET status = 'completed', updated_at = $2
            WHERE id = $1 AND status = 'processing'
            "#,
        )
        .bind(id.as_uuid())
        .bind(now.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("complete scheduled change", e))?;

        if result.rows_affected() == 0 {
            return Err(self.status_mismatch(id, ChangeStatus::Completed).await?);
        }
        Ok(())
    }

    async fn fail(
        &self,
        id: &ScheduledChangeId,
        detail: &str,
        now: Timestamp,
    ) -> Result<(), DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE scheduled_changes
            SET status = 'failed', error_detail = $2, updated_at = $3
            WHERE id = $1 AND status = 'processing'
            "#,
        )
        .bind(id.as_uuid())
        .bind(detail)
        .bind(now.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("fail scheduled change", e))?;

        if result.rows_affected() == 0 {
            return Err(self.status_mismatch(id, ChangeStatus::Failed).await?);
        }
        Ok(())
    }

    async fn cancel_pending(
        &self,
        subscription_id: &SubscriptionId,
        change_type: ChangeType,
        now: Timestamp,
    ) -> Result<bool, DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE scheduled_changes
            SET status = 'cancelled', updated_at = $3
            WHERE subscription_id = $1 AND change_type = $2 AND status = 'scheduled'
            "#,
        )
        .bind(subscription_id.as_uuid())
        .bind(change_type.as_str())
        .bind(now.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("cancel pending scheduled change", e))?;

        Ok(result.rows_affected() > 0)
    }

    async fn find_pending(
        &self,
        subscription_id: &SubscriptionId,
    ) -> Result<Vec<ScheduledChange>, DomainError> {
        let rows: Vec<ScheduledChangeRow> = sqlx::query_as(&format!(
            "{} WHERE subscription_id = $1 AND status = 'scheduled' ORDER BY scheduled_for ASC",
            SELECT_COLUMNS
        ))
        .bind(subscription_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("find pending scheduled changes", e))?;

        rows.into_iter().map(ScheduledChange::try_from).collect()
    }

    async fn find_by_id(
        &self,
        id: &ScheduledChangeId,
    ) -> Result<Option<ScheduledChange>, DomainError> {
        let row: Option<ScheduledChangeRow> =
            sqlx::query_as(&format!("{} WHERE id = $1", SELECT_COLUMNS))
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| db_error("find scheduled change", e))?;

        row.map(ScheduledChange::try_from).transpose()
    }
}
