//! PostgreSQL implementation of ReconciliationLog.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::billing::ReconciliationRecord;
use crate::domain::foundation::{DomainError, ReconciliationId, SubscriptionId, Timestamp};
use crate::ports::ReconciliationLog;

use super::codec::{db_error, invalid_column};

pub struct PostgresReconciliationLog {
    pool: PgPool,
}

impl PostgresReconciliationLog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ReconciliationRow {
    id: Uuid,
    subscription_id: Uuid,
    kind: String,
    amount_cents: i64,
    idempotency_key: String,
    reason: String,
    recorded_at: DateTime<Utc>,
}

impl TryFrom<ReconciliationRow> for ReconciliationRecord {
    type Error = DomainError;

    fn try_from(row: ReconciliationRow) -> Result<Self, Self::Error> {
        Ok(ReconciliationRecord {
            id: ReconciliationId::from_uuid(row.id),
            subscription_id: SubscriptionId::from_uuid(row.subscription_id),
            kind: row.kind.parse().map_err(|e| invalid_column("kind", e))?,
            amount_cents: row.amount_cents,
            idempotency_key: row.idempotency_key,
            reason: row.reason,
            recorded_at: Timestamp::from_datetime(row.recorded_at),
        })
    }
}

#[async_trait]
impl ReconciliationLog for PostgresReconciliationLog {
    async fn record(&self, record: &ReconciliationRecord) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO reconciliation_records (
                id, subscription_id, kind, amount_cents, idempotency_key, reason, recorded_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(record.id.as_uuid())
        .bind(record.subscription_id.as_uuid())
        .bind(record.kind.as_str())
        .bind(record.amount_cents)
        .bind(&record.idempotency_key)
        .bind(&record.reason)
        .bind(record.recorded_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("record reconciliation", e))?;

        Ok(())
    }

    async fn for_subscription(
        &self,
        subscription_id: &SubscriptionId,
    ) -> Result<Vec<ReconciliationRecord>, DomainError> {
        let rows: Vec<ReconciliationRow> = sqlx::query_as(
            r#"
            SELECT id, subscription_id, kind, amount_cents, idempotency_key, reason, recorded_at
            FROM reconciliation_records
            WHERE subscription_id = $1
            ORDER BY recorded_at ASC
            "#,
        )
        .bind(subscription_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("list reconciliation records", e))?;

        rows.into_iter().map(ReconciliationRecord::try_from).collect()
    }
}
