//! PostgreSQL implementation of SubscriptionRepository.
//!
//! Line items are stored as JSONB. Updates are conditional on the stored
//! `version`, so a writer holding a stale copy fails instead of overwriting.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::foundation::{
    CustomerId, DomainError, ErrorCode, SubscriptionId, Timestamp,
};
use crate::domain::subscription::{LineItem, Subscription, SubscriptionStatus};
use crate::ports::SubscriptionRepository;

use super::codec::{db_error, invalid_column, to_i32, to_u32};

pub struct PostgresSubscriptionRepository {
    pool: PgPool,
}

impl PostgresSubscriptionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const SELECT_COLUMNS: &str = r#"
    SELECT id, customer_id, currency, status, current_period_start, current_period_end,
           period_days, line_items, total_amount_cents, cancel_at, pause_ends_at,
           cancelled_at, version, created_at, updated_at
    FROM subscriptions
"#;

#[derive(Debug, sqlx::FromRow)]
struct SubscriptionRow {
    id: Uuid,
    customer_id: String,
    currency: String,
    status: String,
    current_period_start: DateTime<Utc>,
    current_period_end: DateTime<Utc>,
    period_days: i32,
    line_items: serde_json::Value,
    total_amount_cents: i64,
    cancel_at: Option<DateTime<Utc>>,
    pause_ends_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<SubscriptionRow> for Subscription {
    type Error = DomainError;

    fn try_from(row: SubscriptionRow) -> Result<Self, Self::Error> {
        let status: SubscriptionStatus =
            row.status.parse().map_err(|e| invalid_column("status", e))?;
        let line_items: Vec<LineItem> =
            serde_json::from_value(row.line_items).map_err(|e| invalid_column("line_items", e))?;

        Ok(Subscription {
            id: SubscriptionId::from_uuid(row.id),
            customer_id: CustomerId::new(row.customer_id)
                .map_err(|e| invalid_column("customer_id", e))?,
            currency: row.currency.trim().to_string(),
            status,
            current_period_start: Timestamp::from_datetime(row.current_period_start),
            current_period_end: Timestamp::from_datetime(row.current_period_end),
            period_days: to_u32("period_days", row.period_days)?,
            line_items,
            total_amount_cents: row.total_amount_cents,
            cancel_at: row.cancel_at.map(Timestamp::from_datetime),
            pause_ends_at: row.pause_ends_at.map(Timestamp::from_datetime),
            cancelled_at: row.cancelled_at.map(Timestamp::from_datetime),
            version: row.version,
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
        })
    }
}

fn line_items_json(subscription: &Subscription) -> Result<serde_json::Value, DomainError> {
    serde_json::to_value(&subscription.line_items)
        .map_err(|e| DomainError::new(ErrorCode::InternalError, format!("Failed to encode line items: {}", e)))
}

#[async_trait]
impl SubscriptionRepository for PostgresSubscriptionRepository {
    async fn save(&self, subscription: &Subscription) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO subscriptions (
                id, customer_id, currency, status, current_period_start, current_period_end,
                period_days, line_items, total_amount_cents, cancel_at, pause_ends_at,
                cancelled_at, version, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(subscription.id.as_uuid())
        .bind(subscription.customer_id.as_str())
        .bind(&subscription.currency)
        .bind(subscription.status.as_str())
        .bind(subscription.current_period_start.as_datetime())
        .bind(subscription.current_period_end.as_datetime())
        .bind(to_i32("period_days", subscription.period_days)?)
        .bind(line_items_json(subscription)?)
        .bind(subscription.total_amount_cents)
        .bind(subscription.cancel_at.map(|t| *t.as_datetime()))
        .bind(subscription.pause_ends_at.map(|t| *t.as_datetime()))
        .bind(subscription.cancelled_at.map(|t| *t.as_datetime()))
        .bind(subscription.version)
        .bind(subscription.created_at.as_datetime())
        .bind(subscription.updated_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(db_err) = &e {
                if db_err.constraint() == Some("subscriptions_pkey") {
                    return DomainError::validation(
                        "id",
                        format!("subscription {} already exists", subscription.id),
                    );
                }
            }
            db_error("save subscription", e)
        })?;

        Ok(())
    }

    async fn update(
        &self,
        subscription: &Subscription,
        expected_version: i64,
    ) -> Result<(), DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE subscriptions SET
                status = $2,
                current_period_start = $3,
                current_period_end = $4,
                line_items = $5,
                total_amount_cents = $6,
                cancel_at = $7,
                pause_ends_at = $8,
                cancelled_at = $9,
                version = $10,
                updated_at = $11
            WHERE id = $1 AND version = $12
            "#,
        )
        .bind(subscription.id.as_uuid())
        .bind(subscription.status.as_str())
        .bind(subscription.current_period_start.as_datetime())
        .bind(subscription.current_period_end.as_datetime())
        .bind(line_items_json(subscription)?)
        .bind(subscription.total_amount_cents)
        .bind(subscription.cancel_at.map(|t| *t.as_datetime()))
        .bind(subscription.pause_ends_at.map(|t| *t.as_datetime()))
        .bind(subscription.cancelled_at.map(|t| *t.as_datetime()))
        .bind(subscription.version)
        .bind(subscription.updated_at.as_datetime())
        .bind(expected_version)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("update subscription", e))?;

        if result.rows_affected() == 1 {
            return Ok(());
        }

        let exists: Option<(i64,)> = sqlx::query_as("SELECT version FROM subscriptions WHERE id = $1")
            .bind(subscription.id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("read subscription version", e))?;

        match exists {
            None => Err(DomainError::new(
                ErrorCode::SubscriptionNotFound,
                format!("subscription {} not found", subscription.id),
            )
            .with_detail("id", subscription.id.to_string())),
            Some((stored,)) => Err(DomainError::new(
                ErrorCode::ConcurrentModification,
                format!(
                    "subscription {} is at version {}, expected {}",
                    subscription.id, stored, expected_version
                ),
            )),
        }
    }

    async fn find_by_id(&self, id: &SubscriptionId) -> Result<Option<Subscription>, DomainError> {
        let row: Option<SubscriptionRow> =
            sqlx::query_as(&format!("{} WHERE id = $1", SELECT_COLUMNS))
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| db_error("find subscription", e))?;

        row.map(Subscription::try_from).transpose()
    }

    async fn find_due_for_renewal(
        &self,
        now: Timestamp,
        limit: u32,
    ) -> Result<Vec<Subscription>, DomainError> {
        let rows: Vec<SubscriptionRow> = sqlx::query_as(&format!(
            r#"{}
            WHERE status IN ('trialing', 'active')
              AND current_period_end <= $1
              AND (cancel_at IS NULL OR cancel_at > $1)
            ORDER BY current_period_end ASC
            LIMIT $2
            "#,
            SELECT_COLUMNS
        ))
        .bind(now.as_datetime())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("find subscriptions due for renewal", e))?;

        rows.into_iter().map(Subscription::try_from).collect()
    }
}
