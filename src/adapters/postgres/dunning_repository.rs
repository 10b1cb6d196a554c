//! PostgreSQL implementation of DunningRepository.
//!
//! The partial unique index `uq_dunning_campaigns_active` guarantees a single
//! active campaign per subscription; attempt claims are conditional updates
//! on `current_attempt`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::dunning::{
    CampaignStatus, DunningAction, DunningAttemptRecord, DunningCampaign, FailureContext,
};
use crate::domain::foundation::{
    AttemptRecordId, CampaignId, DomainError, ErrorCode, SubscriptionId, Timestamp,
};
use crate::ports::DunningRepository;

use super::codec::{db_error, invalid_column, to_i32, to_u32};

pub struct PostgresDunningRepository {
    pool: PgPool,
}

impl PostgresDunningRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const SELECT_CAMPAIGN: &str = r#"
    SELECT id, subscription_id, reason_code, provider_reference, failed_period_start,
           failed_at, current_attempt, max_attempts, next_retry_at, status,
           original_amount_cents, cancel_reason, created_at, updated_at
    FROM dunning_campaigns
"#;

#[derive(Debug, sqlx::FromRow)]
struct CampaignRow {
    id: Uuid,
    subscription_id: Uuid,
    reason_code: String,
    provider_reference: Option<String>,
    failed_period_start: DateTime<Utc>,
    failed_at: DateTime<Utc>,
    current_attempt: i32,
    max_attempts: i32,
    next_retry_at: Option<DateTime<Utc>>,
    status: String,
    original_amount_cents: i64,
    cancel_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<CampaignRow> for DunningCampaign {
    type Error = DomainError;

    fn try_from(row: CampaignRow) -> Result<Self, Self::Error> {
        let status: CampaignStatus = row.status.parse().map_err(|e| invalid_column("status", e))?;
        Ok(DunningCampaign {
            id: CampaignId::from_uuid(row.id),
            subscription_id: SubscriptionId::from_uuid(row.subscription_id),
            failure: FailureContext {
                reason_code: row.reason_code,
                provider_reference: row.provider_reference,
                period_start: Timestamp::from_datetime(row.failed_period_start),
                amount_cents: row.original_amount_cents,
            },
            failed_at: Timestamp::from_datetime(row.failed_at),
            current_attempt: to_u32("current_attempt", row.current_attempt)?,
            max_attempts: to_u32("max_attempts", row.max_attempts)?,
            next_retry_at: row.next_retry_at.map(Timestamp::from_datetime),
            status,
            original_amount_cents: row.original_amount_cents,
            cancel_reason: row.cancel_reason,
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct AttemptRow {
    id: Uuid,
    campaign_id: Uuid,
    attempt_number: i32,
    attempted_at: DateTime<Utc>,
    outcome: String,
    actions_taken: serde_json::Value,
    failure_reason: Option<String>,
}

impl TryFrom<AttemptRow> for DunningAttemptRecord {
    type Error = DomainError;

    fn try_from(row: AttemptRow) -> Result<Self, Self::Error> {
        let actions_taken: Vec<DunningAction> = serde_json::from_value(row.actions_taken)
            .map_err(|e| invalid_column("actions_taken", e))?;
        Ok(DunningAttemptRecord {
            id: AttemptRecordId::from_uuid(row.id),
            campaign_id: CampaignId::from_uuid(row.campaign_id),
            attempt_number: to_u32("attempt_number", row.attempt_number)?,
            attempted_at: Timestamp::from_datetime(row.attempted_at),
            outcome: row.outcome.parse().map_err(|e| invalid_column("outcome", e))?,
            actions_taken,
            failure_reason: row.failure_reason,
        })
    }
}

#[async_trait]
impl DunningRepository for PostgresDunningRepository {
    async fn create_if_no_active(&self, campaign: &DunningCampaign) -> Result<bool, DomainError> {
        let result = sqlx::query(
            r#"
            INSERT INTO dunning_campaigns (
                id, subscription_id, reason_code, provider_reference, failed_period_start,
                failed_at, current_attempt, max_attempts, next_retry_at, status,
                original_amount_cents, cancel_reason, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT (subscription_id) WHERE status = 'active' DO NOTHING
            "#,
        )
        .bind(campaign.id.as_uuid())
        .bind(campaign.subscription_id.as_uuid())
        .bind(&campaign.failure.reason_code)
        .bind(&campaign.failure.provider_reference)
        .bind(campaign.failure.period_start.as_datetime())
        .bind(campaign.failed_at.as_datetime())
        .bind(to_i32("current_attempt", campaign.current_attempt)?)
        .bind(to_i32("max_attempts", campaign.max_attempts)?)
        .bind(campaign.next_retry_at.map(|t| *t.as_datetime()))
        .bind(campaign.status.as_str())
        .bind(campaign.original_amount_cents)
        .bind(&campaign.cancel_reason)
        .bind(campaign.created_at.as_datetime())
        .bind(campaign.updated_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("create dunning campaign", e))?;

        Ok(result.rows_affected() == 1)
    }

    async fn update(&self, campaign: &DunningCampaign) -> Result<(), DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE dunning_campaigns SET
                current_attempt = $2,
                next_retry_at = $3,
                status = $4,
                cancel_reason = $5,
                updated_at = $6
            WHERE id = $1
            "#,
        )
        .bind(campaign.id.as_uuid())
        .bind(to_i32("current_attempt", campaign.current_attempt)?)
        .bind(campaign.next_retry_at.map(|t| *t.as_datetime()))
        .bind(campaign.status.as_str())
        .bind(&campaign.cancel_reason)
        .bind(campaign.updated_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("update dunning campaign", e))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::new(
                ErrorCode::CampaignNotFound,
                format!("campaign {} not found", campaign.id),
            )
            .with_detail("id", campaign.id.to_string()));
        }
        Ok(())
    }

    async fn find_by_id(&self, id: &CampaignId) -> Result<Option<DunningCampaign>, DomainError> {
        let row: Option<CampaignRow> = sqlx::query_as(&format!("{} WHERE id = $1", SELECT_CAMPAIGN))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("find dunning campaign", e))?;

        row.map(DunningCampaign::try_from).transpose()
    }

    async fn find_active_for_subscription(
        &self,
        subscription_id: &SubscriptionId,
    ) -> Result<Option<DunningCampaign>, DomainError> {
        let row: Option<CampaignRow> = sqlx::query_as(&format!(
            "{} WHERE subscription_id = $1 AND status = 'active'",
            SELECT_CAMPAIGN
        ))
        .bind(subscription_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("find active dunning campaign", e))?;

        row.map(DunningCampaign::try_from).transpose()
    }

    async fn due_campaigns(
        &self,
        now: Timestamp,
        limit: u32,
    ) -> Result<Vec<DunningCampaign>, DomainError> {
        let rows: Vec<CampaignRow> = sqlx::query_as(&format!(
            r#"{}
            WHERE status = 'active'
              AND next_retry_at <= $1
            ORDER BY next_retry_at ASC
            LIMIT $2
            "#,
            SELECT_CAMPAIGN
        ))
        .bind(now.as_datetime())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("find due dunning campaigns", e))?;

        rows.into_iter().map(DunningCampaign::try_from).collect()
    }

    async fn claim_attempt(
        &self,
        id: &CampaignId,
        expected_attempt: u32,
        lease_until: Timestamp,
        now: Timestamp,
    ) -> Result<bool, DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE dunning_campaigns
            SET current_attempt = current_attempt + 1,
                next_retry_at = $3,
                updated_at = $4
            WHERE id = $1
              AND status = 'active'
              AND current_attempt = $2
              AND current_attempt < max_attempts
            "#,
        )
        .bind(id.as_uuid())
        .bind(to_i32("current_attempt", expected_attempt)?)
        .bind(lease_until.as_datetime())
        .bind(now.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("claim dunning attempt", e))?;

        Ok(result.rows_affected() == 1)
    }

    async fn append_attempt(&self, record: &DunningAttemptRecord) -> Result<(), DomainError> {
        let actions = serde_json::to_value(&record.actions_taken).map_err(|e| {
            DomainError::new(ErrorCode::InternalError, format!("Failed to encode actions: {}", e))
        })?;

        sqlx::query(
            r#"
            INSERT INTO dunning_attempts (
                id, campaign_id, attempt_number, attempted_at, outcome, actions_taken, failure_reason
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(record.id.as_uuid())
        .bind(record.campaign_id.as_uuid())
        .bind(to_i32("attempt_number", record.attempt_number)?)
        .bind(record.attempted_at.as_datetime())
        .bind(record.outcome.as_str())
        .bind(actions)
        .bind(&record.failure_reason)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("append dunning attempt", e))?;

        Ok(())
    }

    async fn attempts_for(
        &self,
        campaign_id: &CampaignId,
    ) -> Result<Vec<DunningAttemptRecord>, DomainError> {
        let rows: Vec<AttemptRow> = sqlx::query_as(
            r#"
            SELECT id, campaign_id, attempt_number, attempted_at, outcome, actions_taken, failure_reason
            FROM dunning_attempts
            WHERE campaign_id = $1
            ORDER BY attempt_number ASC, attempted_at ASC
            "#,
        )
        .bind(campaign_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("list dunning attempts", e))?;

        rows.into_iter().map(DunningAttemptRecord::try_from).collect()
    }
}
