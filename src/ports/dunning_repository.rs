//! Dunning repository port.

use async_trait::async_trait;

use crate::domain::dunning::{DunningAttemptRecord, DunningCampaign};
use crate::domain::foundation::{CampaignId, DomainError, SubscriptionId, Timestamp};

/// Repository port for dunning campaigns and their attempt records.
///
/// Implementations must ensure:
/// - at most one `active` campaign per subscription
/// - `claim_attempt` is an atomic conditional increment
/// - attempt records are append-only; an aborted run of an attempt is
///   recorded as well, so an attempt number may repeat
#[async_trait]
pub trait DunningRepository: Send + Sync {
    /// Inserts `campaign` unless the subscription already has an active one.
    ///
    /// Returns `false` (and writes nothing) if an active campaign exists.
    async fn create_if_no_active(&self, campaign: &DunningCampaign) -> Result<bool, DomainError>;

    /// Persists status, retry time and cancel reason changes.
    ///
    /// # Errors
    ///
    /// - `CampaignNotFound` if it doesn't exist
    async fn update(&self, campaign: &DunningCampaign) -> Result<(), DomainError>;

    async fn find_by_id(&self, id: &CampaignId) -> Result<Option<DunningCampaign>, DomainError>;

    async fn find_active_for_subscription(
        &self,
        subscription_id: &SubscriptionId,
    ) -> Result<Option<DunningCampaign>, DomainError>;

    /// Active campaigns with `next_retry_at <= now`, including one whose
    /// last claimed attempt outlived its lease without resolving.
    async fn due_campaigns(
        &self,
        now: Timestamp,
        limit: u32,
    ) -> Result<Vec<DunningCampaign>, DomainError>;

    /// Sets `current_attempt = expected_attempt + 1` and `next_retry_at =
    /// lease_until` if the campaign is active, still at `expected_attempt`,
    /// and below `max_attempts`.
    ///
    /// Returns `false` if another worker got there first.
    async fn claim_attempt(
        &self,
        id: &CampaignId,
        expected_attempt: u32,
        lease_until: Timestamp,
        now: Timestamp,
    ) -> Result<bool, DomainError>;

    async fn append_attempt(&self, record: &DunningAttemptRecord) -> Result<(), DomainError>;

    /// Attempt records for a campaign, in attempt order then time.
    async fn attempts_for(
        &self,
        campaign_id: &CampaignId,
    ) -> Result<Vec<DunningAttemptRecord>, DomainError>;
}
