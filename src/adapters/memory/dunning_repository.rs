//! In-memory dunning repository.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;

use crate::domain::dunning::{DunningAttemptRecord, DunningCampaign};
use crate::domain::foundation::{CampaignId, DomainError, ErrorCode, SubscriptionId, Timestamp};
use crate::ports::DunningRepository;

#[derive(Default)]
struct State {
    campaigns: HashMap<CampaignId, DunningCampaign>,
    attempts: Vec<DunningAttemptRecord>,
}

#[derive(Default)]
pub struct InMemoryDunningRepository {
    state: Mutex<State>,
}

impl InMemoryDunningRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// All campaigns ever opened for a subscription.
    pub async fn campaigns_for(&self, subscription_id: &SubscriptionId) -> Vec<DunningCampaign> {
        let state = self.state.lock().await;
        let mut campaigns: Vec<DunningCampaign> = state
            .campaigns
            .values()
            .filter(|c| c.subscription_id == *subscription_id)
            .cloned()
            .collect();
        campaigns.sort_by_key(|c| c.created_at);
        campaigns
    }
}

fn not_found(id: &CampaignId) -> DomainError {
    DomainError::new(ErrorCode::CampaignNotFound, format!("campaign {} not found", id))
        .with_detail("id", id.to_string())
}

#[async_trait]
impl DunningRepository for InMemoryDunningRepository {
    async fn create_if_no_active(&self, campaign: &DunningCampaign) -> Result<bool, DomainError> {
        let mut state = self.state.lock().await;
        let has_active = state
            .campaigns
            .values()
            .any(|c| c.subscription_id == campaign.subscription_id && c.is_active());
        if has_active {
            return Ok(false);
        }
        state.campaigns.insert(campaign.id, campaign.clone());
        Ok(true)
    }

    async fn update(&self, campaign: &DunningCampaign) -> Result<(), DomainError> {
        let mut state = self.state.lock().await;
        let stored = state
            .campaigns
            .get_mut(&campaign.id)
            .ok_or_else(|| not_found(&campaign.id))?;
        *stored = campaign.clone();
        Ok(())
    }

    async fn find_by_id(&self, id: &CampaignId) -> Result<Option<DunningCampaign>, DomainError> {
        Ok(self.state.lock().await.campaigns.get(id).cloned())
    }

    async fn find_active_for_subscription(
        &self,
        subscription_id: &SubscriptionId,
    ) -> Result<Option<DunningCampaign>, DomainError> {
        let state = self.state.lock().await;
        Ok(state
            .campaigns
            .values()
            .find(|c| c.subscription_id == *subscription_id && c.is_active())
            .cloned())
    }

    async fn due_campaigns(
        &self,
        now: Timestamp,
        limit: u32,
    ) -> Result<Vec<DunningCampaign>, DomainError> {
        let state = self.state.lock().await;
        let mut due: Vec<DunningCampaign> = state
            .campaigns
            .values()
            .filter(|c| c.is_due(now))
            .cloned()
            .collect();
        due.sort_by_key(|c| c.next_retry_at);
        due.truncate(limit as usize);
        Ok(due)
    }

    async fn claim_attempt(
        &self,
        id: &CampaignId,
        expected_attempt: u32,
        lease_until: Timestamp,
        now: Timestamp,
    ) -> Result<bool, DomainError> {
        let mut state = self.state.lock().await;
        let campaign = state.campaigns.get_mut(id).ok_or_else(|| not_found(id))?;
        if !campaign.is_active()
            || campaign.current_attempt != expected_attempt
            || campaign.current_attempt >= campaign.max_attempts
        {
            return Ok(false);
        }
        campaign.current_attempt += 1;
        campaign.next_retry_at = Some(lease_until);
        campaign.updated_at = now;
        Ok(true)
    }

    async fn append_attempt(&self, record: &DunningAttemptRecord) -> Result<(), DomainError> {
        self.state.lock().await.attempts.push(record.clone());
        Ok(())
    }

    async fn attempts_for(
        &self,
        campaign_id: &CampaignId,
    ) -> Result<Vec<DunningAttemptRecord>, DomainError> {
        let state = self.state.lock().await;
        let mut attempts: Vec<DunningAttemptRecord> = state
            .attempts
            .iter()
            .filter(|a| a.campaign_id == *campaign_id)
            .cloned()
            .collect();
        attempts.sort_by_key(|a| (a.attempt_number, a.attempted_at));
        Ok(attempts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::dunning::{DunningAction, DunningPolicy, FailureContext, FinalAction};

    fn jan_1() -> Timestamp {
        Timestamp::from_unix_secs(1_704_067_200).unwrap()
    }

    fn campaign(subscription_id: SubscriptionId) -> DunningCampaign {
        let policy =
            DunningPolicy::uniform(&[1, 3], &[DunningAction::RetryCharge], FinalAction::Cancel)
                .unwrap();
        DunningCampaign::start(
            subscription_id,
            FailureContext {
                reason_code: "card_declined".to_string(),
                provider_reference: None,
                period_start: jan_1(),
                amount_cents: 1_000,
            },
            jan_1(),
            &policy,
        )
    }

    #[tokio::test]
    async fn second_active_campaign_is_refused() {
        let repo = InMemoryDunningRepository::new();
        let sub = SubscriptionId::new();

        assert!(repo.create_if_no_active(&campaign(sub)).await.unwrap());
        assert!(!repo.create_if_no_active(&campaign(sub)).await.unwrap());
        assert_eq!(repo.campaigns_for(&sub).await.len(), 1);
    }

    #[tokio::test]
    async fn claim_is_conditional_on_expected_attempt() {
        let repo = InMemoryDunningRepository::new();
        let c = campaign(SubscriptionId::new());
        repo.create_if_no_active(&c).await.unwrap();

        let lease = jan_1().add_days(1).plus_secs(300);
        assert!(repo.claim_attempt(&c.id, 0, lease, jan_1()).await.unwrap());
        assert!(!repo.claim_attempt(&c.id, 0, lease, jan_1()).await.unwrap());

        let stored = repo.find_by_id(&c.id).await.unwrap().unwrap();
        assert_eq!(stored.current_attempt, 1);
        assert_eq!(stored.next_retry_at, Some(lease));
    }

    #[tokio::test]
    async fn claim_never_exceeds_max_attempts() {
        let repo = InMemoryDunningRepository::new();
        let c = campaign(SubscriptionId::new());
        repo.create_if_no_active(&c).await.unwrap();

        assert!(repo.claim_attempt(&c.id, 0, jan_1(), jan_1()).await.unwrap());
        assert!(repo.claim_attempt(&c.id, 1, jan_1(), jan_1()).await.unwrap());
        assert!(!repo.claim_attempt(&c.id, 2, jan_1(), jan_1()).await.unwrap());
    }
}
