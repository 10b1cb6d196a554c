//! CancelDunningCampaignHandler - stops recovery without touching the subscription.

use crate::application::handlers::support::acquire_lock;
use crate::application::BillingPorts;
use crate::domain::billing::{BillingError, EntityKind};
use crate::domain::dunning::DunningCampaign;
use crate::domain::foundation::CampaignId;

#[derive(Debug, Clone)]
pub struct CancelDunningCampaignCommand {
    pub campaign_id: CampaignId,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct CancelDunningCampaignResult {
    pub campaign: DunningCampaign,
}

pub struct CancelDunningCampaignHandler {
    ports: BillingPorts,
}

impl CancelDunningCampaignHandler {
    pub fn new(ports: BillingPorts) -> Self {
        Self { ports }
    }

    pub async fn handle(
        &self,
        cmd: CancelDunningCampaignCommand,
    ) -> Result<CancelDunningCampaignResult, BillingError> {
        if cmd.reason.trim().is_empty() {
            return Err(BillingError::validation("reason", "a cancel reason is required"));
        }
        let now = self.ports.clock.now();
        let campaign = self.find(&cmd.campaign_id).await?;

        let _guard = acquire_lock(self.ports.locks.as_ref(), &campaign.subscription_id).await?;
        let mut campaign = self.find(&cmd.campaign_id).await?;

        campaign.cancel(cmd.reason, now)?;
        self.ports.dunning.update(&campaign).await?;

        tracing::info!(
            campaign_id = %campaign.id,
            subscription_id = %campaign.subscription_id,
            attempts_used = campaign.current_attempt,
            "Dunning campaign cancelled"
        );

        Ok(CancelDunningCampaignResult { campaign })
    }

    async fn find(&self, id: &CampaignId) -> Result<DunningCampaign, BillingError> {
        self.ports
            .dunning
            .find_by_id(id)
            .await?
            .ok_or_else(|| BillingError::not_found(EntityKind::DunningCampaign, id))
    }
}
