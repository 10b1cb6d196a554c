//! RecordPaymentFailureHandler - opens a dunning campaign for a failed payment.

use crate::application::handlers::support::{acquire_lock, load_subscription, open_dunning_campaign};
use crate::application::{BillingPorts, BillingSettings};
use crate::domain::billing::BillingError;
use crate::domain::dunning::{DunningCampaign, FailureContext};
use crate::domain::foundation::SubscriptionId;
use crate::domain::subscription::{Subscription, SubscriptionStatus};

#[derive(Debug, Clone)]
pub struct RecordPaymentFailureCommand {
    pub subscription_id: SubscriptionId,
    pub failure: FailureContext,
}

#[derive(Debug, Clone)]
pub struct RecordPaymentFailureResult {
    /// The subscription's active campaign, new or pre-existing.
    pub campaign: DunningCampaign,

    /// False when a campaign was already active and nothing changed.
    pub created: bool,

    pub subscription: Subscription,
}

/// Starts recovery for a failed payment. Idempotent while a campaign is active.
pub struct RecordPaymentFailureHandler {
    ports: BillingPorts,
    settings: BillingSettings,
}

impl RecordPaymentFailureHandler {
    pub fn new(ports: BillingPorts, settings: BillingSettings) -> Self {
        Self { ports, settings }
    }

    pub async fn handle(
        &self,
        cmd: RecordPaymentFailureCommand,
    ) -> Result<RecordPaymentFailureResult, BillingError> {
        let now = self.ports.clock.now();
        if cmd.failure.amount_cents <= 0 {
            return Err(BillingError::validation(
                "amount_cents",
                "a failed payment must have a positive amount",
            ));
        }

        let _guard = acquire_lock(self.ports.locks.as_ref(), &cmd.subscription_id).await?;
        let mut subscription =
            load_subscription(self.ports.subscriptions.as_ref(), &cmd.subscription_id).await?;

        match subscription.status {
            SubscriptionStatus::Cancelled => {
                return Err(BillingError::already_cancelled(subscription.id));
            }
            SubscriptionStatus::Paused => {
                return Err(BillingError::state_conflict(
                    subscription.status.as_str(),
                    "record a payment failure",
                ));
            }
            _ => {}
        }

        let (campaign, created) = open_dunning_campaign(
            &self.ports,
            &self.settings.dunning_policy,
            &mut subscription,
            cmd.failure,
            now,
        )
        .await?;

        if !created {
            tracing::debug!(
                subscription_id = %subscription.id,
                campaign_id = %campaign.id,
                "Payment failure ignored; campaign already active"
            );
        }

        Ok(RecordPaymentFailureResult {
            campaign,
            created,
            subscription,
        })
    }
}
