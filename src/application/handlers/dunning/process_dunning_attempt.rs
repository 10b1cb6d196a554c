//! ProcessDunningAttemptHandler - runs one claimed dunning step.

use std::collections::HashMap;

use crate::application::charging::{charge_request, charge_with_timeout};
use crate::application::handlers::support::{acquire_lock, load_subscription, persist, terminate};
use crate::application::{BillingPorts, BillingSettings};
use crate::domain::billing::{BillingError, ChargePurpose, EntityKind};
use crate::domain::dunning::{
    AttemptOutcome, AttemptProgress, DunningAction, DunningAttemptRecord, DunningCampaign,
    FinalAction,
};
use crate::domain::foundation::{CampaignId, Timestamp};
use crate::domain::subscription::{LineItem, Subscription, SubscriptionStatus};
use crate::ports::{ChargeOutcome, DeliveryStatus, NotificationChannel};

#[derive(Debug, Clone)]
pub struct ProcessDunningAttemptCommand {
    pub campaign_id: CampaignId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptResolution {
    /// The retry charge succeeded; campaign recovered, subscription active.
    Recovered,

    Retrying { next_retry_at: Timestamp },

    /// The last attempt failed and the final action ran.
    Exhausted { final_action: String },

    /// The subscription was cancelled meanwhile; the campaign was cancelled with it.
    SubscriptionCancelled,

    NotDue,

    /// Another worker claimed this attempt first.
    NotClaimed,
}

#[derive(Debug, Clone)]
pub struct ProcessDunningAttemptResult {
    pub campaign: DunningCampaign,

    /// `None` when no attempt ran.
    pub attempt: Option<DunningAttemptRecord>,
    pub resolution: AttemptResolution,
}

/// Processes the next attempt of a due campaign.
///
/// The attempt is claimed with a conditional update on `current_attempt`, so
/// concurrent workers never run the same step twice. If anything after the
/// claim fails, the claim is released and the aborted run is recorded.
/// Notification failures are logged and do not affect the outcome.
pub struct ProcessDunningAttemptHandler {
    ports: BillingPorts,
    settings: BillingSettings,
}

impl ProcessDunningAttemptHandler {
    pub fn new(ports: BillingPorts, settings: BillingSettings) -> Self {
        Self { ports, settings }
    }

    pub async fn handle(
        &self,
        cmd: ProcessDunningAttemptCommand,
    ) -> Result<ProcessDunningAttemptResult, BillingError> {
        let now = self.ports.clock.now();
        let campaign = self.find_campaign(&cmd.campaign_id).await?;

        if !campaign.is_due(now) {
            return Ok(Self::without_attempt(campaign, AttemptResolution::NotDue));
        }

        let _guard = acquire_lock(self.ports.locks.as_ref(), &campaign.subscription_id).await?;
        let mut campaign = self.find_campaign(&cmd.campaign_id).await?;
        if !campaign.is_due(now) {
            return Ok(Self::without_attempt(campaign, AttemptResolution::NotDue));
        }

        let original = campaign.clone();
        let lease_until = now.plus_secs(self.settings.claim_lease.as_secs());
        let attempt_number = if campaign.has_unresolved_final_attempt() {
            let attempt_number = campaign.reclaim_final_attempt(lease_until, now)?;
            self.ports.dunning.update(&campaign).await?;
            tracing::warn!(
                campaign_id = %campaign.id,
                attempt_number,
                "Re-running unresolved final dunning attempt"
            );
            attempt_number
        } else {
            let expected_attempt = campaign.current_attempt;
            if !self
                .ports
                .dunning
                .claim_attempt(&campaign.id, expected_attempt, lease_until, now)
                .await?
            {
                tracing::debug!(campaign_id = %campaign.id, "Dunning attempt claimed elsewhere");
                return Ok(Self::without_attempt(campaign, AttemptResolution::NotClaimed));
            }
            campaign.claim_next_attempt(lease_until, now)?
        };

        match self.run_claimed(campaign, attempt_number, now).await {
            Ok(result) => Ok(result),
            Err(e) => {
                self.release_claim(original, attempt_number, &e, now).await;
                Err(e)
            }
        }
    }

    /// Runs a claimed attempt through to its resolution.
    async fn run_claimed(
        &self,
        mut campaign: DunningCampaign,
        attempt_number: u32,
        now: Timestamp,
    ) -> Result<ProcessDunningAttemptResult, BillingError> {
        let mut subscription =
            load_subscription(self.ports.subscriptions.as_ref(), &campaign.subscription_id).await?;

        if subscription.is_cancelled() {
            campaign.cancel("subscription cancelled", now)?;
            self.ports.dunning.update(&campaign).await?;
            tracing::info!(
                campaign_id = %campaign.id,
                subscription_id = %subscription.id,
                "Dunning campaign cancelled; subscription already cancelled"
            );
            return Ok(Self::without_attempt(
                campaign,
                AttemptResolution::SubscriptionCancelled,
            ));
        }

        let policy = &self.settings.dunning_policy;
        let step = policy.step(attempt_number).ok_or_else(|| {
            BillingError::data_integrity(format!(
                "campaign {} reached attempt {} but the policy has {} steps",
                campaign.id,
                attempt_number,
                policy.max_attempts()
            ))
        })?;

        let record = self
            .run_step(&campaign, &subscription, attempt_number, &step.actions, now)
            .await;
        self.ports.dunning.append_attempt(&record).await?;

        tracing::info!(
            campaign_id = %campaign.id,
            subscription_id = %subscription.id,
            attempt_number,
            max_attempts = campaign.max_attempts,
            outcome = record.outcome.as_str(),
            "Dunning attempt processed"
        );

        let resolution = if record.outcome == AttemptOutcome::Succeeded {
            campaign.recover(now)?;
            self.ports.dunning.update(&campaign).await?;

            let expected_version = subscription.version;
            if let Some(event) = subscription.recover(now)? {
                persist(&self.ports, &subscription, expected_version, vec![event]).await?;
            }
            tracing::info!(
                campaign_id = %campaign.id,
                subscription_id = %subscription.id,
                "Dunning campaign recovered"
            );
            AttemptResolution::Recovered
        } else {
            match campaign.advance_after_attempt(policy, now)? {
                AttemptProgress::Retrying { next_retry_at } => {
                    self.ports.dunning.update(&campaign).await?;
                    AttemptResolution::Retrying { next_retry_at }
                }
                AttemptProgress::Exhausted => {
                    self.ports.dunning.update(&campaign).await?;
                    let final_action = policy.final_action();
                    tracing::warn!(
                        campaign_id = %campaign.id,
                        subscription_id = %subscription.id,
                        final_action = final_action.as_str(),
                        "Dunning campaign exhausted"
                    );
                    self.apply_final_action(final_action, &mut subscription, now)
                        .await?;
                    AttemptResolution::Exhausted {
                        final_action: final_action.as_str().to_string(),
                    }
                }
            }
        };

        Ok(ProcessDunningAttemptResult {
            campaign,
            attempt: Some(record),
            resolution,
        })
    }

    /// Records an aborted attempt and puts the campaign back as it was before
    /// the claim, so the same attempt runs again on the next sweep. Retry
    /// charges reuse their idempotency key, which keeps the re-run from
    /// charging twice.
    async fn release_claim(
        &self,
        mut original: DunningCampaign,
        attempt_number: u32,
        error: &BillingError,
        now: Timestamp,
    ) {
        tracing::error!(
            campaign_id = %original.id,
            attempt_number,
            error = %error,
            "Dunning attempt aborted; releasing claim"
        );

        let aborted = DunningAttemptRecord::new(
            original.id,
            attempt_number,
            now,
            AttemptOutcome::Failed,
            Vec::new(),
            Some(format!("aborted: {}", error.message())),
        );
        if let Err(e) = self.ports.dunning.append_attempt(&aborted).await {
            tracing::error!(
                campaign_id = %original.id,
                error = %e,
                "Failed to record aborted dunning attempt"
            );
        }

        original.updated_at = now;
        if let Err(e) = self.ports.dunning.update(&original).await {
            // the claim lease still expires, leaving the campaign due again
            tracing::error!(
                campaign_id = %original.id,
                error = %e,
                "Failed to release dunning claim"
            );
        }
    }

    async fn find_campaign(&self, id: &CampaignId) -> Result<DunningCampaign, BillingError> {
        self.ports
            .dunning
            .find_by_id(id)
            .await?
            .ok_or_else(|| BillingError::not_found(EntityKind::DunningCampaign, id))
    }

    fn without_attempt(
        campaign: DunningCampaign,
        resolution: AttemptResolution,
    ) -> ProcessDunningAttemptResult {
        ProcessDunningAttemptResult {
            campaign,
            attempt: None,
            resolution,
        }
    }

    /// Runs the step's actions. A successful retry charge skips the notices.
    async fn run_step(
        &self,
        campaign: &DunningCampaign,
        subscription: &Subscription,
        attempt_number: u32,
        actions: &[DunningAction],
        now: Timestamp,
    ) -> DunningAttemptRecord {
        let mut actions_taken = Vec::new();
        let mut outcome = AttemptOutcome::Pending;
        let mut failure_reason = None;

        if actions.contains(&DunningAction::RetryCharge) {
            let request = charge_request(
                subscription,
                campaign.original_amount_cents,
                ChargePurpose::DunningRetry,
                campaign.failure.period_start,
                i64::from(attempt_number),
            );
            let charge = charge_with_timeout(
                self.ports.charges.as_ref(),
                request,
                self.settings.charge_timeout,
            )
            .await;
            actions_taken.push(DunningAction::RetryCharge);

            match charge {
                ChargeOutcome::Succeeded { .. } => {
                    return DunningAttemptRecord::new(
                        campaign.id,
                        attempt_number,
                        now,
                        AttemptOutcome::Succeeded,
                        actions_taken,
                        None,
                    );
                }
                ChargeOutcome::Failed { reason_code } => {
                    outcome = AttemptOutcome::Failed;
                    failure_reason = Some(reason_code);
                }
            }
        }

        for action in actions {
            let channel = match action {
                DunningAction::SendEmail => NotificationChannel::Email,
                DunningAction::InAppNotice => NotificationChannel::InApp,
                DunningAction::RetryCharge => continue,
            };
            if self
                .notify(channel, campaign, subscription, attempt_number)
                .await
            {
                actions_taken.push(*action);
            }
        }

        DunningAttemptRecord::new(
            campaign.id,
            attempt_number,
            now,
            outcome,
            actions_taken,
            failure_reason,
        )
    }

    /// Sends a dunning notice. Returns whether the channel accepted it.
    async fn notify(
        &self,
        channel: NotificationChannel,
        campaign: &DunningCampaign,
        subscription: &Subscription,
        attempt_number: u32,
    ) -> bool {
        let template_id = format!("dunning.attempt_{}", attempt_number);
        let variables = HashMap::from([
            ("subscription_id".to_string(), subscription.id.to_string()),
            ("attempt_number".to_string(), attempt_number.to_string()),
            ("max_attempts".to_string(), campaign.max_attempts.to_string()),
            (
                "amount_cents".to_string(),
                campaign.original_amount_cents.to_string(),
            ),
            ("currency".to_string(), subscription.currency.clone()),
            ("reason_code".to_string(), campaign.failure.reason_code.clone()),
        ]);

        match self
            .ports
            .notifications
            .send(
                channel,
                subscription.customer_id.as_str(),
                &template_id,
                variables,
            )
            .await
        {
            Ok(DeliveryStatus::Rejected { reason }) => {
                tracing::warn!(
                    campaign_id = %campaign.id,
                    channel = channel.as_str(),
                    reason = %reason,
                    "Dunning notice rejected"
                );
                false
            }
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(
                    campaign_id = %campaign.id,
                    channel = channel.as_str(),
                    error = %e,
                    "Dunning notice failed"
                );
                false
            }
        }
    }

    async fn apply_final_action(
        &self,
        final_action: &FinalAction,
        subscription: &mut Subscription,
        now: Timestamp,
    ) -> Result<(), BillingError> {
        let reason = Some("dunning exhausted".to_string());
        match final_action {
            FinalAction::Cancel => terminate(&self.ports, subscription, reason, now).await,
            FinalAction::Pause => {
                if subscription.status == SubscriptionStatus::Paused {
                    return Ok(());
                }
                let expected_version = subscription.version;
                let event = subscription.suspend(reason, now)?;
                persist(&self.ports, subscription, expected_version, vec![event]).await
            }
            FinalAction::Downgrade { plan_ref } => {
                let expected_version = subscription.version;
                let item = LineItem::new(plan_ref.clone(), 1, 0)?;
                let mut events = vec![subscription.replace_line_items(vec![item], reason, now)?];
                if let Some(event) = subscription.recover(now)? {
                    events.push(event);
                }
                persist(&self.ports, subscription, expected_version, events).await
            }
        }
    }
}
