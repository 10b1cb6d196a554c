//! RenewSubscriptionHandler - advances an ended period and bills the next one.

use crate::application::charging::{charge_request, charge_with_timeout};
use crate::application::handlers::support::{
    acquire_lock, load_subscription, open_dunning_campaign, publish,
};
use crate::application::{BillingPorts, BillingSettings};
use crate::domain::billing::{
    idempotency_key, BillingError, ChargePurpose, ReconciliationKind, ReconciliationRecord,
};
use crate::domain::dunning::FailureContext;
use crate::domain::foundation::{CampaignId, SubscriptionId, Timestamp};
use crate::domain::subscription::{Subscription, SubscriptionEvent};
use crate::ports::ChargeOutcome;

#[derive(Debug, Clone)]
pub struct RenewSubscriptionCommand {
    pub subscription_id: SubscriptionId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenewalSkip {
    /// The period has not ended, the status does not renew, or `cancel_at` was reached.
    NotDue,

    /// A scheduled change for the subscription is due and must run first.
    PendingChangeDue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenewalOutcome {
    Charged { provider_reference: String },

    /// The renewed total was zero.
    NoCharge,

    /// The charge failed and a dunning campaign now owns the recovery.
    PaymentFailed {
        campaign_id: CampaignId,
        reason_code: String,
    },

    Skipped(RenewalSkip),
}

#[derive(Debug, Clone)]
pub struct RenewSubscriptionResult {
    pub subscription: Subscription,
    pub outcome: RenewalOutcome,
}

pub struct RenewSubscriptionHandler {
    ports: BillingPorts,
    settings: BillingSettings,
}

impl RenewSubscriptionHandler {
    pub fn new(ports: BillingPorts, settings: BillingSettings) -> Self {
        Self { ports, settings }
    }

    pub async fn handle(
        &self,
        cmd: RenewSubscriptionCommand,
    ) -> Result<RenewSubscriptionResult, BillingError> {
        let now = self.ports.clock.now();
        let _guard = acquire_lock(self.ports.locks.as_ref(), &cmd.subscription_id).await?;
        let mut subscription =
            load_subscription(self.ports.subscriptions.as_ref(), &cmd.subscription_id).await?;

        if !subscription.is_due_for_renewal(now) {
            return Ok(RenewSubscriptionResult {
                subscription,
                outcome: RenewalOutcome::Skipped(RenewalSkip::NotDue),
            });
        }

        let pending = self.ports.ledger.find_pending(&subscription.id).await?;
        if pending.iter().any(|change| change.is_due(now)) {
            tracing::debug!(
                subscription_id = %subscription.id,
                "Renewal deferred until due scheduled changes run"
            );
            return Ok(RenewSubscriptionResult {
                subscription,
                outcome: RenewalOutcome::Skipped(RenewalSkip::PendingChangeDue),
            });
        }

        let expected_version = subscription.version;
        let event = subscription.renew(now)?;
        self.ports
            .subscriptions
            .update(&subscription, expected_version)
            .await?;

        // the new period is stored; from here a failure must leave a record
        match self.bill_period(&mut subscription, vec![event], now).await {
            Ok(outcome) => Ok(RenewSubscriptionResult {
                subscription,
                outcome,
            }),
            Err(e) => {
                self.record_unsettled(&subscription, &e, now).await;
                Err(e)
            }
        }
    }

    /// Publishes the renewal and charges the period just started.
    async fn bill_period(
        &self,
        subscription: &mut Subscription,
        events: Vec<SubscriptionEvent>,
        now: Timestamp,
    ) -> Result<RenewalOutcome, BillingError> {
        publish(&self.ports, subscription, events).await?;

        let amount_cents = subscription.total_amount_cents;
        if amount_cents <= 0 {
            return Ok(RenewalOutcome::NoCharge);
        }

        let period_start = subscription.current_period_start;
        let request = charge_request(
            subscription,
            amount_cents,
            ChargePurpose::Renewal,
            period_start,
            0,
        );
        let outcome = charge_with_timeout(
            self.ports.charges.as_ref(),
            request,
            self.settings.charge_timeout,
        )
        .await;

        match outcome {
            ChargeOutcome::Succeeded { provider_reference } => {
                tracing::info!(
                    subscription_id = %subscription.id,
                    amount_cents,
                    period_start = %period_start,
                    "Subscription renewed and charged"
                );
                Ok(RenewalOutcome::Charged { provider_reference })
            }
            ChargeOutcome::Failed { reason_code } => {
                let failure = FailureContext {
                    reason_code: reason_code.clone(),
                    provider_reference: None,
                    period_start,
                    amount_cents,
                };
                let (campaign, _) = open_dunning_campaign(
                    &self.ports,
                    &self.settings.dunning_policy,
                    subscription,
                    failure,
                    now,
                )
                .await?;
                Ok(RenewalOutcome::PaymentFailed {
                    campaign_id: campaign.id,
                    reason_code,
                })
            }
        }
    }

    /// Leaves a reconciliation record for a renewed period whose charge may
    /// not have settled. The renewal key lets an operator retry it safely.
    async fn record_unsettled(
        &self,
        subscription: &Subscription,
        error: &BillingError,
        now: Timestamp,
    ) {
        let amount_cents = subscription.total_amount_cents;
        tracing::error!(
            subscription_id = %subscription.id,
            period_start = %subscription.current_period_start,
            amount_cents,
            error = %error,
            "Renewal stored but not settled"
        );
        if amount_cents <= 0 {
            return;
        }

        let key = idempotency_key(
            ChargePurpose::Renewal,
            &subscription.id,
            subscription.current_period_start,
            0,
        );
        let record = ReconciliationRecord::new(
            subscription.id,
            ReconciliationKind::RenewalCharge,
            amount_cents,
            key,
            error.message(),
            now,
        );
        if let Err(e) = self.ports.reconciliation.record(&record).await {
            tracing::error!(
                subscription_id = %subscription.id,
                error = %e,
                "Failed to record unsettled renewal"
            );
        }
    }
}
