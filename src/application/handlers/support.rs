//! Steps shared by several handlers.
//!
//! Callers hold the subscription lock for the whole sequence.

use crate::application::charging::{charge_request, charge_with_timeout};
use crate::application::{BillingPorts, BillingSettings};
use crate::domain::billing::{
    BillingError, ChargePurpose, EntityKind, ReconciliationKind, ReconciliationRecord,
};
use crate::domain::dunning::{DunningCampaign, DunningPolicy, FailureContext};
use crate::domain::foundation::{SerializableDomainEvent, SubscriptionId, Timestamp};
use crate::domain::subscription::{Subscription, SubscriptionEvent};
use crate::ports::{ChargeOutcome, LockGuard, SubscriptionLocks, SubscriptionRepository};

pub(crate) async fn acquire_lock(
    locks: &dyn SubscriptionLocks,
    subscription_id: &SubscriptionId,
) -> Result<LockGuard, BillingError> {
    locks.try_acquire(subscription_id).await?.ok_or_else(|| {
        tracing::debug!(subscription_id = %subscription_id, "Subscription lock held elsewhere");
        BillingError::concurrent_modification(format!(
            "subscription {} is being modified by another worker",
            subscription_id
        ))
    })
}

/// Loads a subscription and verifies its stored invariants.
pub(crate) async fn load_subscription(
    repository: &dyn SubscriptionRepository,
    subscription_id: &SubscriptionId,
) -> Result<Subscription, BillingError> {
    let subscription = repository
        .find_by_id(subscription_id)
        .await?
        .ok_or_else(|| BillingError::not_found(EntityKind::Subscription, subscription_id))?;

    if let Err(e) = subscription.check_invariants() {
        tracing::error!(
            subscription_id = %subscription_id,
            error = %e,
            "Stored subscription violates its invariants"
        );
        return Err(e);
    }
    Ok(subscription)
}

/// Writes the subscription (conditional on `expected_version`) and publishes its history.
pub(crate) async fn persist(
    ports: &BillingPorts,
    subscription: &Subscription,
    expected_version: i64,
    events: Vec<SubscriptionEvent>,
) -> Result<(), BillingError> {
    ports.subscriptions.update(subscription, expected_version).await?;
    publish(ports, subscription, events).await
}

/// Logs and publishes the events of an already stored transition.
pub(crate) async fn publish(
    ports: &BillingPorts,
    subscription: &Subscription,
    events: Vec<SubscriptionEvent>,
) -> Result<(), BillingError> {
    for event in &events {
        tracing::info!(
            subscription_id = %subscription.id,
            kind = ?event.kind,
            from_status = %event.from_status,
            to_status = %event.to_status,
            version = event.version,
            "Subscription transition applied"
        );
    }

    let envelopes = events
        .iter()
        .map(|e| e.to_envelope())
        .collect::<Result<Vec<_>, _>>()?;
    if !envelopes.is_empty() {
        ports.events.publish_all(envelopes).await?;
    }
    Ok(())
}

/// Outcome of the immediate charge that follows a state change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImmediateCharge {
    /// `None` when nothing was owed.
    pub outcome: Option<ChargeOutcome>,

    /// Written when the charge failed but the state change was kept.
    pub reconciliation: Option<ReconciliationRecord>,
}

/// Charges `amount_cents` now; a failure leaves a reconciliation record behind.
#[allow(clippy::too_many_arguments)]
pub(crate) async fn charge_or_reconcile(
    ports: &BillingPorts,
    settings: &BillingSettings,
    subscription: &Subscription,
    amount_cents: i64,
    purpose: ChargePurpose,
    attempt_number: i64,
    kind: ReconciliationKind,
    now: Timestamp,
) -> Result<ImmediateCharge, BillingError> {
    if amount_cents <= 0 {
        return Ok(ImmediateCharge::default());
    }

    let request = charge_request(
        subscription,
        amount_cents,
        purpose,
        subscription.current_period_start,
        attempt_number,
    );
    let key = request.idempotency_key.clone();
    let outcome = charge_with_timeout(ports.charges.as_ref(), request, settings.charge_timeout).await;

    let reconciliation = match &outcome {
        ChargeOutcome::Succeeded { .. } => None,
        ChargeOutcome::Failed { reason_code } => {
            let record = ReconciliationRecord::new(
                subscription.id,
                kind,
                amount_cents,
                key,
                reason_code.clone(),
                now,
            );
            ports.reconciliation.record(&record).await?;
            tracing::warn!(
                subscription_id = %subscription.id,
                kind = kind.as_str(),
                amount_cents,
                reason_code = %reason_code,
                "Charge failed after state change; reconciliation recorded"
            );
            Some(record)
        }
    };

    Ok(ImmediateCharge {
        outcome: Some(outcome),
        reconciliation,
    })
}

/// Resumes a paused subscription and charges the fresh period.
pub(crate) async fn resume_and_charge(
    ports: &BillingPorts,
    settings: &BillingSettings,
    subscription: &mut Subscription,
    now: Timestamp,
) -> Result<ImmediateCharge, BillingError> {
    let expected_version = subscription.version;
    let event = subscription.resume(now)?;
    persist(ports, subscription, expected_version, vec![event]).await?;

    charge_or_reconcile(
        ports,
        settings,
        subscription,
        subscription.total_amount_cents,
        ChargePurpose::Resume,
        0,
        ReconciliationKind::ResumeCharge,
        now,
    )
    .await
}

/// Terminates a subscription and retires everything still pending for it.
pub(crate) async fn terminate(
    ports: &BillingPorts,
    subscription: &mut Subscription,
    reason: Option<String>,
    now: Timestamp,
) -> Result<(), BillingError> {
    let expected_version = subscription.version;
    let event = subscription.cancel(reason, now)?;
    persist(ports, subscription, expected_version, vec![event]).await?;

    for change in ports.ledger.find_pending(&subscription.id).await? {
        ports
            .ledger
            .cancel_pending(&subscription.id, change.change_type, now)
            .await?;
    }

    if let Some(mut campaign) = ports
        .dunning
        .find_active_for_subscription(&subscription.id)
        .await?
    {
        campaign.cancel("subscription cancelled", now)?;
        ports.dunning.update(&campaign).await?;
        tracing::info!(
            subscription_id = %subscription.id,
            campaign_id = %campaign.id,
            "Dunning campaign cancelled with its subscription"
        );
    }
    Ok(())
}

/// Opens a dunning campaign unless one is already active, and marks the
/// subscription past due.
///
/// Returns the active campaign and whether this call created it.
pub(crate) async fn open_dunning_campaign(
    ports: &BillingPorts,
    policy: &DunningPolicy,
    subscription: &mut Subscription,
    failure: FailureContext,
    now: Timestamp,
) -> Result<(DunningCampaign, bool), BillingError> {
    let reason = failure.reason_code.clone();
    let campaign = DunningCampaign::start(subscription.id, failure, now, policy);

    if !ports.dunning.create_if_no_active(&campaign).await? {
        let existing = ports
            .dunning
            .find_active_for_subscription(&subscription.id)
            .await?
            .ok_or_else(|| {
                BillingError::concurrent_modification(format!(
                    "active campaign for subscription {} changed during creation",
                    subscription.id
                ))
            })?;
        return Ok((existing, false));
    }

    tracing::info!(
        subscription_id = %subscription.id,
        campaign_id = %campaign.id,
        reason_code = %reason,
        max_attempts = campaign.max_attempts,
        "Dunning campaign started"
    );

    let expected_version = subscription.version;
    if let Some(event) = subscription.mark_past_due(Some(reason), now)? {
        persist(ports, subscription, expected_version, vec![event]).await?;
    }
    Ok((campaign, true))
}
