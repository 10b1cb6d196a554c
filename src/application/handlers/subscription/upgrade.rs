//! UpgradeSubscriptionHandler - immediate, prorated line item upgrade.

use crate::application::handlers::support::{
    acquire_lock, charge_or_reconcile, load_subscription, persist, ImmediateCharge,
};
use crate::application::{BillingPorts, BillingSettings};
use crate::domain::billing::{
    calculate_upgrade_proration, BillingError, ChargePurpose, ProrationResult, ReconciliationKind,
};
use crate::domain::foundation::SubscriptionId;
use crate::domain::subscription::{
    apply_changes, total_of, LineItemChange, Subscription, SubscriptionStatus,
};

#[derive(Debug, Clone)]
pub struct UpgradeSubscriptionCommand {
    pub subscription_id: SubscriptionId,
    pub changes: Vec<LineItemChange>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct UpgradeSubscriptionResult {
    pub subscription: Subscription,
    pub proration: ProrationResult,

    /// Charge for the prorated difference. Empty while trialing or when nothing is owed.
    pub charge: ImmediateCharge,
}

/// Applies line item changes now and charges the prorated difference.
///
/// A failed charge does not undo the upgrade; it leaves a reconciliation
/// record for follow-up.
pub struct UpgradeSubscriptionHandler {
    ports: BillingPorts,
    settings: BillingSettings,
}

impl UpgradeSubscriptionHandler {
    pub fn new(ports: BillingPorts, settings: BillingSettings) -> Self {
        Self { ports, settings }
    }

    pub async fn handle(
        &self,
        cmd: UpgradeSubscriptionCommand,
    ) -> Result<UpgradeSubscriptionResult, BillingError> {
        let now = self.ports.clock.now();
        let _guard = acquire_lock(self.ports.locks.as_ref(), &cmd.subscription_id).await?;
        let mut subscription =
            load_subscription(self.ports.subscriptions.as_ref(), &cmd.subscription_id).await?;

        if matches!(
            subscription.status,
            SubscriptionStatus::Cancelled | SubscriptionStatus::Paused
        ) {
            return Err(BillingError::state_conflict(subscription.status.as_str(), "upgrade"));
        }

        let new_items = apply_changes(&subscription.line_items, &cmd.changes)?;
        let proration = calculate_upgrade_proration(
            subscription.current_period_start,
            subscription.current_period_end,
            subscription.total_amount_cents,
            total_of(&new_items)?,
            now,
        )?;
        let was_trialing = subscription.status == SubscriptionStatus::Trialing;

        let expected_version = subscription.version;
        let event = subscription.apply_upgrade(new_items, cmd.reason, now)?;
        persist(&self.ports, &subscription, expected_version, vec![event]).await?;

        let charge = if was_trialing || !proration.requires_charge() {
            ImmediateCharge::default()
        } else {
            charge_or_reconcile(
                &self.ports,
                &self.settings,
                &subscription,
                proration.net_amount_cents,
                ChargePurpose::Proration,
                subscription.version,
                ReconciliationKind::ProrationCharge,
                now,
            )
            .await?
        };

        Ok(UpgradeSubscriptionResult {
            subscription,
            proration,
            charge,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::testing::{item, Fixture};
    use crate::domain::foundation::PlanRef;
    use crate::ports::{
        ChargeOutcome, Clock, ReconciliationLog, SubscriptionLocks, SubscriptionRepository,
    };

    fn upgrade_to(plan: &str, unit: i64) -> Vec<LineItemChange> {
        vec![LineItemChange::Set {
            plan_ref: PlanRef::new(plan).unwrap(),
            quantity: 1,
            unit_amount_cents: unit,
        }]
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Proration and charging
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn day_ten_upgrade_charges_net_difference() {
        let fx = Fixture::new();
        let sub = fx.seed(vec![item("pro", 1, 10_000)]).await;
        fx.clock.advance_days(10);

        let result = fx
            .engine
            .upgrade_handler()
            .handle(UpgradeSubscriptionCommand {
                subscription_id: sub.id,
                changes: upgrade_to("pro", 15_000),
                reason: Some("more seats".to_string()),
            })
            .await
            .unwrap();

        assert_eq!(result.proration.days_used, 10);
        assert_eq!(result.proration.days_remaining, 20);
        assert_eq!(result.proration.credit_amount_cents, 6_667);
        assert_eq!(result.proration.charge_amount_cents, 10_000);
        assert_eq!(result.proration.net_amount_cents, 3_333);
        assert!(result.charge.outcome.as_ref().unwrap().is_success());

        let calls = fx.charges.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].amount_cents, 3_333);

        let stored = fx.reload(&sub.id).await;
        assert_eq!(stored.total_amount_cents, 15_000);
        assert!(fx.events.has_event("subscription.upgraded.v1"));
    }

    #[tokio::test]
    async fn failed_charge_keeps_upgrade_and_records_reconciliation() {
        let fx = Fixture::new();
        let sub = fx.seed(vec![item("pro", 1, 10_000)]).await;
        fx.charges.push_outcome(ChargeOutcome::failed("card_declined"));
        fx.clock.advance_days(10);

        let result = fx
            .engine
            .upgrade_handler()
            .handle(UpgradeSubscriptionCommand {
                subscription_id: sub.id,
                changes: upgrade_to("pro", 15_000),
                reason: None,
            })
            .await
            .unwrap();

        let record = result.charge.reconciliation.expect("reconciliation record");
        assert_eq!(record.amount_cents, 3_333);
        assert_eq!(record.reason, "card_declined");
        assert_eq!(fx.reconciliation.for_subscription(&sub.id).await.unwrap().len(), 1);
        assert_eq!(fx.reload(&sub.id).await.total_amount_cents, 15_000);
    }

    #[tokio::test]
    async fn trialing_upgrade_is_not_charged() {
        let fx = Fixture::new();
        let sub = fx.seed_trial(vec![item("pro", 1, 10_000)]).await;
        fx.clock.advance_days(3);

        let result = fx
            .engine
            .upgrade_handler()
            .handle(UpgradeSubscriptionCommand {
                subscription_id: sub.id,
                changes: upgrade_to("pro", 20_000),
                reason: None,
            })
            .await
            .unwrap();

        assert!(result.charge.outcome.is_none());
        assert_eq!(fx.charges.call_count(), 0);
        assert_eq!(result.subscription.status, SubscriptionStatus::Trialing);
    }

    #[tokio::test]
    async fn cheaper_change_charges_nothing() {
        let fx = Fixture::new();
        let sub = fx.seed(vec![item("pro", 1, 10_000)]).await;

        let result = fx
            .engine
            .upgrade_handler()
            .handle(UpgradeSubscriptionCommand {
                subscription_id: sub.id,
                changes: upgrade_to("pro", 5_000),
                reason: None,
            })
            .await
            .unwrap();

        assert!(result.proration.net_amount_cents < 0);
        assert_eq!(fx.charges.call_count(), 0);
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Rejections
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn paused_subscription_cannot_upgrade() {
        let fx = Fixture::new();
        let mut sub = fx.seed(vec![item("pro", 1, 10_000)]).await;
        sub.pause(None, None, fx.clock.now()).unwrap();
        fx.subscriptions.update(&sub, 0).await.unwrap();

        let err = fx
            .engine
            .upgrade_handler()
            .handle(UpgradeSubscriptionCommand {
                subscription_id: sub.id,
                changes: upgrade_to("pro", 15_000),
                reason: None,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, BillingError::StateConflict { .. }));
        assert_eq!(fx.reload(&sub.id).await.total_amount_cents, 10_000);
    }

    #[tokio::test]
    async fn held_lock_is_concurrent_modification() {
        let fx = Fixture::new();
        let sub = fx.seed(vec![item("pro", 1, 10_000)]).await;
        let _held = fx.locks.try_acquire(&sub.id).await.unwrap().unwrap();

        let err = fx
            .engine
            .upgrade_handler()
            .handle(UpgradeSubscriptionCommand {
                subscription_id: sub.id,
                changes: upgrade_to("pro", 15_000),
                reason: None,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, BillingError::ConcurrentModification(_)));
    }

    #[tokio::test]
    async fn empty_change_list_is_validation_error() {
        let fx = Fixture::new();
        let sub = fx.seed(vec![item("pro", 1, 10_000)]).await;

        let err = fx
            .engine
            .upgrade_handler()
            .handle(UpgradeSubscriptionCommand {
                subscription_id: sub.id,
                changes: vec![],
                reason: None,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, BillingError::Validation { .. }));
    }

    #[tokio::test]
    async fn overflowing_quantity_is_validation_error() {
        let fx = Fixture::new();
        let sub = fx.seed(vec![item("pro", 1, 10_000)]).await;

        let err = fx
            .engine
            .upgrade_handler()
            .handle(UpgradeSubscriptionCommand {
                subscription_id: sub.id,
                changes: vec![LineItemChange::Set {
                    plan_ref: PlanRef::new("pro").unwrap(),
                    quantity: u32::MAX,
                    unit_amount_cents: i64::MAX / 2,
                }],
                reason: None,
            })
            .await
            .unwrap_err();

        match err {
            BillingError::Validation { field, .. } => assert_eq!(field, "line_item_changes"),
            other => panic!("Expected Validation, got {:?}", other),
        }
        assert_eq!(fx.charges.call_count(), 0);
        assert_eq!(fx.reload(&sub.id).await.total_amount_cents, 10_000);
    }
}
