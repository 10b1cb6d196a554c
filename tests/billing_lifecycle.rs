//! End-to-end subscription lifecycle over the in-memory adapters.
//!
//! Each test drives the public handlers and the scheduler the way a worker
//! process would, advancing a manual clock between steps.

mod common;

use billing_engine::application::{
    BillingScheduler, DowngradeSubscriptionCommand, PauseSubscriptionCommand,
    PreviewChangeCommand, ReactivateSubscriptionCommand, ScheduleCancellationCommand,
    UpgradeSubscriptionCommand,
};
use billing_engine::domain::billing::BillingError;
use billing_engine::domain::scheduling::{ChangeStatus, ChangeType};
use billing_engine::domain::subscription::SubscriptionStatus;
use billing_engine::ports::{ChargeOutcome, Clock, ScheduledChangeLedger};

use common::{item, set_plan, Harness};

fn event_types(h: &Harness, sub: &billing_engine::domain::foundation::SubscriptionId) -> Vec<String> {
    h.events
        .history_for(sub)
        .into_iter()
        .map(|e| e.event_type)
        .collect()
}

#[tokio::test]
async fn upgrade_then_downgrade_bills_each_step_once() {
    let h = Harness::new();
    let sub = h.subscribe(vec![item("pro", 1, 10_000)]).await;
    h.clock.advance_days(10);

    let preview = h
        .engine
        .preview_handler()
        .handle(PreviewChangeCommand {
            subscription_id: sub.id,
            change_type: ChangeType::Upgrade,
            changes: set_plan("pro", 1, 15_000),
        })
        .await
        .unwrap();

    let upgraded = h
        .engine
        .upgrade_handler()
        .handle(UpgradeSubscriptionCommand {
            subscription_id: sub.id,
            changes: set_plan("pro", 1, 15_000),
            reason: None,
        })
        .await
        .unwrap();

    assert_eq!(preview.proration, upgraded.proration);
    assert_eq!(upgraded.proration.net_amount_cents, 3_333);
    assert_eq!(upgraded.subscription.total_amount_cents, 15_000);

    let downgrade = h
        .engine
        .downgrade_handler()
        .handle(DowngradeSubscriptionCommand {
            subscription_id: sub.id,
            changes: set_plan("pro", 1, 5_000),
            reason: Some("budget".to_string()),
        })
        .await
        .unwrap();

    assert_eq!(downgrade.scheduled_change.scheduled_for, sub.current_period_end);
    // nothing changes until the period ends
    assert_eq!(h.reload(&sub.id).await.total_amount_cents, 15_000);

    h.clock.set(sub.current_period_end);
    let report = BillingScheduler::new(h.engine.clone()).run_once().await;

    assert_eq!(report.changes.processed, 1);
    assert_eq!(report.renewals.processed, 1);
    assert_eq!(report.total_failed(), 0);

    let amounts: Vec<i64> = h.charges.calls().iter().map(|c| c.amount_cents).collect();
    assert_eq!(amounts, vec![3_333, 5_000]);

    let renewed = h.reload(&sub.id).await;
    assert_eq!(renewed.total_amount_cents, 5_000);
    assert_eq!(renewed.current_period_start, sub.current_period_end);
    assert_eq!(
        event_types(&h, &sub.id),
        vec![
            "subscription.upgraded.v1",
            "subscription.line_items_replaced.v1",
            "subscription.renewed.v1",
        ]
    );
}

#[tokio::test]
async fn reactivation_withdraws_cancellation_and_renewal_proceeds() {
    let h = Harness::new();
    let sub = h.subscribe(vec![item("team", 3, 2_000)]).await;

    let scheduled = h
        .engine
        .schedule_cancellation_handler()
        .handle(ScheduleCancellationCommand {
            subscription_id: sub.id,
            reason: Some("switching vendors".to_string()),
        })
        .await
        .unwrap();
    assert_eq!(scheduled.effective_at, sub.current_period_end);

    h.clock.advance_days(20);
    let reactivated = h
        .engine
        .reactivate_handler()
        .handle(ReactivateSubscriptionCommand {
            subscription_id: sub.id,
        })
        .await
        .unwrap();
    assert!(reactivated.withdrew_scheduled_cancel);
    assert!(reactivated.subscription.cancel_at.is_none());

    let cancel = h
        .ledger
        .find_by_id(&scheduled.scheduled_change.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(cancel.status, ChangeStatus::Cancelled);

    h.clock.set(sub.current_period_end);
    let report = BillingScheduler::new(h.engine.clone()).run_once().await;

    assert_eq!(report.changes.due, 0);
    assert_eq!(report.renewals.processed, 1);
    assert_eq!(h.charges.calls()[0].amount_cents, 6_000);
    assert_eq!(h.reload(&sub.id).await.status, SubscriptionStatus::Active);
}

#[tokio::test]
async fn cancellation_takes_effect_at_period_end_and_blocks_changes() {
    let h = Harness::new();
    let sub = h.subscribe(vec![item("pro", 1, 10_000)]).await;

    h.engine
        .schedule_cancellation_handler()
        .handle(ScheduleCancellationCommand {
            subscription_id: sub.id,
            reason: None,
        })
        .await
        .unwrap();

    // still usable until the period ends
    h.clock.advance_days(29);
    assert_eq!(h.reload(&sub.id).await.status, SubscriptionStatus::Active);

    h.clock.set(sub.current_period_end);
    BillingScheduler::new(h.engine.clone()).run_once().await;

    let cancelled = h.reload(&sub.id).await;
    assert_eq!(cancelled.status, SubscriptionStatus::Cancelled);
    assert_eq!(cancelled.cancelled_at, Some(sub.current_period_end));
    assert_eq!(h.charges.call_count(), 0);

    let err = h
        .engine
        .upgrade_handler()
        .handle(UpgradeSubscriptionCommand {
            subscription_id: sub.id,
            changes: set_plan("pro", 2, 10_000),
            reason: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        BillingError::AlreadyCancelled { .. } | BillingError::StateConflict { .. }
    ));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn paused_subscription_resumes_on_schedule_with_fresh_period() {
    let h = Harness::new();
    let sub = h.subscribe(vec![item("pro", 1, 10_000)]).await;
    h.clock.advance_days(5);
    let pause_until = h.clock.now().add_days(45);

    let paused = h
        .engine
        .pause_handler()
        .handle(PauseSubscriptionCommand {
            subscription_id: sub.id,
            pause_until: Some(pause_until),
            reason: Some("vacation".to_string()),
        })
        .await
        .unwrap();
    assert_eq!(paused.subscription.status, SubscriptionStatus::Paused);
    assert!(paused.scheduled_resume.is_some());

    // the original period end passes without a renewal
    h.clock.set(sub.current_period_end);
    let report = BillingScheduler::new(h.engine.clone()).run_once().await;
    assert_eq!(report.renewals.due, 0);
    assert_eq!(h.charges.call_count(), 0);

    h.clock.set(pause_until);
    let report = BillingScheduler::new(h.engine.clone()).run_once().await;
    assert_eq!(report.changes.processed, 1);

    let resumed = h.reload(&sub.id).await;
    assert_eq!(resumed.status, SubscriptionStatus::Active);
    assert_eq!(resumed.current_period_start, pause_until);
    assert!(resumed.current_period_end > pause_until);
    assert_eq!(h.charges.calls()[0].amount_cents, 10_000);
}

#[tokio::test]
async fn declined_upgrade_charge_is_left_for_reconciliation() {
    let h = Harness::new();
    let sub = h.subscribe(vec![item("pro", 1, 10_000)]).await;
    h.charges.push_outcome(ChargeOutcome::failed("insufficient_funds"));
    h.clock.advance_days(10);

    let result = h
        .engine
        .upgrade_handler()
        .handle(UpgradeSubscriptionCommand {
            subscription_id: sub.id,
            changes: set_plan("pro", 1, 15_000),
            reason: None,
        })
        .await
        .unwrap();

    assert!(result.charge.reconciliation.is_some());
    let records = h.reconciliation.all().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].amount_cents, 3_333);
    assert_eq!(records[0].reason, "insufficient_funds");
    // the upgrade stands; no dunning campaign for a proration charge
    assert_eq!(h.reload(&sub.id).await.total_amount_cents, 15_000);
    assert!(h.dunning.campaigns_for(&sub.id).await.is_empty());
}
