//! Shared in-memory wiring for the integration suites.

#![allow(dead_code)]

use std::sync::Arc;

use billing_engine::adapters::{
    InMemoryDunningRepository, InMemoryEventBus, InMemoryReconciliationLog,
    InMemoryScheduledChangeLedger, InMemorySubscriptionLocks, InMemorySubscriptionRepository,
    ManualClock, MockChargeProvider, RecordingNotificationSender,
};
use billing_engine::application::{BillingEngine, BillingPorts, BillingSettings};
use billing_engine::domain::dunning::{DunningAction, DunningPolicy, FinalAction};
use billing_engine::domain::foundation::{CustomerId, PlanRef, SubscriptionId, Timestamp};
use billing_engine::domain::subscription::{
    LineItem, LineItemChange, Subscription, DEFAULT_PERIOD_DAYS,
};
use billing_engine::ports::{Clock, SubscriptionRepository};

/// 2024-01-01T00:00:00Z
pub fn jan_1() -> Timestamp {
    Timestamp::from_unix_secs(1_704_067_200).unwrap()
}

pub fn item(plan: &str, quantity: u32, unit_amount_cents: i64) -> LineItem {
    LineItem::new(PlanRef::new(plan).unwrap(), quantity, unit_amount_cents).unwrap()
}

pub fn set_plan(plan: &str, quantity: u32, unit_amount_cents: i64) -> Vec<LineItemChange> {
    vec![LineItemChange::Set {
        plan_ref: PlanRef::new(plan).unwrap(),
        quantity,
        unit_amount_cents,
    }]
}

pub fn retry_and_email(final_action: FinalAction) -> DunningPolicy {
    DunningPolicy::uniform(
        &[1, 3, 7],
        &[DunningAction::RetryCharge, DunningAction::SendEmail],
        final_action,
    )
    .unwrap()
}

pub struct Harness {
    pub subscriptions: Arc<InMemorySubscriptionRepository>,
    pub ledger: Arc<InMemoryScheduledChangeLedger>,
    pub dunning: Arc<InMemoryDunningRepository>,
    pub reconciliation: Arc<InMemoryReconciliationLog>,
    pub events: Arc<InMemoryEventBus>,
    pub locks: Arc<InMemorySubscriptionLocks>,
    pub charges: MockChargeProvider,
    pub notifications: RecordingNotificationSender,
    pub clock: Arc<ManualClock>,
    pub engine: BillingEngine,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_policy(retry_and_email(FinalAction::Cancel))
    }

    pub fn with_policy(policy: DunningPolicy) -> Self {
        let subscriptions = Arc::new(InMemorySubscriptionRepository::new());
        let ledger = Arc::new(InMemoryScheduledChangeLedger::new());
        let dunning = Arc::new(InMemoryDunningRepository::new());
        let reconciliation = Arc::new(InMemoryReconciliationLog::new());
        let events = Arc::new(InMemoryEventBus::new());
        let locks = Arc::new(InMemorySubscriptionLocks::new());
        let charges = MockChargeProvider::succeeding();
        let notifications = RecordingNotificationSender::new();
        let clock = Arc::new(ManualClock::new(jan_1()));

        let ports = BillingPorts {
            subscriptions: subscriptions.clone(),
            ledger: ledger.clone(),
            dunning: dunning.clone(),
            reconciliation: reconciliation.clone(),
            events: events.clone(),
            locks: locks.clone(),
            charges: Arc::new(charges.clone()),
            notifications: Arc::new(notifications.clone()),
            clock: clock.clone(),
        };

        Self {
            subscriptions,
            ledger,
            dunning,
            reconciliation,
            events,
            locks,
            charges,
            notifications,
            clock,
            engine: BillingEngine::new(ports, BillingSettings::new(policy)),
        }
    }

    /// Stores an active subscription starting at the current clock.
    pub async fn subscribe(&self, line_items: Vec<LineItem>) -> Subscription {
        let now = self.clock.now();
        let subscription = Subscription::create(
            SubscriptionId::new(),
            CustomerId::new("cus_integration").unwrap(),
            "USD",
            line_items,
            now,
            DEFAULT_PERIOD_DAYS,
            false,
            now,
        )
        .unwrap();
        self.subscriptions.save(&subscription).await.unwrap();
        subscription
    }

    pub async fn reload(&self, id: &SubscriptionId) -> Subscription {
        self.subscriptions.find_by_id(id).await.unwrap().unwrap()
    }
}
