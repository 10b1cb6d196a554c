//! In-memory wiring for handler tests.

use std::sync::Arc;

use crate::adapters::{
    InMemoryDunningRepository, InMemoryEventBus, InMemoryReconciliationLog,
    InMemoryScheduledChangeLedger, InMemorySubscriptionLocks, InMemorySubscriptionRepository,
    ManualClock, MockChargeProvider, RecordingNotificationSender,
};
use crate::domain::dunning::{DunningAction, DunningPolicy, FinalAction};
use crate::domain::foundation::{CustomerId, PlanRef, SubscriptionId, Timestamp};
use crate::domain::subscription::{LineItem, Subscription, DEFAULT_PERIOD_DAYS};
use crate::ports::{Clock, SubscriptionRepository};

use super::{BillingEngine, BillingPorts, BillingSettings};

pub(crate) fn jan_1() -> Timestamp {
    Timestamp::from_unix_secs(1_704_067_200).unwrap()
}

pub(crate) fn item(plan: &str, quantity: u32, unit_amount_cents: i64) -> LineItem {
    LineItem::new(PlanRef::new(plan).unwrap(), quantity, unit_amount_cents).unwrap()
}

pub(crate) fn default_policy() -> DunningPolicy {
    DunningPolicy::uniform(
        &[1, 3, 7],
        &[DunningAction::RetryCharge, DunningAction::SendEmail],
        FinalAction::Cancel,
    )
    .unwrap()
}

pub(crate) struct Fixture {
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

impl Fixture {
    pub fn new() -> Self {
        Self::with_policy(default_policy())
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
        let engine = BillingEngine::new(ports, BillingSettings::new(policy));

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
            engine,
        }
    }

    /// Stores an active subscription whose period starts at the current clock.
    pub async fn seed(&self, line_items: Vec<LineItem>) -> Subscription {
        self.seed_with(line_items, false).await
    }

    pub async fn seed_trial(&self, line_items: Vec<LineItem>) -> Subscription {
        self.seed_with(line_items, true).await
    }

    async fn seed_with(&self, line_items: Vec<LineItem>, trial: bool) -> Subscription {
        let now = self.clock.now();
        let subscription = Subscription::create(
            SubscriptionId::new(),
            CustomerId::new("cus_test").unwrap(),
            "USD",
            line_items,
            now,
            DEFAULT_PERIOD_DAYS,
            trial,
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
