//! Shared dependencies for the billing handlers.

use std::sync::Arc;
use std::time::Duration;

use crate::domain::dunning::DunningPolicy;
use crate::ports::{
    ChargeProvider, Clock, DunningRepository, EventPublisher, NotificationSender,
    ReconciliationLog, ScheduledChangeLedger, SubscriptionLocks, SubscriptionRepository,
};

use super::handlers::{
    CancelDunningCampaignHandler, DowngradeSubscriptionHandler, ExecuteScheduledChangeHandler,
    PauseSubscriptionHandler, PreviewChangeHandler, ProcessDunningAttemptHandler,
    ReactivateSubscriptionHandler, RecordPaymentFailureHandler, RenewSubscriptionHandler,
    ResumeSubscriptionHandler, ScheduleCancellationHandler, UpgradeSubscriptionHandler,
};

/// Every port the billing handlers talk to.
///
/// Cloned into each handler; all fields are shared.
#[derive(Clone)]
pub struct BillingPorts {
    pub subscriptions: Arc<dyn SubscriptionRepository>,
    pub ledger: Arc<dyn ScheduledChangeLedger>,
    pub dunning: Arc<dyn DunningRepository>,
    pub reconciliation: Arc<dyn ReconciliationLog>,
    pub events: Arc<dyn EventPublisher>,
    pub locks: Arc<dyn SubscriptionLocks>,
    pub charges: Arc<dyn ChargeProvider>,
    pub notifications: Arc<dyn NotificationSender>,
    pub clock: Arc<dyn Clock>,
}

/// Tunables that shape handler behaviour.
#[derive(Debug, Clone)]
pub struct BillingSettings {
    /// Upper bound on a single charge call; a timeout counts as a failed charge.
    pub charge_timeout: Duration,

    /// How long a claimed dunning attempt stays invisible to other workers.
    pub claim_lease: Duration,

    pub dunning_policy: DunningPolicy,
}

impl BillingSettings {
    pub fn new(dunning_policy: DunningPolicy) -> Self {
        Self {
            charge_timeout: Duration::from_secs(30),
            claim_lease: Duration::from_secs(300),
            dunning_policy,
        }
    }

    pub fn with_charge_timeout(mut self, timeout: Duration) -> Self {
        self.charge_timeout = timeout;
        self
    }

    pub fn with_claim_lease(mut self, lease: Duration) -> Self {
        self.claim_lease = lease;
        self
    }
}

/// Ports plus settings; builds handlers on demand.
#[derive(Clone)]
pub struct BillingEngine {
    ports: BillingPorts,
    settings: BillingSettings,
}

impl BillingEngine {
    pub fn new(ports: BillingPorts, settings: BillingSettings) -> Self {
        Self { ports, settings }
    }

    pub fn ports(&self) -> &BillingPorts {
        &self.ports
    }

    pub fn settings(&self) -> &BillingSettings {
        &self.settings
    }

    pub fn upgrade_handler(&self) -> UpgradeSubscriptionHandler {
        UpgradeSubscriptionHandler::new(self.ports.clone(), self.settings.clone())
    }

    pub fn downgrade_handler(&self) -> DowngradeSubscriptionHandler {
        DowngradeSubscriptionHandler::new(self.ports.clone())
    }

    pub fn schedule_cancellation_handler(&self) -> ScheduleCancellationHandler {
        ScheduleCancellationHandler::new(self.ports.clone())
    }

    pub fn reactivate_handler(&self) -> ReactivateSubscriptionHandler {
        ReactivateSubscriptionHandler::new(self.ports.clone())
    }

    pub fn pause_handler(&self) -> PauseSubscriptionHandler {
        PauseSubscriptionHandler::new(self.ports.clone())
    }

    pub fn resume_handler(&self) -> ResumeSubscriptionHandler {
        ResumeSubscriptionHandler::new(self.ports.clone(), self.settings.clone())
    }

    pub fn preview_handler(&self) -> PreviewChangeHandler {
        PreviewChangeHandler::new(self.ports.subscriptions.clone(), self.ports.clock.clone())
    }

    pub fn execute_scheduled_change_handler(&self) -> ExecuteScheduledChangeHandler {
        ExecuteScheduledChangeHandler::new(self.ports.clone(), self.settings.clone())
    }

    pub fn renew_handler(&self) -> RenewSubscriptionHandler {
        RenewSubscriptionHandler::new(self.ports.clone(), self.settings.clone())
    }

    pub fn record_payment_failure_handler(&self) -> RecordPaymentFailureHandler {
        RecordPaymentFailureHandler::new(self.ports.clone(), self.settings.clone())
    }

    pub fn process_dunning_attempt_handler(&self) -> ProcessDunningAttemptHandler {
        ProcessDunningAttemptHandler::new(self.ports.clone(), self.settings.clone())
    }

    pub fn cancel_dunning_campaign_handler(&self) -> CancelDunningCampaignHandler {
        CancelDunningCampaignHandler::new(self.ports.clone())
    }
}
