//! ResumeSubscriptionHandler - ends a pause and bills a fresh period.

use crate::application::handlers::support::{
    acquire_lock, load_subscription, resume_and_charge, ImmediateCharge,
};
use crate::application::{BillingPorts, BillingSettings};
use crate::domain::billing::BillingError;
use crate::domain::foundation::SubscriptionId;
use crate::domain::scheduling::ChangeType;
use crate::domain::subscription::Subscription;

#[derive(Debug, Clone)]
pub struct ResumeSubscriptionCommand {
    pub subscription_id: SubscriptionId,
}

#[derive(Debug, Clone)]
pub struct ResumeSubscriptionResult {
    pub subscription: Subscription,
    pub charge: ImmediateCharge,
}

/// Resumes now: the new period starts at the current instant and is charged
/// immediately. A pending scheduled resume becomes redundant and is withdrawn.
pub struct ResumeSubscriptionHandler {
    ports: BillingPorts,
    settings: BillingSettings,
}

impl ResumeSubscriptionHandler {
    pub fn new(ports: BillingPorts, settings: BillingSettings) -> Self {
        Self { ports, settings }
    }

    pub async fn handle(
        &self,
        cmd: ResumeSubscriptionCommand,
    ) -> Result<ResumeSubscriptionResult, BillingError> {
        let now = self.ports.clock.now();
        let _guard = acquire_lock(self.ports.locks.as_ref(), &cmd.subscription_id).await?;
        let mut subscription =
            load_subscription(self.ports.subscriptions.as_ref(), &cmd.subscription_id).await?;

        let charge = resume_and_charge(&self.ports, &self.settings, &mut subscription, now).await?;

        self.ports
            .ledger
            .cancel_pending(&subscription.id, ChangeType::Resume, now)
            .await?;

        Ok(ResumeSubscriptionResult {
            subscription,
            charge,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::handlers::subscription::PauseSubscriptionCommand;
    use crate::application::testing::{item, Fixture};
    use crate::domain::billing::ReconciliationKind;
    use crate::domain::subscription::SubscriptionStatus;
    use crate::ports::{ChargeOutcome, Clock, ScheduledChangeLedger};

    async fn paused(fx: &Fixture) -> Subscription {
        let sub = fx.seed(vec![item("pro", 1, 10_000)]).await;
        fx.engine
            .pause_handler()
            .handle(PauseSubscriptionCommand {
                subscription_id: sub.id,
                pause_until: Some(fx.clock.now().add_days(30)),
                reason: None,
            })
            .await
            .unwrap()
            .subscription
    }

    #[tokio::test]
    async fn resume_starts_fresh_period_and_charges_it() {
        let fx = Fixture::new();
        let sub = paused(&fx).await;
        fx.clock.advance_days(9);
        let resumed_at = fx.clock.now();

        let result = fx
            .engine
            .resume_handler()
            .handle(ResumeSubscriptionCommand {
                subscription_id: sub.id,
            })
            .await
            .unwrap();

        assert_eq!(result.subscription.status, SubscriptionStatus::Active);
        assert_eq!(result.subscription.current_period_start, resumed_at);
        assert_eq!(result.subscription.current_period_end, resumed_at.add_days(30));
        assert!(result.charge.outcome.unwrap().is_success());
        assert_eq!(fx.charges.calls()[0].amount_cents, 10_000);

        // the scheduled auto-resume is no longer needed
        assert!(fx.ledger.find_pending(&sub.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_resume_charge_keeps_subscription_active() {
        let fx = Fixture::new();
        let sub = paused(&fx).await;
        fx.charges.push_outcome(ChargeOutcome::failed("expired_card"));

        let result = fx
            .engine
            .resume_handler()
            .handle(ResumeSubscriptionCommand {
                subscription_id: sub.id,
            })
            .await
            .unwrap();

        assert_eq!(result.subscription.status, SubscriptionStatus::Active);
        let record = result.charge.reconciliation.expect("reconciliation record");
        assert_eq!(record.kind, ReconciliationKind::ResumeCharge);
        assert_eq!(record.amount_cents, 10_000);
    }

    #[tokio::test]
    async fn active_subscription_cannot_resume() {
        let fx = Fixture::new();
        let sub = fx.seed(vec![item("pro", 1, 10_000)]).await;

        let err = fx
            .engine
            .resume_handler()
            .handle(ResumeSubscriptionCommand {
                subscription_id: sub.id,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, BillingError::StateConflict { .. }));
        assert_eq!(fx.charges.call_count(), 0);
    }
}
