//! ReactivateSubscriptionHandler - withdraws a scheduled cancellation.

use crate::application::handlers::support::{acquire_lock, load_subscription, persist};
use crate::application::BillingPorts;
use crate::domain::billing::BillingError;
use crate::domain::foundation::SubscriptionId;
use crate::domain::scheduling::ChangeType;
use crate::domain::subscription::Subscription;

#[derive(Debug, Clone)]
pub struct ReactivateSubscriptionCommand {
    pub subscription_id: SubscriptionId,
}

#[derive(Debug, Clone)]
pub struct ReactivateSubscriptionResult {
    pub subscription: Subscription,

    /// Whether a pending cancel change was withdrawn from the ledger.
    pub withdrew_scheduled_cancel: bool,
}

pub struct ReactivateSubscriptionHandler {
    ports: BillingPorts,
}

impl ReactivateSubscriptionHandler {
    pub fn new(ports: BillingPorts) -> Self {
        Self { ports }
    }

    pub async fn handle(
        &self,
        cmd: ReactivateSubscriptionCommand,
    ) -> Result<ReactivateSubscriptionResult, BillingError> {
        let now = self.ports.clock.now();
        let _guard = acquire_lock(self.ports.locks.as_ref(), &cmd.subscription_id).await?;
        let mut subscription =
            load_subscription(self.ports.subscriptions.as_ref(), &cmd.subscription_id).await?;

        let expected_version = subscription.version;
        let event = subscription.reactivate(now)?;
        persist(&self.ports, &subscription, expected_version, vec![event]).await?;

        let withdrew_scheduled_cancel = self
            .ports
            .ledger
            .cancel_pending(&subscription.id, ChangeType::Cancel, now)
            .await?;

        Ok(ReactivateSubscriptionResult {
            subscription,
            withdrew_scheduled_cancel,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::handlers::subscription::ScheduleCancellationCommand;
    use crate::application::testing::{item, Fixture};
    use crate::ports::ScheduledChangeLedger;

    #[tokio::test]
    async fn reactivate_before_cancel_at_keeps_subscription() {
        let fx = Fixture::new();
        let sub = fx.seed(vec![item("pro", 1, 10_000)]).await;
        fx.engine
            .schedule_cancellation_handler()
            .handle(ScheduleCancellationCommand {
                subscription_id: sub.id,
                reason: None,
            })
            .await
            .unwrap();
        fx.clock.advance_days(10);

        let result = fx
            .engine
            .reactivate_handler()
            .handle(ReactivateSubscriptionCommand {
                subscription_id: sub.id,
            })
            .await
            .unwrap();

        assert!(result.subscription.cancel_at.is_none());
        assert!(result.withdrew_scheduled_cancel);
        assert!(fx.ledger.find_pending(&sub.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn reactivate_without_pending_cancel_conflicts() {
        let fx = Fixture::new();
        let sub = fx.seed(vec![item("pro", 1, 10_000)]).await;

        let err = fx
            .engine
            .reactivate_handler()
            .handle(ReactivateSubscriptionCommand {
                subscription_id: sub.id,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, BillingError::StateConflict { .. }));
    }
}
