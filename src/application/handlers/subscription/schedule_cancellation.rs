//! ScheduleCancellationHandler - cancel at the end of the current period.

use crate::application::handlers::support::{acquire_lock, load_subscription, persist};
use crate::application::BillingPorts;
use crate::domain::billing::BillingError;
use crate::domain::foundation::{SubscriptionId, Timestamp};
use crate::domain::scheduling::{ChangeType, ScheduledChange};
use crate::domain::subscription::Subscription;

#[derive(Debug, Clone)]
pub struct ScheduleCancellationCommand {
    pub subscription_id: SubscriptionId,
    pub reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ScheduleCancellationResult {
    pub subscription: Subscription,
    pub scheduled_change: ScheduledChange,

    /// When the subscription will actually be cancelled.
    pub effective_at: Timestamp,
}

/// Sets `cancel_at` to the period end and records the matching scheduled change.
///
/// The customer keeps service until then and can still reactivate.
pub struct ScheduleCancellationHandler {
    ports: BillingPorts,
}

impl ScheduleCancellationHandler {
    pub fn new(ports: BillingPorts) -> Self {
        Self { ports }
    }

    pub async fn handle(
        &self,
        cmd: ScheduleCancellationCommand,
    ) -> Result<ScheduleCancellationResult, BillingError> {
        let now = self.ports.clock.now();
        let _guard = acquire_lock(self.ports.locks.as_ref(), &cmd.subscription_id).await?;
        let mut subscription =
            load_subscription(self.ports.subscriptions.as_ref(), &cmd.subscription_id).await?;

        let expected_version = subscription.version;
        let event = subscription.schedule_cancellation(cmd.reason.clone(), now)?;
        let effective_at = subscription.current_period_end;

        persist(&self.ports, &subscription, expected_version, vec![event]).await?;

        let change = ScheduledChange::new(
            subscription.id,
            ChangeType::Cancel,
            effective_at,
            subscription.line_items.clone(),
            subscription.line_items.clone(),
            cmd.reason,
            now,
        );
        self.ports.ledger.schedule(&change).await?;

        Ok(ScheduleCancellationResult {
            subscription,
            scheduled_change: change,
            effective_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::testing::{item, Fixture};
    use crate::ports::ScheduledChangeLedger;

    fn command(subscription_id: SubscriptionId) -> ScheduleCancellationCommand {
        ScheduleCancellationCommand {
            subscription_id,
            reason: Some("too expensive".to_string()),
        }
    }

    #[tokio::test]
    async fn cancellation_is_scheduled_for_period_end() {
        let fx = Fixture::new();
        let sub = fx.seed(vec![item("pro", 1, 10_000)]).await;
        fx.clock.advance_days(5);

        let result = fx
            .engine
            .schedule_cancellation_handler()
            .handle(command(sub.id))
            .await
            .unwrap();

        assert_eq!(result.effective_at, sub.current_period_end);
        assert_eq!(result.subscription.cancel_at, Some(sub.current_period_end));
        assert_eq!(result.scheduled_change.change_type, ChangeType::Cancel);

        let pending = fx.ledger.find_pending(&sub.id).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert!(fx.events.has_event("subscription.cancellation_scheduled.v1"));
    }

    #[tokio::test]
    async fn second_request_is_already_cancelled() {
        let fx = Fixture::new();
        let sub = fx.seed(vec![item("pro", 1, 10_000)]).await;
        let handler = fx.engine.schedule_cancellation_handler();

        handler.handle(command(sub.id)).await.unwrap();
        let err = handler.handle(command(sub.id)).await.unwrap_err();

        assert!(matches!(err, BillingError::AlreadyCancelled { .. }));
        assert_eq!(fx.ledger.find_pending(&sub.id).await.unwrap().len(), 1);
    }
}
