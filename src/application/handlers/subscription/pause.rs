//! PauseSubscriptionHandler - customer-requested pause with optional auto-resume.

use crate::application::handlers::support::{acquire_lock, load_subscription, persist};
use crate::application::BillingPorts;
use crate::domain::billing::BillingError;
use crate::domain::foundation::{SubscriptionId, Timestamp};
use crate::domain::scheduling::{ChangeType, ScheduledChange};
use crate::domain::subscription::Subscription;

#[derive(Debug, Clone)]
pub struct PauseSubscriptionCommand {
    pub subscription_id: SubscriptionId,

    /// When set, a resume is scheduled for this instant.
    pub pause_until: Option<Timestamp>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PauseSubscriptionResult {
    pub subscription: Subscription,
    pub scheduled_resume: Option<ScheduledChange>,
}

pub struct PauseSubscriptionHandler {
    ports: BillingPorts,
}

impl PauseSubscriptionHandler {
    pub fn new(ports: BillingPorts) -> Self {
        Self { ports }
    }

    pub async fn handle(
        &self,
        cmd: PauseSubscriptionCommand,
    ) -> Result<PauseSubscriptionResult, BillingError> {
        let now = self.ports.clock.now();
        let _guard = acquire_lock(self.ports.locks.as_ref(), &cmd.subscription_id).await?;
        let mut subscription =
            load_subscription(self.ports.subscriptions.as_ref(), &cmd.subscription_id).await?;

        let expected_version = subscription.version;
        let event = subscription.pause(cmd.pause_until, cmd.reason.clone(), now)?;
        persist(&self.ports, &subscription, expected_version, vec![event]).await?;

        let scheduled_resume = match cmd.pause_until {
            Some(until) => {
                let change = ScheduledChange::new(
                    subscription.id,
                    ChangeType::Resume,
                    until,
                    subscription.line_items.clone(),
                    subscription.line_items.clone(),
                    cmd.reason,
                    now,
                );
                self.ports.ledger.schedule(&change).await?;
                Some(change)
            }
            None => None,
        };

        Ok(PauseSubscriptionResult {
            subscription,
            scheduled_resume,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::testing::{item, Fixture};
    use crate::domain::subscription::SubscriptionStatus;
    use crate::ports::Clock;

    #[tokio::test]
    async fn pause_until_schedules_resume() {
        let fx = Fixture::new();
        let sub = fx.seed(vec![item("pro", 1, 10_000)]).await;
        let until = fx.clock.now().add_days(14);

        let result = fx
            .engine
            .pause_handler()
            .handle(PauseSubscriptionCommand {
                subscription_id: sub.id,
                pause_until: Some(until),
                reason: Some("vacation".to_string()),
            })
            .await
            .unwrap();

        assert_eq!(result.subscription.status, SubscriptionStatus::Paused);
        assert_eq!(result.subscription.pause_ends_at, Some(until));
        let resume = result.scheduled_resume.expect("scheduled resume");
        assert_eq!(resume.change_type, ChangeType::Resume);
        assert_eq!(resume.scheduled_for, until);
    }

    #[tokio::test]
    async fn open_ended_pause_schedules_nothing() {
        let fx = Fixture::new();
        let sub = fx.seed(vec![item("pro", 1, 10_000)]).await;

        let result = fx
            .engine
            .pause_handler()
            .handle(PauseSubscriptionCommand {
                subscription_id: sub.id,
                pause_until: None,
                reason: None,
            })
            .await
            .unwrap();

        assert!(result.scheduled_resume.is_none());
        assert!(fx.events.has_event("subscription.paused.v1"));
    }

    #[tokio::test]
    async fn trialing_subscription_cannot_pause() {
        let fx = Fixture::new();
        let sub = fx.seed_trial(vec![item("pro", 1, 10_000)]).await;

        let err = fx
            .engine
            .pause_handler()
            .handle(PauseSubscriptionCommand {
                subscription_id: sub.id,
                pause_until: None,
                reason: None,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, BillingError::StateConflict { .. }));
    }
}
