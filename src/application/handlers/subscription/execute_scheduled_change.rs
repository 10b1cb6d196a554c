//! ExecuteScheduledChangeHandler - applies one due scheduled change exactly once.

use crate::application::handlers::support::{
    acquire_lock, load_subscription, persist, resume_and_charge, terminate, ImmediateCharge,
};
use crate::application::{BillingPorts, BillingSettings};
use crate::domain::billing::{BillingError, EntityKind};
use crate::domain::foundation::{ScheduledChangeId, SubscriptionId, Timestamp};
use crate::domain::scheduling::{ChangeType, ScheduledChange};

#[derive(Debug, Clone)]
pub struct ExecuteScheduledChangeCommand {
    pub change_id: ScheduledChangeId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// The change was applied and marked completed.
    Completed,

    /// Another worker claimed the change first, or it is no longer scheduled.
    NotClaimed,

    /// Applying the change failed; the ledger keeps it as `failed`.
    Failed { detail: String },
}

#[derive(Debug, Clone)]
pub struct ExecuteScheduledChangeResult {
    pub change_id: ScheduledChangeId,
    pub subscription_id: SubscriptionId,
    pub change_type: ChangeType,
    pub outcome: ExecutionOutcome,

    /// Set for resume changes, which bill the fresh period.
    pub charge: Option<ImmediateCharge>,
}

/// Claims a due change, applies it under the subscription lock, and marks
/// it completed or failed.
///
/// Upgrades and downgrades apply `to_snapshot` without proration. A cancel
/// terminates the subscription and retires its other pending work.
pub struct ExecuteScheduledChangeHandler {
    ports: BillingPorts,
    settings: BillingSettings,
}

impl ExecuteScheduledChangeHandler {
    pub fn new(ports: BillingPorts, settings: BillingSettings) -> Self {
        Self { ports, settings }
    }

    pub async fn handle(
        &self,
        cmd: ExecuteScheduledChangeCommand,
    ) -> Result<ExecuteScheduledChangeResult, BillingError> {
        let now = self.ports.clock.now();
        let change = self
            .ports
            .ledger
            .find_by_id(&cmd.change_id)
            .await?
            .ok_or_else(|| BillingError::not_found(EntityKind::ScheduledChange, cmd.change_id))?;

        if change.is_pending() && change.scheduled_for > now {
            return Err(BillingError::validation(
                "scheduled_for",
                format!("change {} is not due until {}", change.id, change.scheduled_for),
            ));
        }

        let _guard = acquire_lock(self.ports.locks.as_ref(), &change.subscription_id).await?;

        let mut result = ExecuteScheduledChangeResult {
            change_id: change.id,
            subscription_id: change.subscription_id,
            change_type: change.change_type,
            outcome: ExecutionOutcome::NotClaimed,
            charge: None,
        };

        if !self.ports.ledger.claim(&change.id, now).await? {
            tracing::debug!(
                change_id = %change.id,
                subscription_id = %change.subscription_id,
                "Scheduled change claimed elsewhere"
            );
            return Ok(result);
        }

        match self.apply(&change, now).await {
            Ok(charge) => {
                if let Err(e) = self.ports.ledger.complete(&change.id, now).await {
                    return Err(self.mark_uncompleted(&change, e.into(), now).await);
                }
                tracing::info!(
                    change_id = %change.id,
                    subscription_id = %change.subscription_id,
                    change_type = %change.change_type,
                    "Scheduled change executed"
                );
                result.outcome = ExecutionOutcome::Completed;
                result.charge = charge;
            }
            Err(e) => {
                let detail = e.message();
                self.ports.ledger.fail(&change.id, &detail, now).await?;
                tracing::error!(
                    change_id = %change.id,
                    subscription_id = %change.subscription_id,
                    change_type = %change.change_type,
                    error = %e,
                    "Scheduled change failed"
                );
                result.outcome = ExecutionOutcome::Failed { detail };
            }
        }
        Ok(result)
    }

    /// The change was applied but the ledger refused `complete`. Moves it
    /// to `failed` so it does not sit in `processing` unnoticed.
    async fn mark_uncompleted(
        &self,
        change: &ScheduledChange,
        error: BillingError,
        now: Timestamp,
    ) -> BillingError {
        tracing::error!(
            change_id = %change.id,
            subscription_id = %change.subscription_id,
            change_type = %change.change_type,
            error = %error,
            "Scheduled change applied but could not be marked completed"
        );
        let detail = format!("applied but not marked completed: {}", error.message());
        if let Err(e) = self.ports.ledger.fail(&change.id, &detail, now).await {
            tracing::error!(
                change_id = %change.id,
                error = %e,
                "Failed to mark scheduled change failed"
            );
        }
        error
    }

    async fn apply(
        &self,
        change: &ScheduledChange,
        now: Timestamp,
    ) -> Result<Option<ImmediateCharge>, BillingError> {
        let mut subscription =
            load_subscription(self.ports.subscriptions.as_ref(), &change.subscription_id).await?;
        let expected_version = subscription.version;

        match change.change_type {
            ChangeType::Upgrade | ChangeType::Downgrade => {
                let event = subscription.replace_line_items(
                    change.to_snapshot.clone(),
                    change.reason.clone(),
                    now,
                )?;
                persist(&self.ports, &subscription, expected_version, vec![event]).await?;
                Ok(None)
            }
            ChangeType::Cancel => {
                terminate(&self.ports, &mut subscription, change.reason.clone(), now).await?;
                Ok(None)
            }
            ChangeType::Pause => {
                let event = subscription.pause(None, change.reason.clone(), now)?;
                persist(&self.ports, &subscription, expected_version, vec![event]).await?;
                Ok(None)
            }
            ChangeType::Resume => {
                let charge =
                    resume_and_charge(&self.ports, &self.settings, &mut subscription, now).await?;
                Ok(Some(charge))
            }
        }
    }
}
