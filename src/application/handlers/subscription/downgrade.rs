//! DowngradeSubscriptionHandler - defers a line item downgrade to period end.

use crate::application::handlers::support::{acquire_lock, load_subscription};
use crate::application::BillingPorts;
use crate::domain::billing::{calculate_downgrade_proration, BillingError, ProrationResult};
use crate::domain::foundation::{ScheduledChangeId, SubscriptionId};
use crate::domain::scheduling::{ChangeType, ScheduledChange};
use crate::domain::subscription::{apply_changes, total_of, LineItemChange};

#[derive(Debug, Clone)]
pub struct DowngradeSubscriptionCommand {
    pub subscription_id: SubscriptionId,
    pub changes: Vec<LineItemChange>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DowngradeSubscriptionResult {
    pub scheduled_change: ScheduledChange,

    /// Earlier pending downgrade replaced by this one.
    pub superseded: Option<ScheduledChangeId>,

    pub proration: ProrationResult,
}

/// Records a downgrade for the end of the current period.
///
/// The subscription's line items stay untouched until the scheduler runs it.
pub struct DowngradeSubscriptionHandler {
    ports: BillingPorts,
}

impl DowngradeSubscriptionHandler {
    pub fn new(ports: BillingPorts) -> Self {
        Self { ports }
    }

    pub async fn handle(
        &self,
        cmd: DowngradeSubscriptionCommand,
    ) -> Result<DowngradeSubscriptionResult, BillingError> {
        let now = self.ports.clock.now();
        let _guard = acquire_lock(self.ports.locks.as_ref(), &cmd.subscription_id).await?;
        let subscription =
            load_subscription(self.ports.subscriptions.as_ref(), &cmd.subscription_id).await?;

        if subscription.is_cancelled() {
            return Err(BillingError::state_conflict(subscription.status.as_str(), "downgrade"));
        }

        let new_items = apply_changes(&subscription.line_items, &cmd.changes)?;
        total_of(&new_items)?;

        let change = ScheduledChange::new(
            subscription.id,
            ChangeType::Downgrade,
            subscription.current_period_end,
            subscription.line_items.clone(),
            new_items,
            cmd.reason,
            now,
        );
        let superseded = self.ports.ledger.schedule(&change).await?;

        tracing::info!(
            subscription_id = %subscription.id,
            change_id = %change.id,
            scheduled_for = %change.scheduled_for,
            superseded = ?superseded,
            "Downgrade scheduled"
        );

        Ok(DowngradeSubscriptionResult {
            proration: calculate_downgrade_proration(
                subscription.current_period_start,
                subscription.current_period_end,
                now,
            ),
            scheduled_change: change,
            superseded,
        })
    }
}
