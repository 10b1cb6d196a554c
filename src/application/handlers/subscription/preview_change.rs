//! PreviewChangeHandler - read-only proration quote.

use std::sync::Arc;

use crate::application::handlers::support::load_subscription;
use crate::domain::billing::{
    calculate_downgrade_proration, calculate_upgrade_proration, BillingError, ProrationResult,
};
use crate::domain::foundation::SubscriptionId;
use crate::domain::scheduling::ChangeType;
use crate::domain::subscription::{apply_changes, total_of, LineItemChange};
use crate::ports::{Clock, SubscriptionRepository};

#[derive(Debug, Clone)]
pub struct PreviewChangeCommand {
    pub subscription_id: SubscriptionId,
    pub change_type: ChangeType,
    pub changes: Vec<LineItemChange>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewChangeResult {
    pub proration: ProrationResult,

    /// Total after the change takes effect.
    pub projected_total_cents: i64,
}

/// Quotes an upgrade or downgrade without touching any state.
pub struct PreviewChangeHandler {
    repository: Arc<dyn SubscriptionRepository>,
    clock: Arc<dyn Clock>,
}

impl PreviewChangeHandler {
    pub fn new(repository: Arc<dyn SubscriptionRepository>, clock: Arc<dyn Clock>) -> Self {
        Self { repository, clock }
    }

    pub async fn handle(&self, cmd: PreviewChangeCommand) -> Result<PreviewChangeResult, BillingError> {
        let now = self.clock.now();
        let subscription = load_subscription(self.repository.as_ref(), &cmd.subscription_id).await?;

        if subscription.is_cancelled() {
            return Err(BillingError::state_conflict(
                subscription.status.as_str(),
                "preview a change",
            ));
        }

        let new_items = apply_changes(&subscription.line_items, &cmd.changes)?;
        let projected_total_cents = total_of(&new_items)?;

        let proration = match cmd.change_type {
            ChangeType::Upgrade => calculate_upgrade_proration(
                subscription.current_period_start,
                subscription.current_period_end,
                subscription.total_amount_cents,
                projected_total_cents,
                now,
            )?,
            ChangeType::Downgrade => calculate_downgrade_proration(
                subscription.current_period_start,
                subscription.current_period_end,
                now,
            ),
            other => {
                return Err(BillingError::validation(
                    "change_type",
                    format!("cannot preview a {} change", other),
                ))
            }
        };

        Ok(PreviewChangeResult {
            proration,
            projected_total_cents,
        })
    }
}
