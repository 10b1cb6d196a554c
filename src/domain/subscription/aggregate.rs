//! Subscription aggregate.
//!
//! # Invariants
//!
//! - `current_period_start < current_period_end`
//! - `total_amount_cents == sum(quantity * unit_amount_cents)`, recomputed on every line item change
//! - `cancelled` is terminal; a cancelled subscription never advances its period
//! - `version` increases by one on every mutation
//!
//! Every mutating method takes `now` from the caller's clock and returns the
//! history event describing the change.

use serde::{Deserialize, Serialize};

use crate::domain::billing::{period_end, BillingError};
use crate::domain::foundation::{CustomerId, EventId, StateMachine, SubscriptionId, Timestamp};

use super::line_item::total_of;
use super::{LineItem, SubscriptionEvent, SubscriptionEventKind, SubscriptionStatus};

/// Default billing period length in days.
pub const DEFAULT_PERIOD_DAYS: u32 = 30;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: SubscriptionId,

    /// Customer reference in the payment provider.
    pub customer_id: CustomerId,

    /// ISO-4217 code; all amounts on this subscription use it.
    pub currency: String,

    pub status: SubscriptionStatus,
    pub current_period_start: Timestamp,
    pub current_period_end: Timestamp,

    /// Length of each new billing period.
    pub period_days: u32,

    pub line_items: Vec<LineItem>,
    pub total_amount_cents: i64,

    /// Set while a cancellation is scheduled for period end.
    pub cancel_at: Option<Timestamp>,

    /// Set while paused with a scheduled resume.
    pub pause_ends_at: Option<Timestamp>,

    pub cancelled_at: Option<Timestamp>,

    pub version: i64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Subscription {
    /// Starts a subscription whose first period begins at `period_start`.
    ///
    /// Trials start in `trialing`; the first renewal charges and activates.
    #[allow(clippy::too_many_arguments)]
    pub fn create(
        id: SubscriptionId,
        customer_id: CustomerId,
        currency: impl Into<String>,
        line_items: Vec<LineItem>,
        period_start: Timestamp,
        period_days: u32,
        trial: bool,
        now: Timestamp,
    ) -> Result<Self, BillingError> {
        let currency = currency.into();
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(BillingError::validation(
                "currency",
                format!("'{}' is not an ISO-4217 code", currency),
            ));
        }
        if period_days == 0 {
            return Err(BillingError::validation("period_days", "must be positive"));
        }
        if line_items.is_empty() {
            return Err(BillingError::validation("line_items", "at least one line item is required"));
        }
        let total_amount_cents = total_of(&line_items)?;

        Ok(Self {
            id,
            customer_id,
            currency,
            status: if trial {
                SubscriptionStatus::Trialing
            } else {
                SubscriptionStatus::Active
            },
            current_period_start: period_start,
            current_period_end: period_end(period_start, period_days),
            period_days,
            line_items,
            total_amount_cents,
            cancel_at: None,
            pause_ends_at: None,
            cancelled_at: None,
            version: 0,
            created_at: now,
            updated_at: now,
        })
    }

    /// Verifies the stored invariants. Violations are reported, never repaired.
    pub fn check_invariants(&self) -> Result<(), BillingError> {
        if !self.current_period_start.is_before(&self.current_period_end) {
            return Err(BillingError::data_integrity(format!(
                "subscription {} has an inverted billing period",
                self.id
            )));
        }
        let expected = total_of(&self.line_items).map_err(|_| {
            BillingError::data_integrity(format!(
                "subscription {} line item total overflows i64",
                self.id
            ))
        })?;
        if expected != self.total_amount_cents {
            return Err(BillingError::data_integrity(format!(
                "subscription {} total is {} but line items sum to {}",
                self.id, self.total_amount_cents, expected
            )));
        }
        Ok(())
    }

    pub fn is_cancelled(&self) -> bool {
        self.status == SubscriptionStatus::Cancelled
    }

    /// True when the current period is over and the next one should be billed.
    pub fn is_due_for_renewal(&self, now: Timestamp) -> bool {
        self.status.renews()
            && self.current_period_end <= now
            && self.cancel_at.map_or(true, |cancel_at| cancel_at > now)
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Line items
    // ════════════════════════════════════════════════════════════════════════════

    /// Applies an immediate upgrade. Rejected while cancelled or paused.
    pub fn apply_upgrade(
        &mut self,
        new_items: Vec<LineItem>,
        reason: Option<String>,
        now: Timestamp,
    ) -> Result<SubscriptionEvent, BillingError> {
        match self.status {
            SubscriptionStatus::Cancelled | SubscriptionStatus::Paused => {
                return Err(BillingError::state_conflict(self.status.as_str(), "upgrade"));
            }
            _ => {}
        }
        let from = self.status;
        self.set_line_items(new_items)?;
        self.touch(now);
        Ok(self.event(SubscriptionEventKind::Upgraded, from, reason, now))
    }

    /// Replaces line items without proration (scheduled changes, dunning downgrade).
    pub fn replace_line_items(
        &mut self,
        new_items: Vec<LineItem>,
        reason: Option<String>,
        now: Timestamp,
    ) -> Result<SubscriptionEvent, BillingError> {
        if self.is_cancelled() {
            return Err(BillingError::state_conflict(self.status.as_str(), "change line items"));
        }
        let from = self.status;
        self.set_line_items(new_items)?;
        self.touch(now);
        Ok(self.event(SubscriptionEventKind::LineItemsReplaced, from, reason, now))
    }

    fn set_line_items(&mut self, items: Vec<LineItem>) -> Result<(), BillingError> {
        if items.is_empty() {
            return Err(BillingError::validation("line_items", "at least one line item is required"));
        }
        self.total_amount_cents = total_of(&items)?;
        self.line_items = items;
        Ok(())
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Cancellation
    // ════════════════════════════════════════════════════════════════════════════

    /// Marks the subscription to cancel at the end of the current period.
    pub fn schedule_cancellation(
        &mut self,
        reason: Option<String>,
        now: Timestamp,
    ) -> Result<SubscriptionEvent, BillingError> {
        if self.is_cancelled() || self.cancel_at.is_some() {
            return Err(BillingError::already_cancelled(self.id));
        }
        self.cancel_at = Some(self.current_period_end);
        self.touch(now);
        Ok(self.event(SubscriptionEventKind::CancellationScheduled, self.status, reason, now))
    }

    /// Withdraws a scheduled cancellation.
    pub fn reactivate(&mut self, now: Timestamp) -> Result<SubscriptionEvent, BillingError> {
        if self.is_cancelled() {
            return Err(BillingError::state_conflict(self.status.as_str(), "reactivate"));
        }
        if self.cancel_at.is_none() {
            return Err(BillingError::state_conflict(
                "no pending cancellation",
                "reactivate",
            ));
        }
        self.cancel_at = None;
        self.touch(now);
        Ok(self.event(SubscriptionEventKind::Reactivated, self.status, None, now))
    }

    /// Terminates the subscription.
    pub fn cancel(&mut self, reason: Option<String>, now: Timestamp) -> Result<SubscriptionEvent, BillingError> {
        if self.is_cancelled() {
            return Err(BillingError::already_cancelled(self.id));
        }
        let from = self.transition(SubscriptionStatus::Cancelled, "cancel")?;
        self.cancelled_at = Some(now);
        self.pause_ends_at = None;
        self.touch(now);
        Ok(self.event(SubscriptionEventKind::Cancelled, from, reason, now))
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Pause / resume
    // ════════════════════════════════════════════════════════════════════════════

    /// Customer-requested pause. Only active subscriptions can pause.
    pub fn pause(
        &mut self,
        pause_until: Option<Timestamp>,
        reason: Option<String>,
        now: Timestamp,
    ) -> Result<SubscriptionEvent, BillingError> {
        if self.status != SubscriptionStatus::Active {
            return Err(BillingError::state_conflict(self.status.as_str(), "pause"));
        }
        if let Some(until) = pause_until {
            if until <= now {
                return Err(BillingError::validation("pause_until", "must be in the future"));
            }
        }
        let from = self.transition(SubscriptionStatus::Paused, "pause")?;
        self.pause_ends_at = pause_until;
        self.touch(now);
        Ok(self.event(SubscriptionEventKind::Paused, from, reason, now))
    }

    /// Pause imposed by an exhausted dunning campaign.
    pub fn suspend(&mut self, reason: Option<String>, now: Timestamp) -> Result<SubscriptionEvent, BillingError> {
        let from = self.transition(SubscriptionStatus::Paused, "pause")?;
        self.pause_ends_at = None;
        self.touch(now);
        Ok(self.event(SubscriptionEventKind::Paused, from, reason, now))
    }

    /// Resumes billing with a fresh period starting at `now`.
    pub fn resume(&mut self, now: Timestamp) -> Result<SubscriptionEvent, BillingError> {
        if self.status != SubscriptionStatus::Paused {
            return Err(BillingError::state_conflict(self.status.as_str(), "resume"));
        }
        let from = self.transition(SubscriptionStatus::Active, "resume")?;
        self.current_period_start = now;
        self.current_period_end = period_end(now, self.period_days);
        self.pause_ends_at = None;
        self.touch(now);
        Ok(self.event(SubscriptionEventKind::Resumed, from, None, now))
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Renewal and payment status
    // ════════════════════════════════════════════════════════════════════════════

    /// Advances to the next period. The new period starts where the old one ended.
    pub fn renew(&mut self, now: Timestamp) -> Result<SubscriptionEvent, BillingError> {
        if !self.status.renews() {
            return Err(BillingError::state_conflict(self.status.as_str(), "renew"));
        }
        if self.current_period_end > now {
            return Err(BillingError::validation(
                "current_period_end",
                "the current period has not ended yet",
            ));
        }
        let from = self.status;
        if from == SubscriptionStatus::Trialing {
            self.transition(SubscriptionStatus::Active, "renew")?;
        }
        self.current_period_start = self.current_period_end;
        self.current_period_end = period_end(self.current_period_start, self.period_days);
        self.touch(now);
        Ok(self.event(SubscriptionEventKind::Renewed, from, None, now))
    }

    /// Enters `past_due`. Returns `None` if already past due.
    pub fn mark_past_due(
        &mut self,
        reason: Option<String>,
        now: Timestamp,
    ) -> Result<Option<SubscriptionEvent>, BillingError> {
        if self.status == SubscriptionStatus::PastDue {
            return Ok(None);
        }
        let from = self.transition(SubscriptionStatus::PastDue, "mark past due")?;
        self.touch(now);
        Ok(Some(self.event(SubscriptionEventKind::MarkedPastDue, from, reason, now)))
    }

    /// Leaves `past_due` after a successful retry. The period is unchanged.
    ///
    /// Returns `None` when there is nothing to recover from (e.g. cancelled meanwhile).
    pub fn recover(&mut self, now: Timestamp) -> Result<Option<SubscriptionEvent>, BillingError> {
        if self.status != SubscriptionStatus::PastDue {
            return Ok(None);
        }
        let from = self.transition(SubscriptionStatus::Active, "recover")?;
        self.touch(now);
        Ok(Some(self.event(SubscriptionEventKind::Recovered, from, None, now)))
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Helpers
    // ════════════════════════════════════════════════════════════════════════════

    fn transition(&mut self, target: SubscriptionStatus, action: &str) -> Result<SubscriptionStatus, BillingError> {
        let from = self.status;
        self.status = from
            .transition_to(target)
            .map_err(|_| BillingError::state_conflict(from.as_str(), action))?;
        Ok(from)
    }

    fn touch(&mut self, now: Timestamp) {
        self.version += 1;
        self.updated_at = now;
    }

    fn event(
        &self,
        kind: SubscriptionEventKind,
        from_status: SubscriptionStatus,
        reason: Option<String>,
        now: Timestamp,
    ) -> SubscriptionEvent {
        SubscriptionEvent {
            event_id: EventId::new(),
            subscription_id: self.id,
            kind,
            from_status,
            to_status: self.status,
            total_amount_cents: self.total_amount_cents,
            version: self.version,
            reason,
            occurred_at: now,
        }
    }
}
