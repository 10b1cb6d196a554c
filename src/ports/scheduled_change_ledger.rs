//! Scheduled change ledger port.
//!
//! Holds future-dated mutations and hands each one to exactly one worker.

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, ScheduledChangeId, SubscriptionId, Timestamp};
use crate::domain::scheduling::{ChangeType, ScheduledChange};

/// Ledger port for scheduled changes.
///
/// Implementations must ensure:
/// - at most one `scheduled` change per (subscription, change type)
/// - `claim` is an atomic conditional update: of any number of concurrent
///   callers, exactly one sees `true`
#[async_trait]
pub trait ScheduledChangeLedger: Send + Sync {
    /// Records `change`, cancelling any pending change of the same type for
    /// the same subscription in the same atomic step.
    ///
    /// Returns the id of the superseded change, if there was one.
    async fn schedule(
        &self,
        change: &ScheduledChange,
    ) -> Result<Option<ScheduledChangeId>, DomainError>;

    /// Pending changes with `scheduled_for <= now`, earliest first.
    async fn due_changes(
        &self,
        now: Timestamp,
        limit: u32,
    ) -> Result<Vec<ScheduledChange>, DomainError>;

    /// Moves a change from `scheduled` to `processing`.
    ///
    /// Returns `false` if it was not `scheduled` (already claimed or cancelled).
    async fn claim(&self, id: &ScheduledChangeId, now: Timestamp) -> Result<bool, DomainError>;

    /// Marks a processing change as completed.
    async fn complete(&self, id: &ScheduledChangeId, now: Timestamp) -> Result<(), DomainError>;

    /// Marks a processing change as failed with the error detail.
    async fn fail(
        &self,
        id: &ScheduledChangeId,
        detail: &str,
        now: Timestamp,
    ) -> Result<(), DomainError>;

    /// Cancels the pending change of `change_type` for a subscription.
    ///
    /// Returns `true` if one was cancelled.
    async fn cancel_pending(
        &self,
        subscription_id: &SubscriptionId,
        change_type: ChangeType,
        now: Timestamp,
    ) -> Result<bool, DomainError>;

    /// All pending changes for a subscription, earliest first.
    async fn find_pending(
        &self,
        subscription_id: &SubscriptionId,
    ) -> Result<Vec<ScheduledChange>, DomainError>;

    async fn find_by_id(
        &self,
        id: &ScheduledChangeId,
    ) -> Result<Option<ScheduledChange>, DomainError>;
}
