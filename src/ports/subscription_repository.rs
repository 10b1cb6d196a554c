//! Subscription repository port.
//!
//! Subscriptions are never deleted; cancelled ones stay for history.

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, SubscriptionId, Timestamp};
use crate::domain::subscription::Subscription;

/// Repository port for Subscription aggregate persistence.
///
/// Implementations must ensure:
/// - `update` succeeds only when the stored version equals `expected_version`
/// - reads return the latest committed state
#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    /// Save a new subscription.
    ///
    /// # Errors
    ///
    /// - `ValidationFailed` if the id already exists
    /// - `DatabaseError` on persistence failure
    async fn save(&self, subscription: &Subscription) -> Result<(), DomainError>;

    /// Replace a subscription written at `expected_version`.
    ///
    /// # Errors
    ///
    /// - `SubscriptionNotFound` if it doesn't exist
    /// - `ConcurrentModification` if the stored version moved on
    /// - `DatabaseError` on persistence failure
    async fn update(
        &self,
        subscription: &Subscription,
        expected_version: i64,
    ) -> Result<(), DomainError>;

    async fn find_by_id(&self, id: &SubscriptionId) -> Result<Option<Subscription>, DomainError>;

    /// Active or trialing subscriptions whose period ended at or before `now`,
    /// oldest period end first.
    async fn find_due_for_renewal(
        &self,
        now: Timestamp,
        limit: u32,
    ) -> Result<Vec<Subscription>, DomainError>;
}
