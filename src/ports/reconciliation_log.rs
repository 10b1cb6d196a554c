//! Reconciliation log port.

use async_trait::async_trait;

use crate::domain::billing::ReconciliationRecord;
use crate::domain::foundation::{DomainError, SubscriptionId};

/// Append-only store for charges that need manual follow-up.
#[async_trait]
pub trait ReconciliationLog: Send + Sync {
    async fn record(&self, record: &ReconciliationRecord) -> Result<(), DomainError>;

    async fn for_subscription(
        &self,
        subscription_id: &SubscriptionId,
    ) -> Result<Vec<ReconciliationRecord>, DomainError>;
}
