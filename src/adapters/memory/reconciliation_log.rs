//! In-memory reconciliation log.

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::billing::ReconciliationRecord;
use crate::domain::foundation::{DomainError, SubscriptionId};
use crate::ports::ReconciliationLog;

#[derive(Default)]
pub struct InMemoryReconciliationLog {
    records: Mutex<Vec<ReconciliationRecord>>,
}

impl InMemoryReconciliationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn all(&self) -> Vec<ReconciliationRecord> {
        self.records.lock().await.clone()
    }
}

#[async_trait]
impl ReconciliationLog for InMemoryReconciliationLog {
    async fn record(&self, record: &ReconciliationRecord) -> Result<(), DomainError> {
        self.records.lock().await.push(record.clone());
        Ok(())
    }

    async fn for_subscription(
        &self,
        subscription_id: &SubscriptionId,
    ) -> Result<Vec<ReconciliationRecord>, DomainError> {
        Ok(self
            .records
            .lock()
            .await
            .iter()
            .filter(|r| r.subscription_id == *subscription_id)
            .cloned()
            .collect())
    }
}
