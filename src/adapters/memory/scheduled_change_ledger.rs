//! In-memory scheduled change ledger.
//!
//! A single mutex serialises every operation, which makes supersede and
//! claim atomic.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;

use crate::domain::foundation::{
    DomainError, ErrorCode, ScheduledChangeId, SubscriptionId, Timestamp,
};
use crate::domain::scheduling::{ChangeStatus, ChangeType, ScheduledChange};
use crate::ports::ScheduledChangeLedger;

#[derive(Default)]
pub struct InMemoryScheduledChangeLedger {
    changes: Mutex<HashMap<ScheduledChangeId, ScheduledChange>>,
    failing_completions: AtomicBool,
}

impl InMemoryScheduledChangeLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `complete` fail with a database error until reset.
    pub fn set_failing_completions(&self, failing: bool) {
        self.failing_completions.store(failing, Ordering::SeqCst);
    }

    /// Every change ever recorded for a subscription, oldest first.
    pub async fn history(&self, subscription_id: &SubscriptionId) -> Vec<ScheduledChange> {
        let changes = self.changes.lock().await;
        let mut history: Vec<ScheduledChange> = changes
            .values()
            .filter(|c| c.subscription_id == *subscription_id)
            .cloned()
            .collect();
        history.sort_by_key(|c| c.created_at);
        history
    }
}

fn not_found(id: &ScheduledChangeId) -> DomainError {
    DomainError::new(
        ErrorCode::ScheduledChangeNotFound,
        format!("scheduled change {} not found", id),
    )
    .with_detail("id", id.to_string())
}

fn move_to(
    change: &mut ScheduledChange,
    target: ChangeStatus,
    detail: Option<String>,
    now: Timestamp,
) -> Result<(), DomainError> {
    let current = change.status;
    change.transition(target, detail, now).map_err(|e| {
        DomainError::new(ErrorCode::InvalidStateTransition, e.to_string())
            .with_detail("current", current.as_str())
    })
}

#[async_trait]
impl ScheduledChangeLedger for InMemoryScheduledChangeLedger {
    async fn schedule(
        &self,
        change: &ScheduledChange,
    ) -> Result<Option<ScheduledChangeId>, DomainError> {
        let mut changes = self.changes.lock().await;

        let superseded = changes
            .values_mut()
            .find(|c| {
                c.is_pending()
                    && c.subscription_id == change.subscription_id
                    && c.change_type == change.change_type
            })
            .map(|existing| {
                move_to(existing, ChangeStatus::Cancelled, None, change.created_at)
                    .map(|_| existing.id)
            })
            .transpose()?;

        changes.insert(change.id, change.clone());
        Ok(superseded)
    }

    async fn due_changes(
        &self,
        now: Timestamp,
        limit: u32,
    ) -> Result<Vec<ScheduledChange>, DomainError> {
        let changes = self.changes.lock().await;
        let mut due: Vec<ScheduledChange> =
            changes.values().filter(|c| c.is_due(now)).cloned().collect();
        due.sort_by_key(|c| (c.scheduled_for, c.created_at));
        due.truncate(limit as usize);
        Ok(due)
    }

    async fn claim(&self, id: &ScheduledChangeId, now: Timestamp) -> Result<bool, DomainError> {
        let mut changes = self.changes.lock().await;
        let change = changes.get_mut(id).ok_or_else(|| not_found(id))?;
        if change.status != ChangeStatus::Scheduled {
            return Ok(false);
        }
        move_to(change, ChangeStatus::Processing, None, now)?;
        Ok(true)
    }

    async fn complete(&self, id: &ScheduledChangeId, now: Timestamp) -> Result<(), DomainError> {
        if self.failing_completions.load(Ordering::SeqCst) {
            return Err(DomainError::database("ledger unavailable"));
        }
        let mut changes = self.changes.lock().await;
        let change = changes.get_mut(id).ok_or_else(|| not_found(id))?;
        move_to(change, ChangeStatus::Completed, None, now)
    }

    async fn fail(
        &self,
        id: &ScheduledChangeId,
        detail: &str,
        now: Timestamp,
    ) -> Result<(), DomainError> {
        let mut changes = self.changes.lock().await;
        let change = changes.get_mut(id).ok_or_else(|| not_found(id))?;
        move_to(change, ChangeStatus::Failed, Some(detail.to_string()), now)
    }

    async fn cancel_pending(
        &self,
        subscription_id: &SubscriptionId,
        change_type: ChangeType,
        now: Timestamp,
    ) -> Result<bool, DomainError> {
        let mut changes = self.changes.lock().await;
        match changes.values_mut().find(|c| {
            c.is_pending() && c.subscription_id == *subscription_id && c.change_type == change_type
        }) {
            Some(change) => {
                move_to(change, ChangeStatus::Cancelled, None, now)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn find_pending(
        &self,
        subscription_id: &SubscriptionId,
    ) -> Result<Vec<ScheduledChange>, DomainError> {
        let changes = self.changes.lock().await;
        let mut pending: Vec<ScheduledChange> = changes
            .values()
            .filter(|c| c.is_pending() && c.subscription_id == *subscription_id)
            .cloned()
            .collect();
        pending.sort_by_key(|c| c.scheduled_for);
        Ok(pending)
    }

    async fn find_by_id(
        &self,
        id: &ScheduledChangeId,
    ) -> Result<Option<ScheduledChange>, DomainError> {
        Ok(self.changes.lock().await.get(id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn jan_1() -> Timestamp {
        Timestamp::from_unix_secs(1_704_067_200).unwrap()
    }

    fn change(subscription_id: SubscriptionId, change_type: ChangeType, days: i64) -> ScheduledChange {
        ScheduledChange::new(
            subscription_id,
            change_type,
            jan_1().add_days(days),
            vec![],
            vec![],
            None,
            jan_1(),
        )
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Supersede
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn new_change_supersedes_pending_change_of_same_type() {
        let ledger = InMemoryScheduledChangeLedger::new();
        let sub = SubscriptionId::new();
        let first = change(sub, ChangeType::Downgrade, 30);
        let second = change(sub, ChangeType::Downgrade, 30);

        assert_eq!(ledger.schedule(&first).await.unwrap(), None);
        assert_eq!(ledger.schedule(&second).await.unwrap(), Some(first.id));

        let pending = ledger.find_pending(&sub).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, second.id);
        let old = ledger.find_by_id(&first.id).await.unwrap().unwrap();
        assert_eq!(old.status, ChangeStatus::Cancelled);
    }

    #[tokio::test]
    async fn different_types_coexist() {
        let ledger = InMemoryScheduledChangeLedger::new();
        let sub = SubscriptionId::new();
        ledger.schedule(&change(sub, ChangeType::Downgrade, 30)).await.unwrap();
        ledger.schedule(&change(sub, ChangeType::Cancel, 30)).await.unwrap();
        assert_eq!(ledger.find_pending(&sub).await.unwrap().len(), 2);
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Due / claim
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn due_changes_are_ordered_by_schedule_time() {
        let ledger = InMemoryScheduledChangeLedger::new();
        let late = change(SubscriptionId::new(), ChangeType::Cancel, 20);
        let early = change(SubscriptionId::new(), ChangeType::Cancel, 10);
        let future = change(SubscriptionId::new(), ChangeType::Cancel, 50);
        for c in [&late, &early, &future] {
            ledger.schedule(c).await.unwrap();
        }

        let due = ledger.due_changes(jan_1().add_days(30), 10).await.unwrap();
        assert_eq!(due.iter().map(|c| c.id).collect::<Vec<_>>(), vec![early.id, late.id]);
    }

    #[tokio::test]
    async fn concurrent_claims_succeed_exactly_once() {
        let ledger = Arc::new(InMemoryScheduledChangeLedger::new());
        let c = change(SubscriptionId::new(), ChangeType::Pause, 1);
        ledger.schedule(&c).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let ledger = ledger.clone();
            let id = c.id;
            handles.push(tokio::spawn(async move {
                ledger.claim(&id, jan_1().add_days(1)).await.unwrap()
            }));
        }

        let mut wins = 0;
        for handle in handles {
            if handle.await.unwrap() {
                wins += 1;
            }
        }
        assert_eq!(wins, 1);
    }

    #[tokio::test]
    async fn fail_records_detail_and_complete_requires_processing() {
        let ledger = InMemoryScheduledChangeLedger::new();
        let c = change(SubscriptionId::new(), ChangeType::Resume, 1);
        ledger.schedule(&c).await.unwrap();

        assert!(ledger.complete(&c.id, jan_1()).await.is_err());

        ledger.claim(&c.id, jan_1()).await.unwrap();
        ledger.fail(&c.id, "subscription not paused", jan_1()).await.unwrap();

        let stored = ledger.find_by_id(&c.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ChangeStatus::Failed);
        assert_eq!(stored.error_detail.as_deref(), Some("subscription not paused"));
    }

    #[tokio::test]
    async fn cancel_pending_reports_whether_anything_changed() {
        let ledger = InMemoryScheduledChangeLedger::new();
        let sub = SubscriptionId::new();
        ledger.schedule(&change(sub, ChangeType::Cancel, 30)).await.unwrap();

        assert!(ledger.cancel_pending(&sub, ChangeType::Cancel, jan_1()).await.unwrap());
        assert!(!ledger.cancel_pending(&sub, ChangeType::Cancel, jan_1()).await.unwrap());
    }
}
