//! In-memory subscription repository.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;

use crate::domain::foundation::{DomainError, ErrorCode, SubscriptionId, Timestamp};
use crate::domain::subscription::Subscription;
use crate::ports::SubscriptionRepository;

/// Subscription store backed by a mutex-guarded map.
#[derive(Default)]
pub struct InMemorySubscriptionRepository {
    subscriptions: Mutex<HashMap<SubscriptionId, Subscription>>,
}

impl InMemorySubscriptionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn count(&self) -> usize {
        self.subscriptions.lock().await.len()
    }
}

#[async_trait]
impl SubscriptionRepository for InMemorySubscriptionRepository {
    async fn save(&self, subscription: &Subscription) -> Result<(), DomainError> {
        let mut subscriptions = self.subscriptions.lock().await;
        if subscriptions.contains_key(&subscription.id) {
            return Err(DomainError::validation(
                "id",
                format!("subscription {} already exists", subscription.id),
            ));
        }
        subscriptions.insert(subscription.id, subscription.clone());
        Ok(())
    }

    async fn update(
        &self,
        subscription: &Subscription,
        expected_version: i64,
    ) -> Result<(), DomainError> {
        let mut subscriptions = self.subscriptions.lock().await;
        let stored = subscriptions.get_mut(&subscription.id).ok_or_else(|| {
            DomainError::new(
                ErrorCode::SubscriptionNotFound,
                format!("subscription {} not found", subscription.id),
            )
            .with_detail("id", subscription.id.to_string())
        })?;

        if stored.version != expected_version {
            return Err(DomainError::new(
                ErrorCode::ConcurrentModification,
                format!(
                    "subscription {} is at version {}, expected {}",
                    subscription.id, stored.version, expected_version
                ),
            ));
        }

        *stored = subscription.clone();
        Ok(())
    }

    async fn find_by_id(&self, id: &SubscriptionId) -> Result<Option<Subscription>, DomainError> {
        Ok(self.subscriptions.lock().await.get(id).cloned())
    }

    async fn find_due_for_renewal(
        &self,
        now: Timestamp,
        limit: u32,
    ) -> Result<Vec<Subscription>, DomainError> {
        let subscriptions = self.subscriptions.lock().await;
        let mut due: Vec<Subscription> = subscriptions
            .values()
            .filter(|s| s.is_due_for_renewal(now))
            .cloned()
            .collect();
        due.sort_by_key(|s| s.current_period_end);
        due.truncate(limit as usize);
        Ok(due)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::{CustomerId, PlanRef};
    use crate::domain::subscription::LineItem;

    fn jan_1() -> Timestamp {
        Timestamp::from_unix_secs(1_704_067_200).unwrap()
    }

    fn subscription(start: Timestamp) -> Subscription {
        Subscription::create(
            SubscriptionId::new(),
            CustomerId::new("cus_1").unwrap(),
            "EUR",
            vec![LineItem::new(PlanRef::new("basic").unwrap(), 1, 900).unwrap()],
            start,
            30,
            false,
            start,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn update_with_stale_version_is_rejected() {
        let repo = InMemorySubscriptionRepository::new();
        let mut sub = subscription(jan_1());
        repo.save(&sub).await.unwrap();

        sub.schedule_cancellation(None, jan_1()).unwrap();
        repo.update(&sub, 0).await.unwrap();

        let err = repo.update(&sub, 0).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ConcurrentModification);
    }

    #[tokio::test]
    async fn duplicate_save_is_rejected() {
        let repo = InMemorySubscriptionRepository::new();
        let sub = subscription(jan_1());
        repo.save(&sub).await.unwrap();
        assert!(repo.save(&sub).await.is_err());
    }

    #[tokio::test]
    async fn due_for_renewal_is_ordered_and_limited() {
        let repo = InMemorySubscriptionRepository::new();
        let older = subscription(jan_1());
        let newer = subscription(jan_1().add_days(5));
        let future = subscription(jan_1().add_days(40));
        for s in [&older, &newer, &future] {
            repo.save(s).await.unwrap();
        }

        let now = jan_1().add_days(36);
        let due = repo.find_due_for_renewal(now, 10).await.unwrap();
        assert_eq!(due.iter().map(|s| s.id).collect::<Vec<_>>(), vec![older.id, newer.id]);

        let limited = repo.find_due_for_renewal(now, 1).await.unwrap();
        assert_eq!(limited.len(), 1);
    }
}
