//! In-process per-subscription locks.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use crate::domain::foundation::{DomainError, SubscriptionId};
use crate::ports::{LockGuard, SubscriptionLocks};

/// Set of currently held subscription ids.
///
/// Uses a std mutex because the guard releases from `Drop`, which cannot await.
#[derive(Default, Clone)]
pub struct InMemorySubscriptionLocks {
    held: Arc<Mutex<HashSet<SubscriptionId>>>,
}

impl InMemorySubscriptionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_held(&self, subscription_id: &SubscriptionId) -> bool {
        self.held
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains(subscription_id)
    }
}

#[async_trait]
impl SubscriptionLocks for InMemorySubscriptionLocks {
    async fn try_acquire(
        &self,
        subscription_id: &SubscriptionId,
    ) -> Result<Option<LockGuard>, DomainError> {
        let inserted = self
            .held
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(*subscription_id);
        if !inserted {
            return Ok(None);
        }

        let held = Arc::clone(&self.held);
        let id = *subscription_id;
        Ok(Some(LockGuard::new(id, move || {
            held.lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .remove(&id);
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lock_is_exclusive_until_guard_drops() {
        let locks = InMemorySubscriptionLocks::new();
        let id = SubscriptionId::new();

        let guard = locks.try_acquire(&id).await.unwrap().expect("first acquire");
        assert!(locks.try_acquire(&id).await.unwrap().is_none());
        assert!(locks.is_held(&id));

        drop(guard);
        assert!(!locks.is_held(&id));
        assert!(locks.try_acquire(&id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn locks_are_per_subscription() {
        let locks = InMemorySubscriptionLocks::new();
        let _a = locks.try_acquire(&SubscriptionId::new()).await.unwrap().unwrap();
        assert!(locks.try_acquire(&SubscriptionId::new()).await.unwrap().is_some());
    }
}
