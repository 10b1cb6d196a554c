//! Per-subscription mutual exclusion.
//!
//! Every mutating operation runs under the subscription's lock. Locks are
//! try-only: a held lock means another worker is busy with the subscription
//! and the caller backs off instead of queueing.

use async_trait::async_trait;
use std::fmt;

use crate::domain::foundation::{DomainError, SubscriptionId};

/// Proof of holding a subscription lock. Releases it on drop.
pub struct LockGuard {
    subscription_id: SubscriptionId,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl LockGuard {
    /// Wraps a release callback run exactly once when the guard drops.
    pub fn new(subscription_id: SubscriptionId, release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            subscription_id,
            release: Some(Box::new(release)),
        }
    }

    pub fn subscription_id(&self) -> &SubscriptionId {
        &self.subscription_id
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockGuard")
            .field("subscription_id", &self.subscription_id)
            .finish()
    }
}

#[async_trait]
pub trait SubscriptionLocks: Send + Sync {
    /// Takes the lock if free. Returns `None` if another holder has it.
    async fn try_acquire(
        &self,
        subscription_id: &SubscriptionId,
    ) -> Result<Option<LockGuard>, DomainError>;
}
