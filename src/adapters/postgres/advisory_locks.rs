//! Per-subscription locks backed by PostgreSQL advisory locks.
//!
//! `pg_try_advisory_lock` is session scoped, so each guard owns the pooled
//! connection that took the lock until it is released.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use sqlx::pool::PoolConnection;
use sqlx::{PgPool, Postgres};

use crate::domain::foundation::{DomainError, SubscriptionId};
use crate::ports::{LockGuard, SubscriptionLocks};

use super::codec::db_error;

pub struct PostgresAdvisoryLocks {
    pool: PgPool,
}

impl PostgresAdvisoryLocks {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Advisory lock key: the leading eight bytes of a SHA-256 over all sixteen
/// bytes of the subscription uuid.
pub(crate) fn lock_key(subscription_id: &SubscriptionId) -> i64 {
    let digest = Sha256::digest(subscription_id.as_uuid().as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    i64::from_be_bytes(prefix)
}

fn release(mut conn: PoolConnection<Postgres>, key: i64) {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(async move {
                if let Err(e) = sqlx::query("SELECT pg_advisory_unlock($1)")
                    .bind(key)
                    .execute(&mut *conn)
                    .await
                {
                    tracing::warn!(error = %e, lock_key = key, "Failed to release advisory lock");
                    // Closing the session drops every lock it holds.
                    drop(conn.detach());
                }
            });
        }
        Err(_) => {
            drop(conn.detach());
        }
    }
}

#[async_trait]
impl SubscriptionLocks for PostgresAdvisoryLocks {
    async fn try_acquire(
        &self,
        subscription_id: &SubscriptionId,
    ) -> Result<Option<LockGuard>, DomainError> {
        let key = lock_key(subscription_id);
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| db_error("acquire lock connection", e))?;

        let (acquired,): (bool,) = sqlx::query_as("SELECT pg_try_advisory_lock($1)")
            .bind(key)
            .fetch_one(&mut *conn)
            .await
            .map_err(|e| db_error("take advisory lock", e))?;

        if !acquired {
            return Ok(None);
        }

        Ok(Some(LockGuard::new(*subscription_id, move || release(conn, key))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn lock_key_is_stable_per_subscription() {
        let id = SubscriptionId::new();
        assert_eq!(lock_key(&id), lock_key(&id));
    }

    #[test]
    fn ids_sharing_their_first_half_get_different_keys() {
        let a = SubscriptionId::from_uuid(
            Uuid::parse_str("6f1c2a44-9b3e-4d21-8000-000000000001").unwrap(),
        );
        let b = SubscriptionId::from_uuid(
            Uuid::parse_str("6f1c2a44-9b3e-4d21-bfff-ffffffffffff").unwrap(),
        );
        assert_ne!(lock_key(&a), lock_key(&b));
    }

    #[test]
    fn keys_spread_over_many_random_ids() {
        let keys: std::collections::HashSet<i64> =
            (0..10_000).map(|_| lock_key(&SubscriptionId::new())).collect();
        assert_eq!(keys.len(), 10_000);
    }
}
