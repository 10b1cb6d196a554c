//! Deterministic idempotency keys for outbound charges.

use sha2::{Digest, Sha256};
use std::fmt;

use crate::domain::foundation::{SubscriptionId, Timestamp};

/// What a charge is for. Part of the key so different charges for the
/// same period never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargePurpose {
    Proration,
    Renewal,
    Resume,
    DunningRetry,
}

impl ChargePurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChargePurpose::Proration => "proration",
            ChargePurpose::Renewal => "renewal",
            ChargePurpose::Resume => "resume",
            ChargePurpose::DunningRetry => "dunning_retry",
        }
    }
}

impl fmt::Display for ChargePurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derives `hex(SHA-256(purpose, subscription, period_start, attempt))`.
///
/// Repeating a charge with the same inputs yields the same key, so the
/// provider deduplicates it.
pub fn idempotency_key(
    purpose: ChargePurpose,
    subscription_id: &SubscriptionId,
    period_start: Timestamp,
    attempt_number: i64,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(purpose.as_str().as_bytes());
    hasher.update(b"|");
    hasher.update(subscription_id.as_uuid().as_bytes());
    hasher.update(b"|");
    hasher.update(period_start.as_unix_secs().to_be_bytes());
    hasher.update(b"|");
    hasher.update(attempt_number.to_be_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn start() -> Timestamp {
        Timestamp::from_unix_secs(1_704_067_200).unwrap()
    }

    #[test]
    fn key_is_stable_for_same_inputs() {
        let id = SubscriptionId::new();
        let a = idempotency_key(ChargePurpose::Renewal, &id, start(), 0);
        let b = idempotency_key(ChargePurpose::Renewal, &id, start(), 0);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn key_changes_with_each_component() {
        let id = SubscriptionId::new();
        let base = idempotency_key(ChargePurpose::DunningRetry, &id, start(), 1);

        assert_ne!(base, idempotency_key(ChargePurpose::DunningRetry, &id, start(), 2));
        assert_ne!(base, idempotency_key(ChargePurpose::Renewal, &id, start(), 1));
        assert_ne!(
            base,
            idempotency_key(ChargePurpose::DunningRetry, &id, start().add_days(1), 1)
        );
        assert_ne!(
            base,
            idempotency_key(ChargePurpose::DunningRetry, &SubscriptionId::new(), start(), 1)
        );
    }
}
