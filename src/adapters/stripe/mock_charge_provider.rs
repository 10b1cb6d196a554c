//! Mock charge provider for testing.
//!
//! Supports:
//! - Scripted outcomes, consumed in order
//! - A default outcome once the script runs out
//! - Error injection
//! - Call tracking

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, ErrorCode};
use crate::ports::{ChargeOutcome, ChargeProvider, ChargeRequest};

/// Mock charge provider.
///
/// # Example
///
/// ```ignore
/// let mock = MockChargeProvider::succeeding();
/// mock.push_outcome(ChargeOutcome::failed("card_declined"));
///
/// // first charge declines, later ones succeed
/// ```
#[derive(Clone)]
pub struct MockChargeProvider {
    inner: Arc<Mutex<MockState>>,
}

struct MockState {
    scripted: VecDeque<ChargeOutcome>,
    default_outcome: ChargeOutcome,
    next_error: Option<DomainError>,
    delay: Option<Duration>,
    calls: Vec<ChargeRequest>,
}

impl MockChargeProvider {
    /// Every charge succeeds unless scripted otherwise.
    pub fn succeeding() -> Self {
        Self::with_default(ChargeOutcome::Succeeded {
            provider_reference: "ch_mock".to_string(),
        })
    }

    /// Every charge declines with `reason_code` unless scripted otherwise.
    pub fn declining(reason_code: &str) -> Self {
        Self::with_default(ChargeOutcome::failed(reason_code))
    }

    fn with_default(default_outcome: ChargeOutcome) -> Self {
        Self {
            inner: Arc::new(Mutex::new(MockState {
                scripted: VecDeque::new(),
                default_outcome,
                next_error: None,
                delay: None,
                calls: Vec::new(),
            })),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queues an outcome for the next unscripted call.
    pub fn push_outcome(&self, outcome: ChargeOutcome) {
        self.state().scripted.push_back(outcome);
    }

    pub fn set_default(&self, outcome: ChargeOutcome) {
        self.state().default_outcome = outcome;
    }

    /// The next call returns `Err` instead of an outcome.
    pub fn fail_next(&self, message: &str) {
        self.state().next_error = Some(DomainError::new(ErrorCode::PaymentProviderError, message));
    }

    /// Every call sleeps before answering.
    pub fn set_delay(&self, delay: Duration) {
        self.state().delay = Some(delay);
    }

    pub fn calls(&self) -> Vec<ChargeRequest> {
        self.state().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.state().calls.len()
    }
}

#[async_trait]
impl ChargeProvider for MockChargeProvider {
    async fn charge(&self, request: ChargeRequest) -> Result<ChargeOutcome, DomainError> {
        let (delay, result) = {
            let mut state = self.state();
            state.calls.push(request);
            let result = match state.next_error.take() {
                Some(err) => Err(err),
                None => Ok(state
                    .scripted
                    .pop_front()
                    .unwrap_or_else(|| state.default_outcome.clone())),
            };
            (state.delay, result)
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::{CustomerId, SubscriptionId};

    fn request(key: &str) -> ChargeRequest {
        ChargeRequest {
            subscription_id: SubscriptionId::new(),
            customer_id: CustomerId::new("cus_1").unwrap(),
            amount_cents: 100,
            currency: "USD".to_string(),
            idempotency_key: key.to_string(),
        }
    }

    #[tokio::test]
    async fn scripted_outcomes_run_before_default() {
        let mock = MockChargeProvider::succeeding();
        mock.push_outcome(ChargeOutcome::failed("card_declined"));

        assert!(!mock.charge(request("a")).await.unwrap().is_success());
        assert!(mock.charge(request("b")).await.unwrap().is_success());
        assert_eq!(mock.call_count(), 2);
        assert_eq!(mock.calls()[1].idempotency_key, "b");
    }

    #[tokio::test]
    async fn injected_error_is_returned_once() {
        let mock = MockChargeProvider::declining("insufficient_funds");
        mock.fail_next("connection reset");

        assert!(mock.charge(request("a")).await.is_err());
        assert_eq!(
            mock.charge(request("b")).await.unwrap(),
            ChargeOutcome::failed("insufficient_funds")
        );
    }
}
