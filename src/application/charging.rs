//! Charge execution under a deadline.

use std::time::Duration;

use crate::domain::billing::{idempotency_key, ChargePurpose};
use crate::domain::foundation::Timestamp;
use crate::domain::subscription::Subscription;
use crate::ports::{ChargeOutcome, ChargeProvider, ChargeRequest};

/// Reason code recorded when the provider does not answer in time.
pub const TIMEOUT_REASON: &str = "timeout";

/// Reason code recorded when the provider call itself errors.
pub const PROVIDER_ERROR_REASON: &str = "provider_error";

/// Builds a charge request with a deterministic idempotency key.
pub fn charge_request(
    subscription: &Subscription,
    amount_cents: i64,
    purpose: ChargePurpose,
    period_start: Timestamp,
    attempt_number: i64,
) -> ChargeRequest {
    ChargeRequest {
        subscription_id: subscription.id,
        customer_id: subscription.customer_id.clone(),
        amount_cents,
        currency: subscription.currency.clone(),
        idempotency_key: idempotency_key(purpose, &subscription.id, period_start, attempt_number),
    }
}

/// Calls the provider, turning timeouts and transport errors into failed outcomes.
///
/// The idempotency key makes a later retry of the same charge safe even if
/// the timed-out call went through.
pub async fn charge_with_timeout(
    provider: &dyn ChargeProvider,
    request: ChargeRequest,
    timeout: Duration,
) -> ChargeOutcome {
    let subscription_id = request.subscription_id;
    let amount_cents = request.amount_cents;

    match tokio::time::timeout(timeout, provider.charge(request)).await {
        Ok(Ok(outcome)) => {
            if let ChargeOutcome::Failed { reason_code } = &outcome {
                tracing::warn!(
                    subscription_id = %subscription_id,
                    amount_cents,
                    reason_code = %reason_code,
                    "Charge declined"
                );
            }
            outcome
        }
        Ok(Err(e)) => {
            tracing::error!(
                subscription_id = %subscription_id,
                amount_cents,
                error = %e,
                "Charge provider error"
            );
            ChargeOutcome::failed(PROVIDER_ERROR_REASON)
        }
        Err(_) => {
            tracing::warn!(
                subscription_id = %subscription_id,
                amount_cents,
                timeout_ms = timeout.as_millis() as u64,
                "Charge timed out"
            );
            ChargeOutcome::failed(TIMEOUT_REASON)
        }
    }
}
