//! Charge provider port for collecting money from a customer.
//!
//! # Design
//!
//! - **Opaque**: a charge either succeeds or fails; no ledger semantics
//! - **Idempotent**: every request carries a deterministic key, so a retried
//!   request never double-charges
//! - **Declines are outcomes**: a declined card is `ChargeOutcome::Failed`,
//!   while transport problems are `Err(DomainError)`

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::foundation::{CustomerId, DomainError, SubscriptionId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargeRequest {
    pub subscription_id: SubscriptionId,
    pub customer_id: CustomerId,
    pub amount_cents: i64,

    /// ISO-4217 code.
    pub currency: String,

    pub idempotency_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ChargeOutcome {
    Succeeded { provider_reference: String },
    Failed { reason_code: String },
}

impl ChargeOutcome {
    pub fn failed(reason_code: impl Into<String>) -> Self {
        ChargeOutcome::Failed {
            reason_code: reason_code.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ChargeOutcome::Succeeded { .. })
    }
}

/// Port for payment provider integrations.
#[async_trait]
pub trait ChargeProvider: Send + Sync {
    /// Attempts to collect `amount_cents` from the customer's default method.
    ///
    /// # Errors
    ///
    /// - `PaymentProviderError` when the provider could not be reached or
    ///   answered with something other than a charge result
    async fn charge(&self, request: ChargeRequest) -> Result<ChargeOutcome, DomainError>;
}
