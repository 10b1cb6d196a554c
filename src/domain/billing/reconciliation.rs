//! Compensating records for charges that failed after a kept state change.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::foundation::{ReconciliationId, SubscriptionId, Timestamp, ValidationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconciliationKind {
    /// Immediate upgrade proration charge failed.
    ProrationCharge,
    /// Charge for the fresh period after resuming failed.
    ResumeCharge,
    /// A renewed period was stored but its charge never settled.
    RenewalCharge,
}

impl ReconciliationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconciliationKind::ProrationCharge => "proration_charge",
            ReconciliationKind::ResumeCharge => "resume_charge",
            ReconciliationKind::RenewalCharge => "renewal_charge",
        }
    }
}

impl fmt::Display for ReconciliationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReconciliationKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "proration_charge" => Ok(ReconciliationKind::ProrationCharge),
            "resume_charge" => Ok(ReconciliationKind::ResumeCharge),
            "renewal_charge" => Ok(ReconciliationKind::RenewalCharge),
            other => Err(ValidationError::invalid_format(
                "reconciliation_kind",
                format!("unknown kind '{}'", other),
            )),
        }
    }
}

/// An amount that should have been collected but was not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationRecord {
    pub id: ReconciliationId,
    pub subscription_id: SubscriptionId,
    pub kind: ReconciliationKind,
    pub amount_cents: i64,
    pub idempotency_key: String,
    pub reason: String,
    pub recorded_at: Timestamp,
}

impl ReconciliationRecord {
    pub fn new(
        subscription_id: SubscriptionId,
        kind: ReconciliationKind,
        amount_cents: i64,
        idempotency_key: impl Into<String>,
        reason: impl Into<String>,
        recorded_at: Timestamp,
    ) -> Self {
        Self {
            id: ReconciliationId::new(),
            subscription_id,
            kind,
            amount_cents,
            idempotency_key: idempotency_key.into(),
            reason: reason.into(),
            recorded_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_parses_its_own_string_form() {
        for kind in [
            ReconciliationKind::ProrationCharge,
            ReconciliationKind::ResumeCharge,
            ReconciliationKind::RenewalCharge,
        ] {
            assert_eq!(kind.as_str().parse::<ReconciliationKind>().unwrap(), kind);
        }
        assert!("refund".parse::<ReconciliationKind>().is_err());
    }
}
