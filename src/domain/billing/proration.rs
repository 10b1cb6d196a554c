//! Proration calculator.
//!
//! Pure functions. Amounts are integer minor units; daily rates are computed
//! in `f64` and each side is rounded half-up before the net is taken, so
//! `net == charge - credit` holds exactly.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{Timestamp, ValidationError};

use super::calendar::days_between;

/// Outcome of prorating a mid-period change.
///
/// # Invariants
///
/// - `days_used + days_remaining == days_total`
/// - `net_amount_cents == charge_amount_cents - credit_amount_cents`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProrationResult {
    pub days_total: u32,
    pub days_used: u32,
    pub days_remaining: u32,

    /// Unused value of the old line items returned to the customer.
    pub credit_amount_cents: i64,

    /// Value of the new line items for the remaining days.
    pub charge_amount_cents: i64,

    /// Amount to collect now; negative means a net credit.
    pub net_amount_cents: i64,

    /// When the change takes effect.
    pub effective_at: Timestamp,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl ProrationResult {
    fn zero(effective_at: Timestamp) -> Self {
        Self {
            days_total: 0,
            days_used: 0,
            days_remaining: 0,
            credit_amount_cents: 0,
            charge_amount_cents: 0,
            net_amount_cents: 0,
            effective_at,
            note: None,
        }
    }

    /// Returns true if the customer owes money now.
    pub fn requires_charge(&self) -> bool {
        self.net_amount_cents > 0
    }
}

/// Prorates an immediate change from `old_amount_cents` to `new_amount_cents`.
///
/// A change instant outside the period is clamped to its nearest edge.
pub fn calculate_upgrade_proration(
    period_start: Timestamp,
    period_end: Timestamp,
    old_amount_cents: i64,
    new_amount_cents: i64,
    change_instant: Timestamp,
) -> Result<ProrationResult, ValidationError> {
    if old_amount_cents < 0 {
        return Err(ValidationError::out_of_range(
            "old_amount_cents",
            0,
            i64::MAX,
            old_amount_cents,
        ));
    }
    if new_amount_cents < 0 {
        return Err(ValidationError::out_of_range(
            "new_amount_cents",
            0,
            i64::MAX,
            new_amount_cents,
        ));
    }

    let days_total = days_between(period_start, period_end);
    if days_total == 0 {
        return Ok(ProrationResult::zero(change_instant));
    }

    let days_used = days_between(period_start, change_instant).min(days_total);
    let days_remaining = days_total - days_used;

    let credit_amount_cents = prorate(old_amount_cents, days_total, days_remaining);
    let charge_amount_cents = prorate(new_amount_cents, days_total, days_remaining);

    Ok(ProrationResult {
        days_total,
        days_used,
        days_remaining,
        credit_amount_cents,
        charge_amount_cents,
        net_amount_cents: charge_amount_cents - credit_amount_cents,
        effective_at: change_instant,
        note: None,
    })
}

/// Describes a downgrade, which always takes effect at period end.
///
/// Day counts are reported for display; no money moves now.
pub fn calculate_downgrade_proration(
    period_start: Timestamp,
    period_end: Timestamp,
    change_instant: Timestamp,
) -> ProrationResult {
    let days_total = days_between(period_start, period_end);
    let days_used = days_between(period_start, change_instant).min(days_total);

    ProrationResult {
        days_total,
        days_used,
        days_remaining: days_total - days_used,
        credit_amount_cents: 0,
        charge_amount_cents: 0,
        net_amount_cents: 0,
        effective_at: period_end,
        note: Some("Downgrade takes effect at the end of the current billing period".to_string()),
    }
}

fn prorate(amount_cents: i64, days_total: u32, days_remaining: u32) -> i64 {
    let daily_rate = amount_cents as f64 / f64::from(days_total);
    // f64::round is half-away-from-zero, which is half-up for non-negative input.
    (daily_rate * f64::from(days_remaining)).round() as i64
}
