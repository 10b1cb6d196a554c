//! Billing primitives shared by subscriptions and dunning.
//!
//! - `calendar` - day counting over UTC calendar dates
//! - `proration` - mid-period credit/charge calculation
//! - `idempotency` - deterministic charge keys
//! - `reconciliation` - records for charges that failed after a kept change
//! - `errors` - the `BillingError` taxonomy

mod calendar;
mod errors;
mod idempotency;
mod proration;
mod reconciliation;

pub use calendar::{days_between, period_end};
pub use errors::{BillingError, EntityKind};
pub use idempotency::{idempotency_key, ChargePurpose};
pub use proration::{calculate_downgrade_proration, calculate_upgrade_proration, ProrationResult};
pub use reconciliation::{ReconciliationKind, ReconciliationRecord};
