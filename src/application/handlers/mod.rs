//! Command handlers.
//!
//! Each handler takes a command struct and returns a result struct or a
//! `BillingError`. Mutating handlers hold the subscription lock for their
//! whole run.

pub mod dunning;
pub mod subscription;
pub(crate) mod support;

pub use dunning::*;
pub use subscription::*;
pub use support::ImmediateCharge;
