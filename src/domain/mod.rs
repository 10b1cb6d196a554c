//! Domain layer containing business logic and domain types.
//!
//! # Module Organization
//!
//! - `foundation` - Shared primitives (IDs, timestamps, errors, state machine, events)
//! - `billing` - Calendar, proration, idempotency keys and the billing error taxonomy
//! - `subscription` - Subscription aggregate and status machine
//! - `scheduling` - Future-dated scheduled changes
//! - `dunning` - Failed-payment recovery campaigns

pub mod billing;
pub mod dunning;
pub mod foundation;
pub mod scheduling;
pub mod subscription;
