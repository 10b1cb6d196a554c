//! Application layer - command handlers and the background scheduler.
//!
//! Handlers are built from a [`BillingEngine`], which bundles every port and
//! the billing settings:
//!
//! ```ignore
//! let engine = BillingEngine::new(ports, BillingSettings::new(policy));
//! let result = engine.upgrade_handler().handle(cmd).await?;
//! ```

pub mod charging;
mod context;
pub mod handlers;
mod scheduler;

#[cfg(test)]
pub(crate) mod testing;

pub use context::{BillingEngine, BillingPorts, BillingSettings};
pub use handlers::*;
pub use scheduler::{BillingScheduler, SchedulerConfig, StageReport, SweepReport};
