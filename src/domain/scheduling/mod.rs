//! Scheduled change domain module.

mod scheduled_change;

pub use scheduled_change::{ChangeStatus, ChangeType, ScheduledChange};
