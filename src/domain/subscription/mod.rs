//! Subscription domain module.
//!
//! - `aggregate` - Subscription aggregate and its lifecycle operations
//! - `status` - SubscriptionStatus state machine
//! - `line_item` - line items, edits and totals
//! - `events` - state history events

mod aggregate;
mod events;
mod line_item;
mod status;

pub use aggregate::{Subscription, DEFAULT_PERIOD_DAYS};
pub use events::{SubscriptionEvent, SubscriptionEventKind};
pub use line_item::{apply_changes, total_of, LineItem, LineItemChange};
pub use status::SubscriptionStatus;
