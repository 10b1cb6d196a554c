//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the billing domain to external systems:
//! - `memory` - Mutex-guarded storage for tests and single-process runs
//! - `postgres` - PostgreSQL storage and advisory locks
//! - `events` - In-memory state history
//! - `stripe` - Charge provider (Stripe and a scripted mock)
//! - `notification` - Notification senders
//! - `clock` - System and manual clocks

pub mod clock;
pub mod events;
pub mod memory;
pub mod notification;
pub mod postgres;
pub mod stripe;

pub use clock::{ManualClock, SystemClock};
pub use events::InMemoryEventBus;
pub use memory::{
    InMemoryDunningRepository, InMemoryReconciliationLog, InMemoryScheduledChangeLedger,
    InMemorySubscriptionLocks, InMemorySubscriptionRepository,
};
pub use notification::{RecordingNotificationSender, SentNotification, TracingNotificationSender};
pub use stripe::{MockChargeProvider, StripeChargeConfig, StripeChargeProvider};
