//! Ports - the interfaces between the billing domain and the outside world.
//!
//! - Storage: `SubscriptionRepository`, `ScheduledChangeLedger`,
//!   `DunningRepository`, `ReconciliationLog`, `EventPublisher`
//! - Coordination: `SubscriptionLocks`
//! - External: `ChargeProvider`, `NotificationSender`, `Clock`

mod charge_provider;
mod clock;
mod dunning_repository;
mod event_publisher;
mod notification_sender;
mod reconciliation_log;
mod scheduled_change_ledger;
mod subscription_locks;
mod subscription_repository;

pub use charge_provider::{ChargeOutcome, ChargeProvider, ChargeRequest};
pub use clock::Clock;
pub use dunning_repository::DunningRepository;
pub use event_publisher::EventPublisher;
pub use notification_sender::{DeliveryStatus, NotificationChannel, NotificationSender};
pub use reconciliation_log::ReconciliationLog;
pub use scheduled_change_ledger::ScheduledChangeLedger;
pub use subscription_locks::{LockGuard, SubscriptionLocks};
pub use subscription_repository::SubscriptionRepository;
