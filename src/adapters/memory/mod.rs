//! In-memory storage adapters.
//!
//! Deterministic and mutex-guarded. Used by the test suites and by
//! single-process deployments without a database.

mod dunning_repository;
mod reconciliation_log;
mod scheduled_change_ledger;
mod subscription_locks;
mod subscription_repository;

pub use dunning_repository::InMemoryDunningRepository;
pub use reconciliation_log::InMemoryReconciliationLog;
pub use scheduled_change_ledger::InMemoryScheduledChangeLedger;
pub use subscription_locks::InMemorySubscriptionLocks;
pub use subscription_repository::InMemorySubscriptionRepository;
