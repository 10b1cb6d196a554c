//! PostgreSQL adapters - database implementations of the storage ports.
//!
//! - `PostgresSubscriptionRepository` - subscriptions with optimistic versioning
//! - `PostgresScheduledChangeLedger` - scheduled changes with conditional claims
//! - `PostgresDunningRepository` - campaigns and attempt records
//! - `PostgresReconciliationLog` - compensating records
//! - `PostgresHistoryStore` - subscription state history
//! - `PostgresAdvisoryLocks` - per-subscription advisory locks

mod advisory_locks;
mod codec;
mod dunning_repository;
mod history_store;
mod reconciliation_log;
mod scheduled_change_ledger;
mod subscription_repository;

pub use advisory_locks::PostgresAdvisoryLocks;
pub use dunning_repository::PostgresDunningRepository;
pub use history_store::PostgresHistoryStore;
pub use reconciliation_log::PostgresReconciliationLog;
pub use scheduled_change_ledger::PostgresScheduledChangeLedger;
pub use subscription_repository::PostgresSubscriptionRepository;
