//! Event history adapters.
//!
//! - `InMemoryEventBus` - in-process history capture for tests and single-process runs
//!
//! The durable store lives in `adapters::postgres::PostgresHistoryStore`.

mod in_memory;

pub use in_memory::InMemoryEventBus;
