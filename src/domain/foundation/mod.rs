//! Foundation module - Shared domain primitives.
//!
//! Identifiers, timestamps, error types, the state machine trait and the
//! event envelope used across the billing domain.

mod errors;
mod events;
mod ids;
mod state_machine;
mod timestamp;

pub use errors::{DomainError, ErrorCode, ValidationError};
pub use events::{DomainEvent, EventEnvelope, EventId, SerializableDomainEvent};
pub use ids::{
    AttemptRecordId, CampaignId, CustomerId, PlanRef, ReconciliationId, ScheduledChangeId,
    SubscriptionId,
};
pub use state_machine::StateMachine;
pub use timestamp::Timestamp;
