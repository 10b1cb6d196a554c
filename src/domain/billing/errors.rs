//! Billing error taxonomy.
//!
//! Every command handler returns `BillingError`. Ports speak `DomainError`;
//! the two convert in both directions.

use crate::domain::foundation::{DomainError, ErrorCode, ValidationError};

/// Kind of entity a lookup failed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Subscription,
    ScheduledChange,
    DunningCampaign,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Subscription => "subscription",
            EntityKind::ScheduledChange => "scheduled_change",
            EntityKind::DunningCampaign => "dunning_campaign",
        }
    }

    fn code(&self) -> ErrorCode {
        match self {
            EntityKind::Subscription => ErrorCode::SubscriptionNotFound,
            EntityKind::ScheduledChange => ErrorCode::ScheduledChangeNotFound,
            EntityKind::DunningCampaign => ErrorCode::CampaignNotFound,
        }
    }
}

/// Billing-specific errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BillingError {
    /// Input rejected before any state was touched.
    Validation { field: String, message: String },

    /// The operation is not allowed from the current status.
    StateConflict { current: String, attempted: String },

    /// Cancellation already scheduled or the subscription is cancelled.
    AlreadyCancelled { subscription_id: String },

    NotFound { entity: EntityKind, id: String },

    /// Another worker holds the subscription or won the claim.
    ConcurrentModification(String),

    /// Payment provider or notification channel failure.
    ExternalFailure { service: String, message: String },

    /// A stored invariant does not hold. Never auto-corrected.
    DataIntegrity(String),

    Infrastructure(String),
}

impl BillingError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        BillingError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn state_conflict(current: impl Into<String>, attempted: impl Into<String>) -> Self {
        BillingError::StateConflict {
            current: current.into(),
            attempted: attempted.into(),
        }
    }

    pub fn already_cancelled(subscription_id: impl ToString) -> Self {
        BillingError::AlreadyCancelled {
            subscription_id: subscription_id.to_string(),
        }
    }

    pub fn not_found(entity: EntityKind, id: impl ToString) -> Self {
        BillingError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn concurrent_modification(message: impl Into<String>) -> Self {
        BillingError::ConcurrentModification(message.into())
    }

    pub fn external(service: impl Into<String>, message: impl Into<String>) -> Self {
        BillingError::ExternalFailure {
            service: service.into(),
            message: message.into(),
        }
    }

    pub fn data_integrity(message: impl Into<String>) -> Self {
        BillingError::DataIntegrity(message.into())
    }

    pub fn infrastructure(message: impl Into<String>) -> Self {
        BillingError::Infrastructure(message.into())
    }

    /// Returns the error code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            BillingError::Validation { .. } => ErrorCode::ValidationFailed,
            BillingError::StateConflict { .. } => ErrorCode::InvalidStateTransition,
            BillingError::AlreadyCancelled { .. } => ErrorCode::AlreadyCancelled,
            BillingError::NotFound { entity, .. } => entity.code(),
            BillingError::ConcurrentModification(_) => ErrorCode::ConcurrentModification,
            BillingError::ExternalFailure { .. } => ErrorCode::PaymentProviderError,
            BillingError::DataIntegrity(_) => ErrorCode::DataIntegrity,
            BillingError::Infrastructure(_) => ErrorCode::DatabaseError,
        }
    }

    /// Returns a human-readable error message.
    pub fn message(&self) -> String {
        match self {
            BillingError::Validation { field, message } => {
                format!("Validation failed for '{}': {}", field, message)
            }
            BillingError::StateConflict { current, attempted } => {
                format!("Cannot {} in '{}' state", attempted, current)
            }
            BillingError::AlreadyCancelled { subscription_id } => {
                format!("Subscription {} is already cancelled", subscription_id)
            }
            BillingError::NotFound { entity, id } => {
                format!("{} not found: {}", entity.as_str(), id)
            }
            BillingError::ConcurrentModification(msg) => {
                format!("Concurrent modification: {}", msg)
            }
            BillingError::ExternalFailure { service, message } => {
                format!("{} failed: {}", service, message)
            }
            BillingError::DataIntegrity(msg) => format!("Data integrity violation: {}", msg),
            BillingError::Infrastructure(msg) => format!("Error: {}", msg),
        }
    }

    /// Returns true if the same request may succeed later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BillingError::ConcurrentModification(_)
                | BillingError::ExternalFailure { .. }
                | BillingError::Infrastructure(_)
        )
    }
}

impl std::fmt::Display for BillingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for BillingError {}

impl From<ValidationError> for BillingError {
    fn from(err: ValidationError) -> Self {
        BillingError::validation(err.field().to_string(), err.to_string())
    }
}

impl From<DomainError> for BillingError {
    fn from(err: DomainError) -> Self {
        let detail = |key: &str| err.details.get(key).cloned().unwrap_or_else(|| "unknown".to_string());
        match err.code {
            ErrorCode::ValidationFailed => BillingError::Validation {
                field: detail("field"),
                message: err.message.clone(),
            },
            ErrorCode::SubscriptionNotFound => {
                BillingError::not_found(EntityKind::Subscription, detail("id"))
            }
            ErrorCode::ScheduledChangeNotFound => {
                BillingError::not_found(EntityKind::ScheduledChange, detail("id"))
            }
            ErrorCode::CampaignNotFound => {
                BillingError::not_found(EntityKind::DunningCampaign, detail("id"))
            }
            ErrorCode::InvalidStateTransition => BillingError::StateConflict {
                current: detail("current"),
                attempted: err.message.clone(),
            },
            ErrorCode::AlreadyCancelled => BillingError::already_cancelled(detail("id")),
            ErrorCode::ConcurrentModification => {
                BillingError::ConcurrentModification(err.message.clone())
            }
            ErrorCode::DataIntegrity => BillingError::DataIntegrity(err.message.clone()),
            ErrorCode::PaymentProviderError => {
                BillingError::external("payment_provider", err.message.clone())
            }
            ErrorCode::NotificationError => {
                BillingError::external("notification", err.message.clone())
            }
            ErrorCode::DatabaseError | ErrorCode::InternalError => {
                BillingError::Infrastructure(err.to_string())
            }
        }
    }
}

impl From<BillingError> for DomainError {
    fn from(err: BillingError) -> Self {
        let base = DomainError::new(err.code(), err.message());
        match err {
            BillingError::Validation { field, .. } => base.with_detail("field", field),
            BillingError::StateConflict { current, .. } => base.with_detail("current", current),
            BillingError::AlreadyCancelled { subscription_id } => {
                base.with_detail("id", subscription_id)
            }
            BillingError::NotFound { id, .. } => base.with_detail("id", id),
            _ => base,
        }
    }
}
