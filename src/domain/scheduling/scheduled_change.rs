//! Future-dated subscription mutations.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::foundation::{
    ScheduledChangeId, StateMachine, SubscriptionId, Timestamp, ValidationError,
};
use crate::domain::subscription::LineItem;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Upgrade,
    Downgrade,
    Cancel,
    Pause,
    Resume,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::Upgrade => "upgrade",
            ChangeType::Downgrade => "downgrade",
            ChangeType::Cancel => "cancel",
            ChangeType::Pause => "pause",
            ChangeType::Resume => "resume",
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChangeType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "upgrade" => Ok(ChangeType::Upgrade),
            "downgrade" => Ok(ChangeType::Downgrade),
            "cancel" => Ok(ChangeType::Cancel),
            "pause" => Ok(ChangeType::Pause),
            "resume" => Ok(ChangeType::Resume),
            other => Err(ValidationError::invalid_format(
                "change_type",
                format!("unknown change type '{}'", other),
            )),
        }
    }
}

/// Lifecycle of a scheduled change.
///
/// `processing` is entered only through the ledger's atomic claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeStatus {
    Scheduled,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl ChangeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeStatus::Scheduled => "scheduled",
            ChangeStatus::Processing => "processing",
            ChangeStatus::Completed => "completed",
            ChangeStatus::Failed => "failed",
            ChangeStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ChangeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChangeStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(ChangeStatus::Scheduled),
            "processing" => Ok(ChangeStatus::Processing),
            "completed" => Ok(ChangeStatus::Completed),
            "failed" => Ok(ChangeStatus::Failed),
            "cancelled" => Ok(ChangeStatus::Cancelled),
            other => Err(ValidationError::invalid_format(
                "change_status",
                format!("unknown change status '{}'", other),
            )),
        }
    }
}

impl StateMachine for ChangeStatus {
    fn can_transition_to(&self, target: &Self) -> bool {
        use ChangeStatus::*;
        matches!(
            (self, target),
            (Scheduled, Processing)
                | (Scheduled, Cancelled)
                | (Processing, Completed)
                | (Processing, Failed)
        )
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use ChangeStatus::*;
        match self {
            Scheduled => vec![Processing, Cancelled],
            Processing => vec![Completed, Failed],
            Completed | Failed | Cancelled => vec![],
        }
    }
}

/// A mutation recorded now and applied by the scheduler at `scheduled_for`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledChange {
    pub id: ScheduledChangeId,
    pub subscription_id: SubscriptionId,
    pub change_type: ChangeType,
    pub scheduled_for: Timestamp,

    /// Line items when the change was requested.
    pub from_snapshot: Vec<LineItem>,

    /// Line items to apply. Equal to `from_snapshot` for non-item changes.
    pub to_snapshot: Vec<LineItem>,

    pub status: ChangeStatus,
    pub reason: Option<String>,
    pub error_detail: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl ScheduledChange {
    pub fn new(
        subscription_id: SubscriptionId,
        change_type: ChangeType,
        scheduled_for: Timestamp,
        from_snapshot: Vec<LineItem>,
        to_snapshot: Vec<LineItem>,
        reason: Option<String>,
        now: Timestamp,
    ) -> Self {
        Self {
            id: ScheduledChangeId::new(),
            subscription_id,
            change_type,
            scheduled_for,
            from_snapshot,
            to_snapshot,
            status: ChangeStatus::Scheduled,
            reason,
            error_detail: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == ChangeStatus::Scheduled
    }

    pub fn is_due(&self, now: Timestamp) -> bool {
        self.is_pending() && self.scheduled_for <= now
    }

    /// Moves to `target`, recording `now` and an optional failure detail.
    pub fn transition(
        &mut self,
        target: ChangeStatus,
        error_detail: Option<String>,
        now: Timestamp,
    ) -> Result<(), ValidationError> {
        self.status = self.status.transition_to(target)?;
        if error_detail.is_some() {
            self.error_detail = error_detail;
        }
        self.updated_at = now;
        Ok(())
    }
}
