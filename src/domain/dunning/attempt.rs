//! Append-only audit record of a dunning attempt.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::foundation::{AttemptRecordId, CampaignId, Timestamp, ValidationError};

use super::DunningAction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// No charge was attempted at this step.
    Pending,
    Succeeded,
    Failed,
}

impl AttemptOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptOutcome::Pending => "pending",
            AttemptOutcome::Succeeded => "succeeded",
            AttemptOutcome::Failed => "failed",
        }
    }
}

impl fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttemptOutcome {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(AttemptOutcome::Pending),
            "succeeded" => Ok(AttemptOutcome::Succeeded),
            "failed" => Ok(AttemptOutcome::Failed),
            other => Err(ValidationError::invalid_format(
                "outcome",
                format!("unknown attempt outcome '{}'", other),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DunningAttemptRecord {
    pub id: AttemptRecordId,
    pub campaign_id: CampaignId,
    pub attempt_number: u32,
    pub attempted_at: Timestamp,
    pub outcome: AttemptOutcome,
    pub actions_taken: Vec<DunningAction>,
    pub failure_reason: Option<String>,
}

impl DunningAttemptRecord {
    pub fn new(
        campaign_id: CampaignId,
        attempt_number: u32,
        attempted_at: Timestamp,
        outcome: AttemptOutcome,
        actions_taken: Vec<DunningAction>,
        failure_reason: Option<String>,
    ) -> Self {
        Self {
            id: AttemptRecordId::new(),
            campaign_id,
            attempt_number,
            attempted_at,
            outcome,
            actions_taken,
            failure_reason,
        }
    }
}
