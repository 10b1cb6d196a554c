//! Dunning retry policy.
//!
//! A policy is an ordered list of steps. Step `n` (1-based) runs at
//! `failed_at + offset_days` and performs its actions. When the last step
//! fails the campaign is exhausted and the final action runs once.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::foundation::{PlanRef, Timestamp, ValidationError};

/// Closed set of per-attempt actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DunningAction {
    SendEmail,
    RetryCharge,
    InAppNotice,
}

impl DunningAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            DunningAction::SendEmail => "send_email",
            DunningAction::RetryCharge => "retry_charge",
            DunningAction::InAppNotice => "in_app_notice",
        }
    }
}

impl fmt::Display for DunningAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DunningAction {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "send_email" => Ok(DunningAction::SendEmail),
            "retry_charge" => Ok(DunningAction::RetryCharge),
            "in_app_notice" => Ok(DunningAction::InAppNotice),
            other => Err(ValidationError::invalid_format(
                "dunning_action",
                format!("unknown action '{}'", other),
            )),
        }
    }
}

/// What happens to the subscription when every attempt failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FinalAction {
    Cancel,
    Pause,
    Downgrade { plan_ref: PlanRef },
}

impl FinalAction {
    /// Parses `cancel`, `pause` or `downgrade`; the latter needs a plan.
    pub fn parse(name: &str, downgrade_plan: Option<&str>) -> Result<Self, ValidationError> {
        match name.trim() {
            "cancel" => Ok(FinalAction::Cancel),
            "pause" => Ok(FinalAction::Pause),
            "downgrade" => {
                let plan = downgrade_plan
                    .ok_or_else(|| ValidationError::empty_field("downgrade_plan"))?;
                Ok(FinalAction::Downgrade {
                    plan_ref: PlanRef::new(plan)?,
                })
            }
            other => Err(ValidationError::invalid_format(
                "final_action",
                format!("unknown final action '{}'", other),
            )),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FinalAction::Cancel => "cancel",
            FinalAction::Pause => "pause",
            FinalAction::Downgrade { .. } => "downgrade",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DunningStep {
    /// Days after the original failure.
    pub offset_days: u32,
    pub actions: Vec<DunningAction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DunningPolicy {
    steps: Vec<DunningStep>,
    final_action: FinalAction,
}

impl DunningPolicy {
    /// Validates and builds a policy.
    ///
    /// Offsets must be strictly increasing and the first must be positive
    /// (it is the grace period). Every step needs at least one action.
    pub fn new(steps: Vec<DunningStep>, final_action: FinalAction) -> Result<Self, ValidationError> {
        let first = steps
            .first()
            .ok_or_else(|| ValidationError::empty_field("dunning_steps"))?;
        if first.offset_days == 0 {
            return Err(ValidationError::out_of_range(
                "offset_days",
                1,
                i64::from(u32::MAX),
                0,
            ));
        }
        for pair in steps.windows(2) {
            if pair[1].offset_days <= pair[0].offset_days {
                return Err(ValidationError::invalid_format(
                    "offset_days",
                    format!(
                        "offsets must be strictly increasing ({} then {})",
                        pair[0].offset_days, pair[1].offset_days
                    ),
                ));
            }
        }
        if steps.iter().any(|step| step.actions.is_empty()) {
            return Err(ValidationError::empty_field("actions"));
        }
        Ok(Self { steps, final_action })
    }

    /// Builds a policy where every step performs the same actions.
    pub fn uniform(
        offsets: &[u32],
        actions: &[DunningAction],
        final_action: FinalAction,
    ) -> Result<Self, ValidationError> {
        let steps = offsets
            .iter()
            .map(|&offset_days| DunningStep {
                offset_days,
                actions: actions.to_vec(),
            })
            .collect();
        Self::new(steps, final_action)
    }

    pub fn max_attempts(&self) -> u32 {
        self.steps.len() as u32
    }

    pub fn grace_period_days(&self) -> u32 {
        self.steps.first().map(|s| s.offset_days).unwrap_or_default()
    }

    /// Step for a 1-based attempt number.
    pub fn step(&self, attempt_number: u32) -> Option<&DunningStep> {
        attempt_number
            .checked_sub(1)
            .and_then(|index| self.steps.get(index as usize))
    }

    /// When the given 1-based attempt is due.
    pub fn retry_at(&self, failed_at: Timestamp, attempt_number: u32) -> Option<Timestamp> {
        self.step(attempt_number)
            .map(|step| failed_at.add_days(i64::from(step.offset_days)))
    }

    pub fn steps(&self) -> &[DunningStep] {
        &self.steps
    }

    pub fn final_action(&self) -> &FinalAction {
        &self.final_action
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_actions() -> Vec<DunningAction> {
        vec![DunningAction::SendEmail, DunningAction::RetryCharge]
    }

    #[test]
    fn uniform_policy_exposes_steps() {
        let policy = DunningPolicy::uniform(&[1, 3, 7], &all_actions(), FinalAction::Cancel).unwrap();
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.grace_period_days(), 1);
        assert_eq!(policy.step(3).unwrap().offset_days, 7);
        assert!(policy.step(0).is_none());
        assert!(policy.step(4).is_none());
    }

    #[test]
    fn retry_at_is_measured_from_failure() {
        let policy = DunningPolicy::uniform(&[1, 3, 7], &all_actions(), FinalAction::Cancel).unwrap();
        let failed_at = Timestamp::from_unix_secs(1_704_067_200).unwrap();
        assert_eq!(policy.retry_at(failed_at, 2), Some(failed_at.add_days(3)));
    }

    #[test]
    fn zero_grace_period_is_rejected() {
        assert!(DunningPolicy::uniform(&[0, 3], &all_actions(), FinalAction::Pause).is_err());
    }

    #[test]
    fn non_increasing_offsets_are_rejected() {
        assert!(DunningPolicy::uniform(&[1, 3, 3], &all_actions(), FinalAction::Pause).is_err());
        assert!(DunningPolicy::uniform(&[5, 2], &all_actions(), FinalAction::Pause).is_err());
    }

    #[test]
    fn empty_policy_and_empty_actions_are_rejected() {
        assert!(DunningPolicy::uniform(&[], &all_actions(), FinalAction::Cancel).is_err());
        assert!(DunningPolicy::uniform(&[1], &[], FinalAction::Cancel).is_err());
    }

    #[test]
    fn unknown_action_fails_to_parse() {
        assert_eq!("retry_charge".parse::<DunningAction>().unwrap(), DunningAction::RetryCharge);
        assert!("send_sms".parse::<DunningAction>().is_err());
    }

    #[test]
    fn downgrade_final_action_requires_plan() {
        assert!(FinalAction::parse("downgrade", None).is_err());
        assert_eq!(
            FinalAction::parse("downgrade", Some("free")).unwrap(),
            FinalAction::Downgrade {
                plan_ref: PlanRef::new("free").unwrap()
            }
        );
        assert!(FinalAction::parse("archive", None).is_err());
    }
}
