//! Dunning policy configuration
//!
//! Lists are comma-separated strings so they map onto single environment
//! variables:
//!
//! - `BILLING_ENGINE__DUNNING__RETRY_OFFSETS_DAYS=1,3,7`
//! - `BILLING_ENGINE__DUNNING__ACTIONS=retry_charge,send_email`
//! - `BILLING_ENGINE__DUNNING__STEP_ACTIONS=retry_charge;retry_charge,send_email;retry_charge,in_app_notice`
//! - `BILLING_ENGINE__DUNNING__FINAL_ACTION=downgrade`
//! - `BILLING_ENGINE__DUNNING__DOWNGRADE_PLAN=free`

use serde::Deserialize;

use super::error::ValidationError;
use crate::domain::dunning::{DunningAction, DunningPolicy, DunningStep, FinalAction};

#[derive(Debug, Clone, Deserialize)]
pub struct DunningConfig {
    /// Days after the failure for each attempt, strictly increasing
    #[serde(default = "default_offsets")]
    pub retry_offsets_days: String,

    /// Actions for every attempt, unless `step_actions` is set
    #[serde(default = "default_actions")]
    pub actions: String,

    /// Per-attempt actions; steps separated by `;`
    #[serde(default)]
    pub step_actions: Option<String>,

    /// `cancel`, `pause` or `downgrade`
    #[serde(default = "default_final_action")]
    pub final_action: String,

    /// Target plan when `final_action = downgrade`
    #[serde(default)]
    pub downgrade_plan: Option<String>,
}

impl DunningConfig {
    /// Builds the validated policy.
    pub fn to_policy(&self) -> Result<DunningPolicy, ValidationError> {
        let offsets = parse_offsets(&self.retry_offsets_days)?;

        let step_actions = match &self.step_actions {
            Some(raw) => {
                let steps = raw
                    .split(';')
                    .map(parse_actions)
                    .collect::<Result<Vec<_>, _>>()?;
                if steps.len() != offsets.len() {
                    return Err(ValidationError::InvalidDunningPolicy(format!(
                        "{} offsets but {} step action lists",
                        offsets.len(),
                        steps.len()
                    )));
                }
                steps
            }
            None => vec![parse_actions(&self.actions)?; offsets.len()],
        };

        let steps = offsets
            .into_iter()
            .zip(step_actions)
            .map(|(offset_days, actions)| DunningStep {
                offset_days,
                actions,
            })
            .collect();

        let final_action = FinalAction::parse(&self.final_action, self.downgrade_plan.as_deref())
            .map_err(|e| ValidationError::InvalidDunningPolicy(e.to_string()))?;

        DunningPolicy::new(steps, final_action)
            .map_err(|e| ValidationError::InvalidDunningPolicy(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        self.to_policy().map(|_| ())
    }
}

impl Default for DunningConfig {
    fn default() -> Self {
        Self {
            retry_offsets_days: default_offsets(),
            actions: default_actions(),
            step_actions: None,
            final_action: default_final_action(),
            downgrade_plan: None,
        }
    }
}

fn parse_offsets(raw: &str) -> Result<Vec<u32>, ValidationError> {
    raw.split(',')
        .map(|part| {
            part.trim().parse::<u32>().map_err(|_| {
                ValidationError::InvalidDunningPolicy(format!("'{}' is not a day offset", part.trim()))
            })
        })
        .collect()
}

fn parse_actions(raw: &str) -> Result<Vec<DunningAction>, ValidationError> {
    raw.split(',')
        .filter(|part| !part.trim().is_empty())
        .map(|part| {
            part.parse::<DunningAction>()
                .map_err(|e| ValidationError::InvalidDunningPolicy(e.to_string()))
        })
        .collect()
}

fn default_offsets() -> String {
    "1,3,7".to_string()
}

fn default_actions() -> String {
    "retry_charge,send_email".to_string()
}

fn default_final_action() -> String {
    "cancel".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_has_three_attempts() {
        let policy = DunningConfig::default().to_policy().unwrap();
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.grace_period_days(), 1);
        assert_eq!(policy.final_action(), &FinalAction::Cancel);
        assert_eq!(
            policy.steps()[2].actions,
            vec![DunningAction::RetryCharge, DunningAction::SendEmail]
        );
    }

    #[test]
    fn step_actions_override_per_attempt() {
        let config = DunningConfig {
            retry_offsets_days: "2, 5".to_string(),
            step_actions: Some("send_email;retry_charge,in_app_notice".to_string()),
            ..Default::default()
        };
        let policy = config.to_policy().unwrap();
        assert_eq!(policy.steps()[0].actions, vec![DunningAction::SendEmail]);
        assert_eq!(
            policy.steps()[1].actions,
            vec![DunningAction::RetryCharge, DunningAction::InAppNotice]
        );
    }

    #[test]
    fn unknown_action_fails() {
        let config = DunningConfig {
            actions: "retry_charge,send_sms".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ValidationError::InvalidDunningPolicy(_))
        ));
    }

    #[test]
    fn mismatched_step_count_fails() {
        let config = DunningConfig {
            step_actions: Some("retry_charge".to_string()),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn non_increasing_offsets_fail() {
        let config = DunningConfig {
            retry_offsets_days: "3,3".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn downgrade_needs_plan() {
        let without = DunningConfig {
            final_action: "downgrade".to_string(),
            ..Default::default()
        };
        assert!(without.validate().is_err());

        let with = DunningConfig {
            final_action: "downgrade".to_string(),
            downgrade_plan: Some("free".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            with.to_policy().unwrap().final_action(),
            FinalAction::Downgrade { .. }
        ));
    }
}
