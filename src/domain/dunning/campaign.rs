//! Dunning campaign entity.
//!
//! # Invariants
//!
//! - `current_attempt <= max_attempts`
//! - at most one `active` campaign per subscription (enforced by the repository)
//! - `recovered`, `exhausted` and `cancelled` are terminal

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::billing::BillingError;
use crate::domain::foundation::{CampaignId, StateMachine, SubscriptionId, Timestamp, ValidationError};

use super::DunningPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    Active,
    Recovered,
    Exhausted,
    Cancelled,
}

impl CampaignStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CampaignStatus::Active => "active",
            CampaignStatus::Recovered => "recovered",
            CampaignStatus::Exhausted => "exhausted",
            CampaignStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CampaignStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(CampaignStatus::Active),
            "recovered" => Ok(CampaignStatus::Recovered),
            "exhausted" => Ok(CampaignStatus::Exhausted),
            "cancelled" => Ok(CampaignStatus::Cancelled),
            other => Err(ValidationError::invalid_format(
                "campaign_status",
                format!("unknown campaign status '{}'", other),
            )),
        }
    }
}

impl StateMachine for CampaignStatus {
    fn can_transition_to(&self, target: &Self) -> bool {
        use CampaignStatus::*;
        matches!(
            (self, target),
            (Active, Recovered) | (Active, Exhausted) | (Active, Cancelled)
        )
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use CampaignStatus::*;
        match self {
            Active => vec![Recovered, Exhausted, Cancelled],
            Recovered | Exhausted | Cancelled => vec![],
        }
    }
}

/// The failed payment that opened a campaign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureContext {
    /// Provider decline code (e.g. `card_declined`).
    pub reason_code: String,
    pub provider_reference: Option<String>,

    /// Start of the period the failed charge was for.
    pub period_start: Timestamp,
    pub amount_cents: i64,
}

/// Where a campaign goes after a non-successful attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptProgress {
    Retrying { next_retry_at: Timestamp },
    Exhausted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DunningCampaign {
    pub id: CampaignId,
    pub subscription_id: SubscriptionId,
    pub failure: FailureContext,
    pub failed_at: Timestamp,

    /// Attempts claimed so far.
    pub current_attempt: u32,
    pub max_attempts: u32,

    /// `None` once the campaign is no longer active.
    pub next_retry_at: Option<Timestamp>,

    pub status: CampaignStatus,
    pub original_amount_cents: i64,
    pub cancel_reason: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl DunningCampaign {
    /// Opens a campaign; the first attempt waits out the grace period.
    pub fn start(
        subscription_id: SubscriptionId,
        failure: FailureContext,
        failed_at: Timestamp,
        policy: &DunningPolicy,
    ) -> Self {
        Self {
            id: CampaignId::new(),
            subscription_id,
            original_amount_cents: failure.amount_cents,
            failure,
            failed_at,
            current_attempt: 0,
            max_attempts: policy.max_attempts(),
            next_retry_at: policy.retry_at(failed_at, 1),
            status: CampaignStatus::Active,
            cancel_reason: None,
            created_at: failed_at,
            updated_at: failed_at,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == CampaignStatus::Active
    }

    /// True when the next attempt is scheduled at or before `now`.
    ///
    /// An active campaign that has used all its attempts is also due once the
    /// lease on its last claim expires: that attempt was never resolved.
    pub fn is_due(&self, now: Timestamp) -> bool {
        self.is_active() && self.next_retry_at.map_or(false, |at| at <= now)
    }

    /// The last attempt was claimed but the campaign never left `active`.
    pub fn has_unresolved_final_attempt(&self) -> bool {
        self.is_active() && self.current_attempt >= self.max_attempts
    }

    /// Consumes the next attempt and parks `next_retry_at` at a lease.
    ///
    /// Returns the 1-based attempt number. Storage adapters perform the same
    /// update conditionally on `current_attempt`.
    pub fn claim_next_attempt(
        &mut self,
        lease_until: Timestamp,
        now: Timestamp,
    ) -> Result<u32, BillingError> {
        if !self.is_active() {
            return Err(BillingError::state_conflict(self.status.as_str(), "claim a dunning attempt"));
        }
        if self.current_attempt >= self.max_attempts {
            return Err(BillingError::data_integrity(format!(
                "campaign {} already used {} of {} attempts",
                self.id, self.current_attempt, self.max_attempts
            )));
        }
        self.current_attempt += 1;
        self.next_retry_at = Some(lease_until);
        self.updated_at = now;
        Ok(self.current_attempt)
    }

    /// Takes a fresh lease on an unresolved last attempt so it can run again.
    ///
    /// Returns the attempt number being re-run.
    pub fn reclaim_final_attempt(
        &mut self,
        lease_until: Timestamp,
        now: Timestamp,
    ) -> Result<u32, BillingError> {
        if !self.has_unresolved_final_attempt() {
            return Err(BillingError::state_conflict(
                self.status.as_str(),
                "reclaim the final dunning attempt",
            ));
        }
        self.next_retry_at = Some(lease_until);
        self.updated_at = now;
        Ok(self.current_attempt)
    }

    /// Schedules the next attempt, or exhausts the campaign after the last one.
    pub fn advance_after_attempt(
        &mut self,
        policy: &DunningPolicy,
        now: Timestamp,
    ) -> Result<AttemptProgress, BillingError> {
        if self.current_attempt < self.max_attempts {
            let next = policy.retry_at(self.failed_at, self.current_attempt + 1).ok_or_else(|| {
                BillingError::data_integrity(format!(
                    "campaign {} expects {} attempts but the policy has {}",
                    self.id,
                    self.max_attempts,
                    policy.max_attempts()
                ))
            })?;
            self.next_retry_at = Some(next);
            self.updated_at = now;
            Ok(AttemptProgress::Retrying { next_retry_at: next })
        } else {
            self.finish(CampaignStatus::Exhausted, now)?;
            Ok(AttemptProgress::Exhausted)
        }
    }

    pub fn recover(&mut self, now: Timestamp) -> Result<(), BillingError> {
        self.finish(CampaignStatus::Recovered, now)
    }

    pub fn cancel(&mut self, reason: impl Into<String>, now: Timestamp) -> Result<(), BillingError> {
        self.finish(CampaignStatus::Cancelled, now)?;
        self.cancel_reason = Some(reason.into());
        Ok(())
    }

    fn finish(&mut self, target: CampaignStatus, now: Timestamp) -> Result<(), BillingError> {
        let current = self.status;
        self.status = current
            .transition_to(target)
            .map_err(|_| BillingError::state_conflict(current.as_str(), format!("move campaign to {}", target)))?;
        self.next_retry_at = None;
        self.updated_at = now;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::dunning::{DunningAction, FinalAction};

    fn jan_1() -> Timestamp {
        Timestamp::from_unix_secs(1_704_067_200).unwrap()
    }

    fn policy() -> DunningPolicy {
        DunningPolicy::uniform(&[1, 3, 7], &[DunningAction::RetryCharge], FinalAction::Cancel).unwrap()
    }

    fn campaign() -> DunningCampaign {
        DunningCampaign::start(
            SubscriptionId::new(),
            FailureContext {
                reason_code: "card_declined".to_string(),
                provider_reference: Some("pi_123".to_string()),
                period_start: jan_1(),
                amount_cents: 4_900,
            },
            jan_1(),
            &policy(),
        )
    }

    #[test]
    fn start_waits_out_grace_period() {
        let c = campaign();
        assert_eq!(c.next_retry_at, Some(jan_1().add_days(1)));
        assert_eq!(c.max_attempts, 3);
        assert!(!c.is_due(jan_1()));
        assert!(c.is_due(jan_1().add_days(1)));
    }

    #[test]
    fn exhausts_only_after_third_attempt() {
        let mut c = campaign();
        let policy = policy();

        for (expected_attempt, expected_next) in [(1, Some(3)), (2, Some(7)), (3, None)] {
            let now = c.next_retry_at.unwrap();
            let attempt = c.claim_next_attempt(now.plus_secs(300), now).unwrap();
            assert_eq!(attempt, expected_attempt);

            match (c.advance_after_attempt(&policy, now).unwrap(), expected_next) {
                (AttemptProgress::Retrying { next_retry_at }, Some(days)) => {
                    assert_eq!(next_retry_at, jan_1().add_days(days));
                    assert!(c.is_active());
                }
                (AttemptProgress::Exhausted, None) => {
                    assert_eq!(c.status, CampaignStatus::Exhausted);
                }
                (progress, _) => panic!("unexpected progress {:?} at attempt {}", progress, attempt),
            }
        }

        assert_eq!(c.current_attempt, c.max_attempts);
        assert!(c.next_retry_at.is_none());
    }

    #[test]
    fn claim_beyond_max_is_rejected() {
        let mut c = campaign();
        c.current_attempt = 3;
        assert!(matches!(
            c.claim_next_attempt(jan_1(), jan_1()),
            Err(BillingError::DataIntegrity(_))
        ));
    }

    #[test]
    fn claim_on_finished_campaign_conflicts() {
        let mut c = campaign();
        c.recover(jan_1()).unwrap();
        assert!(matches!(
            c.claim_next_attempt(jan_1(), jan_1()),
            Err(BillingError::StateConflict { .. })
        ));
    }

    #[test]
    fn unresolved_last_attempt_is_due_after_lease_expires() {
        let mut c = campaign();
        c.current_attempt = 3;
        let lease = jan_1().add_days(7).plus_secs(300);
        c.next_retry_at = Some(lease);

        assert!(c.has_unresolved_final_attempt());
        assert!(!c.is_due(jan_1().add_days(7)));
        assert!(c.is_due(lease));

        let attempt = c.reclaim_final_attempt(lease.plus_secs(300), lease).unwrap();
        assert_eq!(attempt, 3);
        assert_eq!(c.next_retry_at, Some(lease.plus_secs(300)));
        assert_eq!(c.current_attempt, 3);
    }

    #[test]
    fn reclaim_requires_all_attempts_used() {
        let mut c = campaign();
        c.current_attempt = 1;
        assert!(matches!(
            c.reclaim_final_attempt(jan_1(), jan_1()),
            Err(BillingError::StateConflict { .. })
        ));

        c.current_attempt = 3;
        c.recover(jan_1()).unwrap();
        assert!(!c.has_unresolved_final_attempt());
        assert!(!c.is_due(jan_1().add_days(30)));
    }

    #[test]
    fn cancel_records_reason_and_is_terminal() {
        let mut c = campaign();
        c.cancel("customer paid manually", jan_1()).unwrap();
        assert_eq!(c.status, CampaignStatus::Cancelled);
        assert_eq!(c.cancel_reason.as_deref(), Some("customer paid manually"));
        assert!(c.cancel("again", jan_1()).is_err());
    }
}
