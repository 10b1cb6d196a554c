//! Background scheduler configuration

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;
use crate::application::SchedulerConfig as SweepConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between sweeps
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    /// Max items fetched per stage per sweep
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    /// Items processed in parallel within a stage
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Seconds a claimed dunning attempt stays invisible to other workers
    #[serde(default = "default_claim_lease")]
    pub claim_lease_secs: u64,
}

impl SchedulerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn claim_lease(&self) -> Duration {
        Duration::from_secs(self.claim_lease_secs)
    }

    /// Settings for the sweep loop.
    pub fn sweep_config(&self) -> SweepConfig {
        SweepConfig::default()
            .with_poll_interval(self.interval())
            .with_batch_size(self.batch_size)
            .with_max_concurrency(self.max_concurrency)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.interval_secs == 0 {
            return Err(ValidationError::invalid("scheduler.interval_secs", "must be positive"));
        }
        if self.batch_size == 0 || self.batch_size > 10_000 {
            return Err(ValidationError::invalid(
                "scheduler.batch_size",
                "must be between 1 and 10000",
            ));
        }
        if self.max_concurrency == 0 || self.max_concurrency > 256 {
            return Err(ValidationError::invalid(
                "scheduler.max_concurrency",
                "must be between 1 and 256",
            ));
        }
        if self.claim_lease_secs == 0 {
            return Err(ValidationError::invalid("scheduler.claim_lease_secs", "must be positive"));
        }
        Ok(())
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
            batch_size: default_batch_size(),
            max_concurrency: default_max_concurrency(),
            claim_lease_secs: default_claim_lease(),
        }
    }
}

fn default_interval() -> u64 {
    60
}

fn default_batch_size() -> u32 {
    100
}

fn default_max_concurrency() -> usize {
    8
}

fn default_claim_lease() -> u64 {
    300
}
