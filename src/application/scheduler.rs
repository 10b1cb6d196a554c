//! BillingScheduler - background sweep over due billing work.
//!
//! Each sweep runs three stages in order:
//! 1. due scheduled changes
//! 2. due renewals
//! 3. due dunning attempts
//!
//! Items within a stage run concurrently, up to `max_concurrency`. Every
//! item is handled on its own: a failure is logged and counted, and the
//! sweep moves on.
//!
//! ## Configuration
//!
//! | Setting | Default | Description |
//! |---------|---------|-------------|
//! | `poll_interval` | 60s | Time between sweeps |
//! | `batch_size` | 100 | Max items fetched per stage per sweep |
//! | `max_concurrency` | 8 | Items processed in parallel within a stage |
//!
//! ## Graceful Shutdown
//!
//! On the shutdown signal the scheduler runs one final sweep and returns.

use std::future::Future;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tokio::sync::watch;
use tokio::time;

use crate::domain::billing::BillingError;
use crate::domain::foundation::DomainError;

use super::handlers::{
    AttemptResolution, ExecuteScheduledChangeCommand, ExecutionOutcome,
    ProcessDunningAttemptCommand, RenewSubscriptionCommand, RenewalOutcome,
};
use super::BillingEngine;

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub poll_interval: Duration,
    pub batch_size: u32,
    pub max_concurrency: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(60),
            batch_size: 100,
            max_concurrency: 8,
        }
    }
}

impl SchedulerConfig {
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_batch_size(mut self, size: u32) -> Self {
        self.batch_size = size;
        self
    }

    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max.max(1);
        self
    }
}

/// Per-stage tally of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageReport {
    /// Items the due query returned.
    pub due: usize,
    pub processed: usize,

    /// Claimed elsewhere, locked, or no longer due.
    pub skipped: usize,
    pub failed: usize,

    /// The due query itself failed; nothing ran in this stage.
    pub query_failed: bool,
}

impl StageReport {
    fn tally(due: usize, outcomes: Vec<ItemOutcome>) -> Self {
        let mut report = StageReport {
            due,
            ..Default::default()
        };
        for outcome in outcomes {
            match outcome {
                ItemOutcome::Processed => report.processed += 1,
                ItemOutcome::Skipped => report.skipped += 1,
                ItemOutcome::Failed => report.failed += 1,
            }
        }
        report
    }

    fn query_failed() -> Self {
        StageReport {
            query_failed: true,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub changes: StageReport,
    pub renewals: StageReport,
    pub dunning: StageReport,
}

impl SweepReport {
    pub fn total_processed(&self) -> usize {
        self.changes.processed + self.renewals.processed + self.dunning.processed
    }

    pub fn total_failed(&self) -> usize {
        self.changes.failed + self.renewals.failed + self.dunning.failed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ItemOutcome {
    Processed,
    Skipped,
    Failed,
}

impl ItemOutcome {
    /// Lost lock races are expected under concurrency and count as skipped.
    fn from_error(stage: &'static str, item_id: &str, err: &BillingError) -> Self {
        if matches!(err, BillingError::ConcurrentModification(_)) {
            tracing::debug!(stage, item_id, error = %err, "Item busy; left for the next sweep");
            ItemOutcome::Skipped
        } else {
            tracing::error!(
                stage,
                item_id,
                error_code = %err.code(),
                error = %err,
                retryable = err.is_retryable(),
                "Scheduler item failed"
            );
            ItemOutcome::Failed
        }
    }
}

pub struct BillingScheduler {
    engine: BillingEngine,
    config: SchedulerConfig,
}

impl BillingScheduler {
    pub fn new(engine: BillingEngine) -> Self {
        Self::with_config(engine, SchedulerConfig::default())
    }

    pub fn with_config(engine: BillingEngine, config: SchedulerConfig) -> Self {
        Self { engine, config }
    }

    /// Sweeps on every tick until `shutdown` flips to true, then sweeps once more.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = time::interval(self.config.poll_interval);
        interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        tracing::info!(
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            batch_size = self.config.batch_size,
            max_concurrency = self.config.max_concurrency,
            "Billing scheduler started"
        );

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        self.run_once().await;
                        tracing::info!("Billing scheduler stopped");
                        return;
                    }
                }

                _ = interval.tick() => {
                    self.run_once().await;
                }
            }
        }
    }

    /// Runs one full sweep.
    pub async fn run_once(&self) -> SweepReport {
        let report = SweepReport {
            changes: self.sweep_changes().await,
            renewals: self.sweep_renewals().await,
            dunning: self.sweep_dunning().await,
        };

        if report.changes.due + report.renewals.due + report.dunning.due > 0 {
            tracing::info!(
                changes_processed = report.changes.processed,
                changes_failed = report.changes.failed,
                renewals_processed = report.renewals.processed,
                renewals_failed = report.renewals.failed,
                dunning_processed = report.dunning.processed,
                dunning_failed = report.dunning.failed,
                "Billing sweep finished"
            );
        }
        report
    }

    async fn sweep_changes(&self) -> StageReport {
        let ports = self.engine.ports();
        let due = match ports
            .ledger
            .due_changes(ports.clock.now(), self.config.batch_size)
            .await
        {
            Ok(due) => due,
            Err(e) => return Self::stage_query_failed("scheduled_changes", e),
        };

        let handler = self.engine.execute_scheduled_change_handler();
        let handler = &handler;
        self.process("scheduled_changes", due, |change| async move {
            let item_id = change.id.to_string();
            match handler
                .handle(ExecuteScheduledChangeCommand {
                    change_id: change.id,
                })
                .await
            {
                Ok(result) => match result.outcome {
                    ExecutionOutcome::Completed => ItemOutcome::Processed,
                    ExecutionOutcome::NotClaimed => ItemOutcome::Skipped,
                    ExecutionOutcome::Failed { .. } => ItemOutcome::Failed,
                },
                Err(e) => ItemOutcome::from_error("scheduled_changes", &item_id, &e),
            }
        })
        .await
    }

    async fn sweep_renewals(&self) -> StageReport {
        let ports = self.engine.ports();
        let due = match ports
            .subscriptions
            .find_due_for_renewal(ports.clock.now(), self.config.batch_size)
            .await
        {
            Ok(due) => due,
            Err(e) => return Self::stage_query_failed("renewals", e),
        };

        let handler = self.engine.renew_handler();
        let handler = &handler;
        self.process("renewals", due, |subscription| async move {
            let item_id = subscription.id.to_string();
            match handler
                .handle(RenewSubscriptionCommand {
                    subscription_id: subscription.id,
                })
                .await
            {
                Ok(result) => match result.outcome {
                    RenewalOutcome::Skipped(_) => ItemOutcome::Skipped,
                    RenewalOutcome::Charged { .. }
                    | RenewalOutcome::NoCharge
                    | RenewalOutcome::PaymentFailed { .. } => ItemOutcome::Processed,
                },
                Err(e) => ItemOutcome::from_error("renewals", &item_id, &e),
            }
        })
        .await
    }

    async fn sweep_dunning(&self) -> StageReport {
        let ports = self.engine.ports();
        let due = match ports
            .dunning
            .due_campaigns(ports.clock.now(), self.config.batch_size)
            .await
        {
            Ok(due) => due,
            Err(e) => return Self::stage_query_failed("dunning", e),
        };

        let handler = self.engine.process_dunning_attempt_handler();
        let handler = &handler;
        self.process("dunning", due, |campaign| async move {
            let item_id = campaign.id.to_string();
            match handler
                .handle(ProcessDunningAttemptCommand {
                    campaign_id: campaign.id,
                })
                .await
            {
                Ok(result) => match result.resolution {
                    AttemptResolution::NotDue | AttemptResolution::NotClaimed => {
                        ItemOutcome::Skipped
                    }
                    _ => ItemOutcome::Processed,
                },
                Err(e) => ItemOutcome::from_error("dunning", &item_id, &e),
            }
        })
        .await
    }

    async fn process<T, F, Fut>(&self, stage: &'static str, items: Vec<T>, work: F) -> StageReport
    where
        F: Fn(T) -> Fut,
        Fut: Future<Output = ItemOutcome>,
    {
        let due = items.len();
        if due == 0 {
            return StageReport::default();
        }
        tracing::debug!(stage, due, "Processing due items");

        let outcomes = stream::iter(items)
            .map(work)
            .buffer_unordered(self.config.max_concurrency)
            .collect::<Vec<_>>()
            .await;
        StageReport::tally(due, outcomes)
    }

    fn stage_query_failed(stage: &'static str, err: DomainError) -> StageReport {
        tracing::error!(stage, error = %err, "Failed to query due items");
        StageReport::query_failed()
    }
}
