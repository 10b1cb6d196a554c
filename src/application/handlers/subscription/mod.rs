//! Subscription lifecycle handlers.

mod downgrade;
mod execute_scheduled_change;
mod pause;
mod preview_change;
mod reactivate;
mod renew_subscription;
mod resume;
mod schedule_cancellation;
mod upgrade;

pub use downgrade::{
    DowngradeSubscriptionCommand, DowngradeSubscriptionHandler, DowngradeSubscriptionResult,
};
pub use execute_scheduled_change::{
    ExecuteScheduledChangeCommand, ExecuteScheduledChangeHandler, ExecuteScheduledChangeResult,
    ExecutionOutcome,
};
pub use pause::{PauseSubscriptionCommand, PauseSubscriptionHandler, PauseSubscriptionResult};
pub use preview_change::{PreviewChangeCommand, PreviewChangeHandler, PreviewChangeResult};
pub use reactivate::{
    ReactivateSubscriptionCommand, ReactivateSubscriptionHandler, ReactivateSubscriptionResult,
};
pub use renew_subscription::{
    RenewSubscriptionCommand, RenewSubscriptionHandler, RenewSubscriptionResult, RenewalOutcome,
    RenewalSkip,
};
pub use resume::{ResumeSubscriptionCommand, ResumeSubscriptionHandler, ResumeSubscriptionResult};
pub use schedule_cancellation::{
    ScheduleCancellationCommand, ScheduleCancellationHandler, ScheduleCancellationResult,
};
pub use upgrade::{UpgradeSubscriptionCommand, UpgradeSubscriptionHandler, UpgradeSubscriptionResult};
